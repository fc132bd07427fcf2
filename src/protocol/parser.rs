//! Inline Command Parser
//!
//! Requests are inline commands: one line of ASCII-whitespace-separated
//! tokens terminated by CRLF. The connection layer frames lines; this
//! module turns a framed line into tokens.
//!
//! ```text
//! "SET foo bar EX 30"  →  [SET] [foo] [bar] [EX] [30]
//! "LPUSH  k   a b"     →  [LPUSH] [k] [a] [b]
//! ""                   →  []
//! ```
//!
//! Tokens are kept as raw bytes. Only the first token (the verb) is ever
//! case-folded, and that happens at dispatch time so the arguments reach
//! the handlers byte-for-byte as the client sent them.

use bytes::Bytes;

/// Splits one request line into tokens.
///
/// Splitting is done on ASCII whitespace; consecutive separators produce
/// no empty tokens. An empty (or all-whitespace) line yields an empty
/// vector, which the connection layer treats as "no request".
pub fn tokenize(line: &[u8]) -> Vec<Bytes> {
    line.split(|b| b.is_ascii_whitespace())
        .filter(|t| !t.is_empty())
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Case-folds a verb token to uppercase for dispatch.
///
/// Verbs are ASCII in practice; non-UTF-8 bytes are replaced, which can
/// only ever produce an unknown-command reply downstream.
pub fn fold_verb(token: &[u8]) -> String {
    String::from_utf8_lossy(token).to_uppercase()
}
