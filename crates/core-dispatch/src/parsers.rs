//! Value-parsers the formatter letter table binds to handlers. Each
//! parser either borrows a sub-slice of the already-truncated tag
//! payload or produces freshly decoded bytes; the caller
//! ([`crate::commit`]) is responsible for getting the result into the
//! transaction's scratch region.

use core_format::Parser;

/// What a parser produced: a borrow into the inbound tag payload (most
/// parsers) or bytes decoded into a fresh allocation (`%u`'s base64
/// decode). Both variants are read once, by `commit`, before this value
/// is dropped.
pub enum Parsed<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> Parsed<'a> {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Parsed::Borrowed(b) => b,
            Parsed::Owned(v) => v,
        }
    }
}

/// Runs `parser` against `payload`. Returns `None` on a parse error:
/// the slot is left unset and falls back to its default at render
/// time; parse errors are not logged.
pub fn run<'a>(parser: Parser, payload: &'a [u8]) -> Option<Parsed<'a>> {
    match parser {
        Parser::None => Some(Parsed::Borrowed(payload)),
        Parser::BasicAuthUser => {
            core_encode::base64_decode_basic_auth(payload).map(Parsed::Owned)
        }
        Parser::QueryStringWithMark => payload
            .iter()
            .position(|&b| b == b'?')
            .map(|idx| Parsed::Borrowed(&payload[idx..])),
        Parser::PathWithoutQuery => {
            let end = payload.iter().position(|&b| b == b'?').unwrap_or(payload.len());
            Some(Parsed::Borrowed(&payload[..end]))
        }
        Parser::BackendOpenName => {
            crate::varmatch::nth_token(payload, 2).map(Parsed::Borrowed)
        }
        Parser::HitMissNormalize => {
            if payload.eq_ignore_ascii_case(b"pass") {
                Some(Parsed::Borrowed(b"miss"))
            } else {
                Some(Parsed::Borrowed(payload))
            }
        }
        // Time is handled separately (`crate::commit_time`) because it
        // writes straight into the transaction's scratch region rather
        // than returning a borrowed/owned byte buffer.
        Parser::Time => None,
    }
}
