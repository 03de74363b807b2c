//! Byte-level escaping and time formatting shared by the format
//! compiler's parsers and the renderer's escape flag.

use chrono::{DateTime, Local, TimeZone};
use core_scratch::{Scratch, ScratchSlice};

pub const DEFAULT_TIME_FORMAT: &str = "[%d/%b/%Y:%T %z]";
const TIME_BUF_LEN: usize = 64;
const MAX_BASIC_AUTH_DECODED: usize = 1000;

/// Copies `src` into `scratch`, replacing the documented control
/// characters with C-style two-char escapes and any other
/// non-printable ASCII byte with a four-digit zero-padded octal escape.
/// Allocates the 5x worst case up front and rewinds the unused tail.
/// Returns whether the allocation spilled into an overflow block.
pub fn escape(scratch: &mut Scratch, src: &[u8]) -> (ScratchSlice, bool) {
    let (slice, overflowed) = scratch.alloc(src.len() * 5);
    let mut written = 0usize;
    {
        let out = scratch.resolve_mut(slice);
        for &b in src {
            written += write_escaped_byte(&mut out[written..], b);
        }
    }
    (scratch.shrink(slice, written), overflowed)
}

fn write_escaped_byte(out: &mut [u8], b: u8) -> usize {
    let two_char = match b {
        b'\t' => Some(b't'),
        b'\n' => Some(b'n'),
        b'\r' => Some(b'r'),
        0x0b => Some(b'v'),
        0x0c => Some(b'f'),
        b'"' => Some(b'"'),
        b'\'' => Some(b'\''),
        b' ' => Some(b' '),
        _ => None,
    };
    if let Some(c) = two_char {
        out[0] = b'\\';
        out[1] = c;
        2
    } else if !(0x20..0x7f).contains(&b) {
        out[0] = b'\\';
        out[1] = b'0';
        out[2] = b'0' + ((b >> 6) & 0x7);
        out[3] = b'0' + ((b >> 3) & 0x7);
        out[4] = b'0' + (b & 0x7);
        5
    } else {
        out[0] = b;
        1
    }
}

/// Reverses [`escape`]; used by property tests to confirm the escape
/// table is lossless.
pub fn unescape(src: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.len());
    let mut i = 0;
    while i < src.len() {
        if src[i] == b'\\' && i + 1 < src.len() {
            match src[i + 1] {
                b't' => {
                    out.push(b'\t');
                    i += 2;
                }
                b'n' => {
                    out.push(b'\n');
                    i += 2;
                }
                b'r' => {
                    out.push(b'\r');
                    i += 2;
                }
                b'v' => {
                    out.push(0x0b);
                    i += 2;
                }
                b'f' => {
                    out.push(0x0c);
                    i += 2;
                }
                b'"' => {
                    out.push(b'"');
                    i += 2;
                }
                b'\'' => {
                    out.push(b'\'');
                    i += 2;
                }
                b' ' => {
                    out.push(b' ');
                    i += 2;
                }
                b'0'..=b'7' if i + 5 <= src.len() => {
                    // 4-digit zero-padded octal: \DDDD (the leading digit
                    // is always 0 for a single byte's worth of octal).
                    let d1 = src[i + 2];
                    let d2 = src[i + 3];
                    let d3 = src[i + 4];
                    let val = (d1 - b'0') * 64 + (d2 - b'0') * 8 + (d3 - b'0');
                    out.push(val);
                    i += 5;
                }
                _ => {
                    out.push(src[i]);
                    i += 1;
                }
            }
        } else {
            out.push(src[i]);
            i += 1;
        }
    }
    out
}

/// Parses `src` as either an integer epoch-seconds string or an
/// HTTP-date header, then formats with a strftime-compatible template
/// into `scratch`. Returns `None` when `src` parses as neither.
pub fn time_format(scratch: &mut Scratch, src: &[u8], fmt: &str) -> Option<ScratchSlice> {
    let when = parse_epoch_or_http_date(src)?;
    let rendered = when.format(fmt).to_string();
    let bytes = rendered.as_bytes();
    let (slice, _) = scratch.alloc(TIME_BUF_LEN);
    let n = bytes.len().min(TIME_BUF_LEN);
    {
        let out = scratch.resolve_mut(slice);
        out[..n].copy_from_slice(&bytes[..n]);
    }
    Some(scratch.shrink(slice, n))
}

fn parse_epoch_or_http_date(src: &[u8]) -> Option<DateTime<Local>> {
    let text = std::str::from_utf8(src).ok()?.trim();
    if let Ok(epoch) = text.parse::<i64>() {
        return Local.timestamp_opt(epoch, 0).single();
    }
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|dt| dt.with_timezone(&Local))
}

/// Strips the case-insensitive `basic ` prefix, base64-decodes the
/// remainder, and truncates at the first `:` so the password is
/// dropped. Rejects inputs whose decoded length exceeds 1000 bytes.
pub fn base64_decode_basic_auth(header: &[u8]) -> Option<Vec<u8>> {
    const PREFIX: &[u8] = b"basic ";
    if header.len() < PREFIX.len() {
        return None;
    }
    let (prefix, rest) = header.split_at(PREFIX.len());
    if !prefix.eq_ignore_ascii_case(PREFIX) {
        return None;
    }
    let rest = trim_ascii_start(rest);
    let decoded = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, rest).ok()?;
    if decoded.len() > MAX_BASIC_AUTH_DECODED {
        return None;
    }
    let user = match decoded.iter().position(|&b| b == b':') {
        Some(idx) => &decoded[..idx],
        None => &decoded[..],
    };
    Some(user.to_vec())
}

fn trim_ascii_start(mut s: &[u8]) -> &[u8] {
    while let [b' ', rest @ ..] = s {
        s = rest;
        let _ = rest;
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_round_trips_control_and_high_bytes() {
        let mut scratch = Scratch::new(4096);
        let src: Vec<u8> = (0u8..=255).collect();
        let (slice, _) = escape(&mut scratch, &src);
        let escaped = scratch.resolve(slice).to_vec();
        assert_eq!(unescape(&escaped), src);
    }

    #[test]
    fn escape_is_identity_for_printable_ascii() {
        let mut scratch = Scratch::new(256);
        let (slice, overflowed) = escape(&mut scratch, b"GET /a/b HTTP/1.1");
        assert!(!overflowed);
        assert_eq!(scratch.resolve(slice), b"GET\\ /a/b\\ HTTP/1.1");
    }

    #[test]
    fn time_format_parses_epoch_seconds() {
        let mut scratch = Scratch::new(256);
        let slice = time_format(&mut scratch, b"0", "%Y").unwrap();
        assert_eq!(scratch.resolve(slice), b"1970");
    }

    #[test]
    fn time_format_rejects_garbage() {
        let mut scratch = Scratch::new(256);
        assert!(time_format(&mut scratch, b"not-a-time", "%Y").is_none());
    }

    #[test]
    fn basic_auth_extracts_user_and_drops_password() {
        let decoded = base64_decode_basic_auth(b"Basic YWxpY2U6c2VjcmV0").unwrap();
        assert_eq!(decoded, b"alice");
    }

    #[test]
    fn basic_auth_rejects_non_basic_prefix() {
        assert!(base64_decode_basic_auth(b"Bearer abcdef").is_none());
    }

    #[test]
    fn basic_auth_rejects_oversized_decode() {
        let huge = "a".repeat(2000);
        let encoded = base64::Engine::encode(&base64::engine::general_purpose::STANDARD, huge);
        let header = format!("Basic {encoded}");
        assert!(base64_decode_basic_auth(header.as_bytes()).is_none());
    }
}
