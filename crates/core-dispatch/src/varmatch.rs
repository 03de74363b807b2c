//! Payload-prefix matching and column extraction shared by every
//! handler invocation.

/// Requires `bytes` to start with `var` case-insensitively, followed
/// by `delim`; strips leading ASCII spaces after the delimiter. Returns
/// `None` when the prefix doesn't match (the handler should be skipped
/// for this tag occurrence, not fired with an empty payload).
pub fn strip_var_prefix<'a>(bytes: &'a [u8], var: &str, delim: u8) -> Option<&'a [u8]> {
    let var = var.as_bytes();
    if bytes.len() < var.len() + 1 {
        return None;
    }
    if !bytes[..var.len()].eq_ignore_ascii_case(var) {
        return None;
    }
    if bytes[var.len()] != delim {
        return None;
    }
    let mut rest = &bytes[var.len() + 1..];
    while let [b' ', tail @ ..] = rest {
        rest = tail;
    }
    Some(rest)
}

/// Splits `payload` on ASCII whitespace and returns the 1-based `n`-th
/// non-empty token, or `None` if there are fewer tokens than `n`.
pub fn nth_token(payload: &[u8], n: usize) -> Option<&[u8]> {
    debug_assert!(n >= 1);
    payload
        .split(|&b| b == b' ' || b == b'\t')
        .filter(|t| !t.is_empty())
        .nth(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_case_insensitive_header_prefix() {
        let got = strip_var_prefix(b"Content-Length: 512", "content-length", b':').unwrap();
        assert_eq!(got, b"512");
    }

    #[test]
    fn rejects_non_matching_prefix() {
        assert!(strip_var_prefix(b"X-Foo: bar", "content-length", b':').is_none());
    }

    #[test]
    fn vcl_log_uses_space_delimiter() {
        let got = strip_var_prefix(b"event some data here", "event", b' ').unwrap();
        assert_eq!(got, b"some data here");
    }

    #[test]
    fn nth_token_picks_first_nonempty_column() {
        assert_eq!(nth_token(b"  a  b   c", 1), Some(b"a".as_slice()));
        assert_eq!(nth_token(b"  a  b   c", 3), Some(b"c".as_slice()));
        assert_eq!(nth_token(b"a b", 5), None);
    }
}
