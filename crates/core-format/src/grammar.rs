//! Tokenizes a one-line printf-like template into literal runs and
//! `%X` / `%{SPEC}X` formatter tokens.

use crate::error::CompileError;

const LEGACY_R_EXPANSION: &str = "%m http://%{Host?localhost}i%U%q %H";

#[derive(Debug, Clone)]
pub struct BraceSpec {
    pub name: String,
    pub json_field: Option<String>,
    pub default: Option<Vec<u8>>,
    pub options: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Token {
    Literal(Vec<u8>),
    Formatter { letter: char, spec: Option<BraceSpec> },
}

/// Pre-expands the legacy `%r` shorthand, then splits `template` into
/// literal runs and formatter tokens.
pub fn tokenize(template: &str) -> Result<Vec<Token>, CompileError> {
    let expanded = expand_legacy_r(template);
    let bytes = expanded.as_bytes();
    let mut tokens = Vec::new();
    let mut literal = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'%' {
            literal.push(bytes[i]);
            i += 1;
            continue;
        }
        // '%' at end of template with nothing following is a fault.
        if i + 1 >= bytes.len() {
            return Err(CompileError::new("dangling '%' at end of template")
                .with_context(&expanded, i));
        }
        if bytes[i + 1] == b'%' {
            literal.push(b'%');
            i += 2;
            continue;
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }
        if bytes[i + 1] == b'{' {
            let close = find_brace_close(&expanded, i + 2)
                .ok_or_else(|| CompileError::new("unterminated '{' in template").with_context(&expanded, i))?;
            let spec_str = &expanded[i + 2..close];
            if close + 1 >= expanded.len() {
                return Err(
                    CompileError::new("missing formatter letter after '}'").with_context(&expanded, close)
                );
            }
            let letter = expanded[close + 1..].chars().next().unwrap();
            let spec = parse_brace_spec(spec_str).map_err(|e| e.with_context(&expanded, i))?;
            tokens.push(Token::Formatter {
                letter,
                spec: Some(spec),
            });
            i = close + 1 + letter.len_utf8();
        } else {
            let letter = expanded[i + 1..].chars().next().unwrap();
            tokens.push(Token::Formatter {
                letter,
                spec: None,
            });
            i += 1 + letter.len_utf8();
        }
    }
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    if tokens.is_empty() {
        return Err(CompileError::new("empty template"));
    }
    if !tokens.iter().any(|t| matches!(t, Token::Formatter { .. })) {
        return Err(CompileError::new("template has no formatter directives"));
    }
    Ok(tokens)
}

/// Expands a genuine `%r` directive to its long form, leaving an
/// escaped `%%r` (a literal percent followed by the letter `r`) alone:
/// the `%` in `%r` must not itself be the second half of a consumed
/// `%%` pair, matching the original's token-level (not substring)
/// handling of the shorthand.
fn expand_legacy_r(template: &str) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('%') => {
                out.push('%');
                out.push('%');
                chars.next();
            }
            Some('r') => {
                out.push_str(LEGACY_R_EXPANSION);
                chars.next();
            }
            _ => out.push('%'),
        }
    }
    out
}

fn find_brace_close(s: &str, from: usize) -> Option<usize> {
    s[from..].find('}').map(|p| from + p)
}

/// Parses `name (modifier payload)*` where modifier is one of `@`, `?`,
/// `!`; each delimits to the next modifier or end of spec. An empty
/// name is valid when at least one modifier is present.
fn parse_brace_spec(spec: &str) -> Result<BraceSpec, CompileError> {
    let mut name_end = spec.len();
    for (idx, ch) in spec.char_indices() {
        if matches!(ch, '@' | '?' | '!') {
            name_end = idx;
            break;
        }
    }
    let name = spec[..name_end].to_string();
    let rest = &spec[name_end..];

    let mut json_field = None;
    let mut default = None;
    let mut options = Vec::new();

    // Collect modifier start positions, then slice payload as the span
    // between one marker and the next (or end of spec).
    let markers: Vec<(usize, char)> = rest
        .char_indices()
        .filter(|(_, c)| matches!(c, '@' | '?' | '!'))
        .collect();
    for (n, &(pos, marker)) in markers.iter().enumerate() {
        let payload_start = pos + marker.len_utf8();
        let payload_end = markers.get(n + 1).map(|&(p, _)| p).unwrap_or(rest.len());
        let payload = &rest[payload_start..payload_end];
        match marker {
            '@' => {
                if payload.is_empty() {
                    return Err(CompileError::new("empty '@' json-field modifier"));
                }
                json_field = Some(payload.to_string());
            }
            '?' => default = Some(payload.as_bytes().to_vec()),
            '!' => {
                if payload != "escape" && payload != "num" {
                    return Err(CompileError::new(format!("unknown option '!{payload}'")));
                }
                options.push(payload.to_string());
            }
            _ => unreachable!(),
        }
    }

    if name.is_empty() && json_field.is_none() && default.is_none() && options.is_empty() {
        return Err(CompileError::new("empty brace block '{}'"));
    }

    Ok(BraceSpec {
        name,
        json_field,
        default,
        options,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_literal_and_formatter() {
        let tokens = tokenize("%U%q").unwrap();
        assert_eq!(tokens.len(), 2);
        assert!(matches!(tokens[0], Token::Formatter { letter: 'U', .. }));
        assert!(matches!(tokens[1], Token::Formatter { letter: 'q', .. }));
    }

    #[test]
    fn parses_brace_with_default() {
        let tokens = tokenize("%{X-Y?-}i").unwrap();
        match &tokens[0] {
            Token::Formatter {
                letter: 'i',
                spec: Some(spec),
            } => {
                assert_eq!(spec.name, "X-Y");
                assert_eq!(spec.default.as_deref(), Some(b"-".as_slice()));
            }
            other => panic!("unexpected token: {other:?}"),
        }
    }

    #[test]
    fn parses_json_field_and_num_option() {
        let tokens = tokenize("%{bytes@b!num}b").unwrap();
        match &tokens[0] {
            Token::Formatter {
                letter: 'b',
                spec: Some(spec),
            } => {
                assert_eq!(spec.name, "bytes");
                assert_eq!(spec.json_field.as_deref(), Some("b"));
                assert!(spec.options.iter().any(|o| o == "num"));
            }
            other => panic!("unexpected token: {other:?}"),
        }
    }

    #[test]
    fn expands_legacy_percent_r() {
        let tokens = tokenize("%r").unwrap();
        assert!(tokens.len() > 1);
    }

    #[test]
    fn escaped_percent_r_is_not_expanded() {
        // "%%r" is a literal '%' followed by the letter 'r', not the
        // %r shorthand: the '%' that would start %r is already
        // consumed by the preceding %% escape.
        let tokens = tokenize("%%r %U").unwrap();
        match &tokens[0] {
            Token::Literal(bytes) => assert_eq!(bytes, b"%r "),
            other => panic!("unexpected token: {other:?}"),
        }
        assert!(matches!(tokens[1], Token::Formatter { letter: 'U', .. }));
    }

    #[test]
    fn rejects_empty_template() {
        assert!(tokenize("").is_err());
    }

    #[test]
    fn rejects_unterminated_brace() {
        assert!(tokenize("%{X-Y").is_err());
    }

    #[test]
    fn rejects_literal_only_template() {
        assert!(tokenize("hello world").is_err());
    }

    #[test]
    fn double_percent_is_literal_percent() {
        let tokens = tokenize("100%%done %U").unwrap();
        match &tokens[0] {
            Token::Literal(bytes) => assert_eq!(bytes, b"100%done "),
            other => panic!("unexpected token: {other:?}"),
        }
    }
}
