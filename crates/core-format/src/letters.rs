//! The closed formatter-letter table, expressed as a `match` on the
//! letter rather than a data table: each arm returns the handler specs
//! to register and the slot's default value for that letter.

use crate::error::CompileError;
use crate::handler::Parser;
use crate::slot::Synthetic;
use crate::tag::{TagId, origin};

pub struct HandlerTemplate {
    pub tag: TagId,
    pub origin: u8,
    pub var: Option<String>,
    pub var_delim: u8,
    pub column: Option<usize>,
    pub parser: Parser,
    pub novarmatch: bool,
}

impl HandlerTemplate {
    fn new(tag: TagId, origin: u8) -> Self {
        Self {
            tag,
            origin,
            var: None,
            var_delim: b':',
            column: None,
            parser: Parser::None,
            novarmatch: false,
        }
    }

    fn with_var(mut self, var: impl Into<String>) -> Self {
        self.var = Some(var.into());
        self
    }

    fn with_delim(mut self, delim: u8) -> Self {
        self.var_delim = delim;
        self
    }

    fn with_column(mut self, column: usize) -> Self {
        self.column = Some(column);
        self
    }

    fn with_parser(mut self, parser: Parser) -> Self {
        self.parser = parser;
        self
    }

    fn novarmatch(mut self) -> Self {
        self.novarmatch = true;
        self
    }
}

pub struct LetterInfo {
    pub handlers: Vec<HandlerTemplate>,
    pub default: Vec<u8>,
    pub synthetic: Option<Synthetic>,
    /// `true` when a `%{NAME}` brace block is mandatory for this
    /// letter (`%i`, `%o` — the name *is* the header to match).
    pub name_required: bool,
}

impl LetterInfo {
    fn new(handlers: Vec<HandlerTemplate>, default: &[u8]) -> Self {
        Self {
            handlers,
            default: default.to_vec(),
            synthetic: None,
            name_required: false,
        }
    }
}

/// Resolves one formatter letter (plus its optional brace-block name)
/// into the handler templates and default value the compiler should
/// register. `hostname` supplies `%l`'s constant default.
pub fn resolve(letter: char, name: Option<&str>, hostname: &str) -> Result<LetterInfo, CompileError> {
    match letter {
        'b' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::Length, origin::CLIENT),
                HandlerTemplate::new(TagId::RxHeader, origin::BACKEND).with_var("content-length"),
            ],
            b"-",
        )),
        'H' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::RxProtocol, origin::CLIENT),
                HandlerTemplate::new(TagId::TxProtocol, origin::BACKEND),
            ],
            b"HTTP/1.0",
        )),
        'h' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::ReqStart, origin::CLIENT).with_column(1),
                HandlerTemplate::new(TagId::BackendOpen, origin::BACKEND)
                    .with_parser(Parser::BackendOpenName),
            ],
            b"-",
        )),
        'i' => {
            let name = name.filter(|n| !n.is_empty()).ok_or_else(|| {
                CompileError::new("%i requires a header name: %{Header-Name}i")
            })?;
            let mut info = LetterInfo::new(
                vec![HandlerTemplate::new(TagId::RxHeader, origin::CLIENT).with_var(name)],
                b"-",
            );
            info.name_required = true;
            Ok(info)
        }
        'l' => Ok(LetterInfo::new(vec![], hostname.as_bytes())),
        'm' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::RxRequest, origin::CLIENT),
                HandlerTemplate::new(TagId::TxRequest, origin::BACKEND),
            ],
            b"-",
        )),
        'q' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::Url, origin::ANY)
                    .with_parser(Parser::QueryStringWithMark),
            ],
            b"",
        )),
        'o' => {
            let name = name.filter(|n| !n.is_empty()).ok_or_else(|| {
                CompileError::new("%o requires a header name: %{Header-Name}o")
            })?;
            let mut info = LetterInfo::new(
                vec![HandlerTemplate::new(TagId::TxHeader, origin::CLIENT).with_var(name)],
                b"-",
            );
            info.name_required = true;
            Ok(info)
        }
        's' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::TxStatus, origin::CLIENT),
                HandlerTemplate::new(TagId::RxStatus, origin::BACKEND),
            ],
            b"-",
        )),
        't' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::ReqEnd, origin::CLIENT)
                    .with_column(3)
                    .with_parser(Parser::Time)
                    .novarmatch(),
                HandlerTemplate::new(TagId::RxHeader, origin::BACKEND)
                    .with_var("date")
                    .with_parser(Parser::Time)
                    .novarmatch(),
            ],
            b"-",
        )),
        'U' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::Url, origin::ANY)
                    .with_parser(Parser::PathWithoutQuery),
            ],
            b"-",
        )),
        'u' => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::RxHeader, origin::ANY)
                    .with_var("authorization")
                    .with_parser(Parser::BasicAuthUser),
                HandlerTemplate::new(TagId::TxHeader, origin::ANY)
                    .with_var("authorization")
                    .with_parser(Parser::BasicAuthUser),
            ],
            b"-",
        )),
        'x' => resolve_x(name),
        'n' => {
            let mut info = LetterInfo::new(vec![], b"-");
            info.synthetic = Some(Synthetic::Sequence);
            Ok(info)
        }
        other => Err(CompileError::new(format!(
            "unknown formatter letter '{other}'"
        ))),
    }
}

fn resolve_x(name: Option<&str>) -> Result<LetterInfo, CompileError> {
    let name = name
        .filter(|n| !n.is_empty())
        .ok_or_else(|| CompileError::new("%x requires a {Namespace:field} selector"))?;

    if let Some(sub) = name.strip_prefix("VCL_Log:") {
        if sub.is_empty() {
            return Err(CompileError::new("%{VCL_Log:}x requires a sub-name"));
        }
        return Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::VclLog, origin::ANY)
                    .with_var(sub)
                    .with_delim(b' '),
            ],
            b"-",
        ));
    }

    match name {
        "Varnish:time_firstbyte" => Ok(LetterInfo::new(
            vec![HandlerTemplate::new(TagId::ReqEnd, origin::CLIENT).with_column(5)],
            b"-",
        )),
        "Varnish:xid" => Ok(LetterInfo::new(
            vec![HandlerTemplate::new(TagId::ReqEnd, origin::CLIENT).with_column(1)],
            b"-",
        )),
        "Varnish:hitmiss" => Ok(LetterInfo::new(
            vec![
                HandlerTemplate::new(TagId::VclCall, origin::ANY)
                    .with_parser(Parser::HitMissNormalize),
            ],
            b"-",
        )),
        "Varnish:handling" => Ok(LetterInfo::new(
            vec![HandlerTemplate::new(TagId::VclCall, origin::ANY)],
            b"-",
        )),
        other => Err(CompileError::new(format!(
            "unknown %x selector '{other}'"
        ))),
    }
}
