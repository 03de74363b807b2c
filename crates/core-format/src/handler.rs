use crate::tag::TagId;

/// Value-parsers a handler may invoke once a payload has been carved
/// out of the raw tag bytes. These are the closed set the letter table
/// references; `core-dispatch` owns running them (it has the scratch
/// allocator the escape/time helpers need).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parser {
    /// Direct assignment, no transform.
    None,
    /// `%t` — epoch seconds or HTTP-date, reformatted with strftime.
    Time,
    /// `%u` — strip `Basic `, base64-decode, drop the password.
    BasicAuthUser,
    /// `%q` — substring from (and including) the first `?`, else empty.
    QueryStringWithMark,
    /// `%U` — substring up to (not including) the first `?`.
    PathWithoutQuery,
    /// `%h` backend — second whitespace-separated token of the
    /// `BackendOpen` tag payload (the backend's configured name).
    BackendOpenName,
    /// `%{Varnish:hitmiss}x` — `pass` collapses to `miss`, everything
    /// else passes through unchanged.
    HitMissNormalize,
}

/// A binding of one tag id to one dynamic slot. Built once at compile
/// time and never mutated; `core-dispatch` walks `handlers[tag.index()]`
/// in registration order on every inbound record.
#[derive(Debug, Clone)]
pub struct Handler {
    pub tag: TagId,
    pub origin: u8,
    pub slot_index: usize,
    /// Prefix the payload must start with (case-insensitive), or the
    /// generic var check is skipped if `None` or `novarmatch`.
    pub var: Option<String>,
    /// Delimiter that terminates the matched prefix: `:` for header
    /// lines (`%i`, `%o`, `%b`, `%u`, `%t`), ` ` for `VCL_Log`'s
    /// space-separated key/value payload, stripping the `VCL_Log:`
    /// prefix and matching the remainder against a space-delimited
    /// token.
    pub var_delim: u8,
    pub column: Option<usize>,
    pub parser: Parser,
    pub novarmatch: bool,
    pub fconf_index: usize,
}
