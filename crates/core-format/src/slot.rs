use core_arena::ArenaRef;

/// The two encodings a value coming out of a dynamic slot can carry:
/// numeric slots render as a bare JSON number or `null`, string slots
/// get the JSON writer's string escaping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Number,
}

/// Slots that never go through the handler/match machinery: their
/// value is supplied directly by the renderer at render time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Synthetic {
    /// `%n` — the transaction's assigned sequence number.
    Sequence,
}

#[derive(Debug, Clone)]
pub struct DynamicSlot {
    /// The formatter letter this slot came from, used as the default
    /// JSON field name when no `@name` override is given.
    pub formatter: char,
    /// User-supplied brace-block name, kept for diagnostics; not
    /// necessarily the runtime match token (see `core-format::letters`).
    pub var_name: Option<String>,
    pub default: ArenaRef,
    pub json_field: Option<String>,
    pub value_kind: ValueKind,
    pub escape: bool,
    pub synthetic: Option<Synthetic>,
}

#[derive(Debug, Clone)]
pub enum Slot {
    Literal(ArenaRef),
    Dynamic(DynamicSlot),
}

impl Slot {
    pub fn is_literal(&self) -> bool {
        matches!(self, Slot::Literal(_))
    }
}
