use core_arena::{ArenaRef, StringArena};

use crate::error::CompileError;
use crate::grammar::{self, BraceSpec, Token};
use crate::handler::Handler;
use crate::letters::{self, HandlerTemplate};
use crate::slot::{DynamicSlot, Slot, ValueKind};
use crate::tag::TAG_COUNT;

/// One compiled template (either MAIN or KEY). Slot indices are stable
/// after compile.
#[derive(Debug, Clone)]
pub struct CompiledTemplate {
    pub slots: Vec<Slot>,
}

impl CompiledTemplate {
    pub fn dynamic_slot_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_literal()).count()
    }
}

/// A fully compiled pair of fconfs (MAIN and, optionally, KEY) sharing
/// one literal arena and one per-tag handler table: each compiled
/// handler is appended to the shared `handlers[tagId]` list tagged
/// with the fconf index it belongs to.
#[derive(Debug)]
pub struct Program {
    pub arena: StringArena,
    pub templates: Vec<CompiledTemplate>,
    pub handlers: Vec<Vec<Handler>>,
}

impl Program {
    pub fn handlers_for(&self, tag_index: usize) -> &[Handler] {
        &self.handlers[tag_index]
    }
}

pub const MAIN: usize = 0;
pub const KEY: usize = 1;

/// Compiles the MAIN template, and optionally a KEY template, into one
/// [`Program`]. `hostname` supplies `%l`'s default.
pub fn compile(main: &str, key: Option<&str>, hostname: &str) -> Result<Program, CompileError> {
    let mut arena = StringArena::new();
    let mut handlers: Vec<Vec<Handler>> = (0..TAG_COUNT).map(|_| Vec::new()).collect();
    let mut templates = Vec::new();

    let main_slots = compile_one(main, MAIN, hostname, &mut arena, &mut handlers)?;
    templates.push(CompiledTemplate { slots: main_slots });

    if let Some(key_template) = key {
        let key_slots = compile_one(key_template, KEY, hostname, &mut arena, &mut handlers)?;
        templates.push(CompiledTemplate { slots: key_slots });
    }

    Ok(Program {
        arena,
        templates,
        handlers,
    })
}

fn compile_one(
    template: &str,
    fconf_index: usize,
    hostname: &str,
    arena: &mut StringArena,
    handlers: &mut [Vec<Handler>],
) -> Result<Vec<Slot>, CompileError> {
    let tokens = grammar::tokenize(template)?;
    let mut slots = Vec::with_capacity(tokens.len());

    for token in tokens {
        match token {
            Token::Literal(bytes) => {
                slots.push(Slot::Literal(arena.intern(&bytes)));
            }
            Token::Formatter { letter, spec } => {
                let slot_index = slots.len();
                let name = spec.as_ref().map(|s| s.name.as_str());
                let info = letters::resolve(letter, name, hostname)
                    .map_err(|e| e.with_context(template, 0))?;

                let default_ref = resolve_default(arena, &info.default, spec.as_ref());
                let (json_field, value_kind, escape) = apply_modifiers(spec.as_ref());

                for tmpl in &info.handlers {
                    handlers[tmpl.tag.index()].push(build_handler(tmpl, slot_index, fconf_index));
                }

                slots.push(Slot::Dynamic(DynamicSlot {
                    formatter: letter,
                    var_name: name.map(str::to_string),
                    default: default_ref,
                    json_field,
                    value_kind,
                    escape,
                    synthetic: info.synthetic,
                }));
            }
        }
    }

    Ok(slots)
}

fn resolve_default(arena: &mut StringArena, table_default: &[u8], spec: Option<&BraceSpec>) -> ArenaRef {
    let bytes = spec
        .and_then(|s| s.default.as_deref())
        .unwrap_or(table_default);
    arena.intern(bytes)
}

fn apply_modifiers(spec: Option<&BraceSpec>) -> (Option<String>, ValueKind, bool) {
    let Some(spec) = spec else {
        return (None, ValueKind::String, false);
    };
    let value_kind = if spec.options.iter().any(|o| o == "num") {
        ValueKind::Number
    } else {
        ValueKind::String
    };
    let escape = spec.options.iter().any(|o| o == "escape");
    (spec.json_field.clone(), value_kind, escape)
}

fn build_handler(tmpl: &HandlerTemplate, slot_index: usize, fconf_index: usize) -> Handler {
    Handler {
        tag: tmpl.tag,
        origin: tmpl.origin,
        slot_index,
        var: tmpl.var.clone(),
        var_delim: tmpl.var_delim,
        column: tmpl.column,
        parser: tmpl.parser,
        novarmatch: tmpl.novarmatch,
        fconf_index,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_url_and_query_template() {
        let program = compile("%U%q", None, "host").unwrap();
        assert_eq!(program.templates[MAIN].slots.len(), 2);
        assert_eq!(program.templates[MAIN].dynamic_slot_count(), 2);
    }

    #[test]
    fn default_fallback_uses_brace_default() {
        let program = compile("%{X-Y?-}i", None, "host").unwrap();
        let Slot::Dynamic(slot) = &program.templates[MAIN].slots[0] else {
            panic!("expected dynamic slot");
        };
        assert_eq!(program.arena.get(slot.default), b"-");
    }

    #[test]
    fn l_defaults_to_configured_hostname() {
        let program = compile("%l", None, "edge-07").unwrap();
        let Slot::Dynamic(slot) = &program.templates[MAIN].slots[0] else {
            panic!("expected dynamic slot");
        };
        assert_eq!(program.arena.get(slot.default), b"edge-07");
        assert!(program.handlers.iter().all(|h| h.is_empty()));
    }

    #[test]
    fn compiles_key_and_main_independently() {
        let program = compile("%U", Some("%{Varnish:xid}x"), "host").unwrap();
        assert_eq!(program.templates.len(), 2);
        assert_eq!(program.templates[KEY].slots.len(), 1);
    }

    #[test]
    fn handlers_share_tag_bucket_across_fconfs() {
        let program = compile("%U", Some("%U"), "host").unwrap();
        let url_handlers = program.handlers_for(crate::tag::TagId::Url.index());
        assert_eq!(url_handlers.len(), 2);
        assert_eq!(url_handlers[0].fconf_index, MAIN);
        assert_eq!(url_handlers[1].fconf_index, KEY);
    }

    #[test]
    fn rejects_i_without_header_name() {
        assert!(compile("%i", None, "host").is_err());
    }

    #[test]
    fn json_field_and_num_modifiers_apply() {
        let program = compile("%{bytes@b!num}b", None, "host").unwrap();
        let Slot::Dynamic(slot) = &program.templates[MAIN].slots[0] else {
            panic!("expected dynamic slot");
        };
        assert_eq!(slot.json_field.as_deref(), Some("b"));
        assert_eq!(slot.value_kind, ValueKind::Number);
    }
}
