//! Tag dispatcher: on each inbound tag record, finds matching
//! handlers, runs their parsers, and fills transaction-cache slots.
//!
//! This crate is single-threaded by construction: it owns no locks and
//! expects to be driven from one OS thread per the `logbridge-bin`
//! driver loop.

mod parsers;
mod varmatch;

use core_diag::Counters;
use core_format::{Program, Slot, TagRecord, END_OF_TRANSACTION};
use core_scratch::ScratchSlice;
use core_txcache::{TransactionCache, TxRec};

pub const DEFAULT_TAG_SIZE_MAX: usize = 2048;

/// What happened to the transaction this tag belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// More tags are still expected for this transaction.
    Pending,
    /// This was the end-of-transaction tag; `TxId` is ready to render.
    Complete(u32),
}

pub struct Dispatcher {
    tag_size_max: usize,
    time_format: String,
}

impl Dispatcher {
    pub fn new(tag_size_max: usize, time_format: impl Into<String>) -> Self {
        Self {
            tag_size_max,
            time_format: time_format.into(),
        }
    }

    /// Truncates oversize payloads, walks the handlers registered for
    /// this tag id in registration order, and commits the first match
    /// per slot.
    pub fn on_tag(
        &self,
        program: &Program,
        cache: &mut TransactionCache,
        counters: &Counters,
        tag: TagRecord<'_>,
    ) -> Outcome {
        if tag.origin == 0 {
            return Outcome::Pending;
        }

        let bytes = if tag.bytes.len() > self.tag_size_max {
            Counters::incr(&counters.truncated);
            &tag.bytes[..self.tag_size_max]
        } else {
            tag.bytes
        };

        let rec = cache.get(tag.tx_id);
        rec.tags_seen |= tag.seen_bitmap;

        for handler in program.handlers_for(tag.tag.index()) {
            if rec.is_matched(handler.fconf_index, handler.slot_index) {
                continue;
            }
            if handler.origin & tag.origin == 0 {
                continue;
            }

            let Some(payload) = resolve_payload(handler, bytes) else {
                continue;
            };
            let Some(payload) = apply_column(handler, payload) else {
                continue;
            };

            let slot = slot_for(program, handler);
            if handler.parser == core_format::Parser::Time {
                commit_time(rec, handler, slot, payload, &self.time_format, counters);
            } else if let Some(parsed) = parsers::run(handler.parser, payload) {
                commit_bytes(rec, handler, slot, parsed.as_bytes(), counters);
            }
        }

        if tag.tag == END_OF_TRANSACTION {
            Outcome::Complete(tag.tx_id)
        } else {
            Outcome::Pending
        }
    }
}

fn slot_for<'p>(program: &'p Program, handler: &core_format::Handler) -> &'p core_format::DynamicSlot {
    match &program.templates[handler.fconf_index].slots[handler.slot_index] {
        Slot::Dynamic(d) => d,
        Slot::Literal(_) => unreachable!("handlers only ever target dynamic slots"),
    }
}

/// Step 4's var-prefix check, with the `novarmatch` relaxation: when
/// set, a failed prefix match falls back to the raw payload instead of
/// skipping the handler outright. This lets a parser (chiefly `%t`'s
/// backend `date` binding) probe every tag occurrence of a shared tag
/// id — e.g. every `RxHeader` — and rely on the parser itself (here,
/// HTTP-date parsing) to reject the ones that aren't the header it
/// wants, rather than requiring an exact prefix match up front.
fn resolve_payload<'a>(handler: &core_format::Handler, bytes: &'a [u8]) -> Option<&'a [u8]> {
    match &handler.var {
        None => Some(bytes),
        Some(var) => match varmatch::strip_var_prefix(bytes, var, handler.var_delim) {
            Some(payload) => Some(payload),
            None if handler.novarmatch => Some(bytes),
            None => None,
        },
    }
}

fn apply_column<'a>(handler: &core_format::Handler, payload: &'a [u8]) -> Option<&'a [u8]> {
    match handler.column {
        Some(n) => varmatch::nth_token(payload, n),
        None => Some(payload),
    }
}

/// Carries a parser's output (plain bytes, borrowed or owned) into the
/// transaction's scratch region, applying the slot's escape flag. The
/// `match_assign` path for the common case where the source has never
/// touched scratch.
fn commit_bytes(
    rec: &mut TxRec,
    handler: &core_format::Handler,
    slot: &core_format::DynamicSlot,
    bytes: &[u8],
    counters: &Counters,
) -> bool {
    if rec.is_matched(handler.fconf_index, handler.slot_index) {
        return false;
    }
    let (value, overflowed) = if slot.escape {
        core_encode::escape(&mut rec.scratch, bytes)
    } else {
        rec.scratch.store(bytes)
    };
    note_overflow(overflowed, counters);
    rec.try_set(handler.fconf_index, handler.slot_index, value)
}

/// `%t`'s `match_assign` path: the parser already wrote its result
/// into scratch (time formatting needs the allocator for its fixed
/// 64-byte buffer), so escaping — if requested — duplicates that
/// in-scratch value onto the stack, rewinds it, and writes the escaped
/// form back in its place. This is the `match_assign` branch for a
/// source that's already inside the record's own scratch region.
fn commit_time(
    rec: &mut TxRec,
    handler: &core_format::Handler,
    slot: &core_format::DynamicSlot,
    payload: &[u8],
    fmt: &str,
    counters: &Counters,
) -> bool {
    if rec.is_matched(handler.fconf_index, handler.slot_index) {
        return false;
    }
    let Some(raw) = core_encode::time_format(&mut rec.scratch, payload, fmt) else {
        return false;
    };
    if !slot.escape {
        return rec.try_set(handler.fconf_index, handler.slot_index, raw);
    }
    let duplicated: Vec<u8> = rec.scratch.resolve(raw).to_vec();
    rec.scratch.rewind(raw);
    let (escaped, overflowed) = core_encode::escape(&mut rec.scratch, &duplicated);
    note_overflow(overflowed, counters);
    rec.try_set(handler.fconf_index, handler.slot_index, escaped)
}

fn note_overflow(overflowed: bool, counters: &Counters) {
    if overflowed {
        Counters::incr(&counters.scratch_overflows);
        Counters::incr(&counters.overflow_buffers_allocated);
    }
}

/// Resolves a slot's captured value, if any, as a byte slice into the
/// record's scratch region. Used by `core-render` at render time.
pub fn resolved<'r>(rec: &'r TxRec, fconf: usize, slot: usize) -> Option<&'r [u8]> {
    rec.matched(fconf, slot).map(|s: ScratchSlice| rec.scratch.resolve(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_format::{compile, origin, TagId, TagRecord as TR};

    fn counters() -> Counters {
        Counters::new()
    }

    #[test]
    fn s1_path_and_querystring() {
        let program = compile("%U%q", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(DEFAULT_TAG_SIZE_MAX, core_encode::DEFAULT_TIME_FORMAT);
        let counters = counters();

        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::Url, 7, origin::CLIENT, b"/a/b?k=1&m=2", 0),
        );
        let outcome = dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::ReqEnd, 7, origin::CLIENT, b"", 0),
        );
        assert_eq!(outcome, Outcome::Complete(7));

        let rec = cache.get(7);
        let u = resolved(rec, 0, 0).unwrap();
        let q = resolved(rec, 0, 1).unwrap();
        assert_eq!([u, q].concat(), b"/a/b?k=1&m=2");
    }

    #[test]
    fn s2_default_fallback_when_unmatched() {
        let program = compile("%{X-Y?-}i", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(DEFAULT_TAG_SIZE_MAX, core_encode::DEFAULT_TIME_FORMAT);
        let counters = counters();

        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::ReqEnd, 1, origin::CLIENT, b"", 0),
        );
        let rec = cache.get(1);
        assert!(resolved(rec, 0, 0).is_none());
    }

    #[test]
    fn s3_basic_auth_user_extraction() {
        let program = compile("%u", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(DEFAULT_TAG_SIZE_MAX, core_encode::DEFAULT_TIME_FORMAT);
        let counters = counters();

        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(
                TagId::RxHeader,
                1,
                origin::CLIENT,
                b"authorization: Basic YWxpY2U6c2VjcmV0",
                0,
            ),
        );
        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::ReqEnd, 1, origin::CLIENT, b"", 0),
        );
        let rec = cache.get(1);
        assert_eq!(resolved(rec, 0, 0).unwrap(), b"alice");
    }

    #[test]
    fn s4_hitmiss_normalizes_pass_to_miss() {
        let program = compile("%{Varnish:hitmiss}x", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(DEFAULT_TAG_SIZE_MAX, core_encode::DEFAULT_TIME_FORMAT);
        let counters = counters();

        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::VclCall, 1, origin::ANY, b"pass", 0),
        );
        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::ReqEnd, 1, origin::CLIENT, b"", 0),
        );
        let rec = cache.get(1);
        assert_eq!(resolved(rec, 0, 0).unwrap(), b"miss");
    }

    #[test]
    fn first_tag_wins_across_two_records() {
        let program = compile("%{X}i", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(DEFAULT_TAG_SIZE_MAX, core_encode::DEFAULT_TIME_FORMAT);
        let counters = counters();

        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::RxHeader, 1, origin::CLIENT, b"x: first", 0),
        );
        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::RxHeader, 1, origin::CLIENT, b"x: second", 0),
        );
        let rec = cache.get(1);
        assert_eq!(resolved(rec, 0, 0).unwrap(), b"first");
    }

    #[test]
    fn truncates_oversize_payload_and_counts_it() {
        let program = compile("%{X}i", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(8, core_encode::DEFAULT_TIME_FORMAT);
        let counters = counters();

        let mut payload = b"x: ".to_vec();
        payload.extend(std::iter::repeat(b'a').take(64));
        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::RxHeader, 1, origin::CLIENT, &payload, 0),
        );
        assert_eq!(counters.snapshot().truncated, 1);
    }

    #[test]
    fn backend_date_header_parses_via_novarmatch_probing() {
        let program = compile("%t", None, "host").unwrap();
        let mut cache = TransactionCache::new(16, 5, 512, vec![program.templates[0].slots.len()]);
        let dispatcher = Dispatcher::new(DEFAULT_TAG_SIZE_MAX, "%Y");
        let counters = counters();

        // A non-matching header probed first must not poison the slot.
        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(TagId::RxHeader, 1, origin::BACKEND, b"content-type: text/html", 0),
        );
        dispatcher.on_tag(
            &program,
            &mut cache,
            &counters,
            TR::new(
                TagId::RxHeader,
                1,
                origin::BACKEND,
                b"date: Mon, 01 Jan 2024 00:00:00 GMT",
                0,
            ),
        );
        let rec = cache.get(1);
        assert_eq!(resolved(rec, 0, 0).unwrap(), b"2024");
    }
}
