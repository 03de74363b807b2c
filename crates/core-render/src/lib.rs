//! Renderer: on end-of-transaction, emits a flat text line or a
//! JSON document per fconf, KEY before MAIN, then hands each buffer to
//! the configured output adapter and resets the record.

mod json;

use std::sync::atomic::Ordering;

use core_diag::Counters;
use core_format::{Program, Slot, Synthetic, ValueKind};
use core_txcache::{TransactionCache, TxRec};
use json::JsonObjectWriter;

pub const LINE_BUF_CAP: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    String,
    Json,
}

/// Sink for a rendered buffer. The bus adapter reads and writes
/// `rec.key` directly, so it needs mutable access to the record, not
/// just the bytes.
pub trait OutputAdapter {
    fn emit(&mut self, fconf: usize, rec: &mut TxRec, buf: &[u8]) -> anyhow::Result<()>;

    /// Zero-timeout poll to drive delivery callbacks on driver-loop
    /// ticks that didn't emit anything. A no-op for adapters without a
    /// background producer.
    fn poll(&mut self) {}

    /// Drains any outstanding outbound work within `timeout`, called
    /// repeatedly by the driver loop's shutdown phase. Returns the
    /// count still outstanding afterward; zero means fully drained. A
    /// no-op for adapters without a background producer.
    fn drain(&mut self, _timeout: std::time::Duration) -> usize {
        0
    }
}

/// Fixed-capacity append sink. Appends beyond `cap` are silently
/// dropped, matching the silent truncation of the 8192-byte line
/// buffer.
pub struct BoundedBuf {
    buf: Vec<u8>,
    cap: usize,
}

impl BoundedBuf {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap.min(LINE_BUF_CAP)),
            cap,
        }
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    pub fn push(&mut self, byte: u8) {
        if self.buf.len() < self.cap {
            self.buf.push(byte);
        }
    }

    pub fn extend(&mut self, bytes: &[u8]) {
        let room = self.cap.saturating_sub(self.buf.len());
        let n = bytes.len().min(room);
        self.buf.extend_from_slice(&bytes[..n]);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }
}

/// Renders and emits every fconf for `tx_id`'s completed transaction,
/// then resets the record. `encodings` is indexed by fconf
/// (`core_format::{MAIN, KEY}`); a missing entry defaults to `String`.
/// `matcher`, when present, is the reader's optional tag-bitmap
/// matcher; a non-matching transaction is discarded without emitting.
pub fn render_complete(
    program: &Program,
    cache: &mut TransactionCache,
    tx_id: u32,
    counters: &Counters,
    encodings: &[Encoding],
    matcher: Option<&dyn Fn(u64) -> bool>,
    adapter: &mut dyn OutputAdapter,
) -> anyhow::Result<()> {
    let tags_seen = cache.get(tx_id).tags_seen;
    if let Some(matches) = matcher {
        if !matches(tags_seen) {
            cache.reset(tx_id);
            return Ok(());
        }
    }

    let seq = counters.sequence_number.fetch_add(1, Ordering::Relaxed) + 1;
    cache.get(tx_id).seq = seq;
    Counters::incr(&counters.tx);

    let mut buf = BoundedBuf::new(LINE_BUF_CAP);
    let mut result = Ok(());
    // KEY (fconf index 1) before MAIN (fconf index 0): the bus adapter
    // stashes KEY's bytes on `rec.key` for MAIN's produce call to pick up.
    for fconf in (0..program.templates.len()).rev() {
        buf.clear();
        let encoding = encodings.get(fconf).copied().unwrap_or(Encoding::String);
        let rec = cache.get(tx_id);
        render_one(program, rec, fconf, encoding, &mut buf);
        if let Err(e) = adapter.emit(fconf, rec, buf.as_slice()) {
            Counters::incr(&counters.txerr);
            result = Err(e);
            break;
        }
    }

    cache.reset(tx_id);
    result
}

fn render_one(program: &Program, rec: &TxRec, fconf: usize, encoding: Encoding, buf: &mut BoundedBuf) {
    let template = &program.templates[fconf];
    match encoding {
        Encoding::String => render_string(program, rec, fconf, template.slots.iter(), buf),
        Encoding::Json => render_json(program, rec, fconf, template.slots.iter(), buf),
    }
}

fn render_string<'a>(
    program: &Program,
    rec: &TxRec,
    fconf: usize,
    slots: impl Iterator<Item = &'a Slot>,
    buf: &mut BoundedBuf,
) {
    for (idx, slot) in slots.enumerate() {
        match slot {
            Slot::Literal(aref) => buf.extend(program.arena.get(*aref)),
            Slot::Dynamic(dyn_slot) => {
                let value = resolve_value(program, rec, fconf, idx, dyn_slot, rec.seq);
                buf.extend(value.as_ref());
            }
        }
    }
}

fn render_json<'a>(
    program: &Program,
    rec: &TxRec,
    fconf: usize,
    slots: impl Iterator<Item = &'a Slot>,
    buf: &mut BoundedBuf,
) {
    let mut obj = JsonObjectWriter::begin(buf);
    for (idx, slot) in slots.enumerate() {
        // Literal slots (arena id 0) are omitted from JSON output.
        let Slot::Dynamic(dyn_slot) = slot else {
            continue;
        };
        let name = dyn_slot
            .json_field
            .as_deref()
            .map(str::to_string)
            .unwrap_or_else(|| dyn_slot.formatter.to_string());
        let value = resolve_value(program, rec, fconf, idx, dyn_slot, rec.seq);
        match dyn_slot.value_kind {
            ValueKind::Number => obj.number_field(buf, &name, value.as_ref()),
            ValueKind::String => obj.string_field(buf, &name, value.as_ref()),
        }
    }
    obj.finish(buf);
}

/// Borrowed matched bytes, the arena default, or a freshly rendered
/// synthetic value (`%n`'s sequence number — the only synthetic the
/// letter table currently produces; `%l`'s hostname is baked directly
/// into its slot default at compile time).
enum Value<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
}

impl<'a> AsRef<[u8]> for Value<'a> {
    fn as_ref(&self) -> &[u8] {
        match self {
            Value::Borrowed(b) => b,
            Value::Owned(v) => v,
        }
    }
}

fn resolve_value<'a>(
    program: &'a Program,
    rec: &'a TxRec,
    fconf: usize,
    slot_idx: usize,
    slot: &core_format::DynamicSlot,
    seq: u64,
) -> Value<'a> {
    match slot.synthetic {
        Some(Synthetic::Sequence) => Value::Owned(seq.to_string().into_bytes()),
        None => match core_dispatch::resolved(rec, fconf, slot_idx) {
            Some(bytes) => Value::Borrowed(bytes),
            None => Value::Borrowed(program.arena.get(slot.default)),
        },
    }
}
