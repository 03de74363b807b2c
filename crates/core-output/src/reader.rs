//! The reader seam: the accelerator's shared-memory tag-log iterator.
//! The real binding is FFI over a system library this workspace
//! doesn't carry; [`FakeReader`] is the test double every other
//! crate's integration tests are built on.

use core_format::TagRecord;

/// Pulls pending tag records from the accelerator log and feeds them
/// to the dispatcher one at a time via `on_tag`.
pub trait TagReader {
    /// Dispatches whatever records are currently available, calling
    /// `on_tag` once per record. Blocks (in a real binding) until at
    /// least one record is available. Returns `Ok(false)` once the log
    /// is exhausted (end of input; the driver loop should begin
    /// shutdown) and `Ok(true)` otherwise.
    fn dispatch_pending(&mut self, on_tag: &mut dyn FnMut(TagRecord<'_>)) -> anyhow::Result<bool>;

    /// Hands an unrecognized leading-dash CLI argument to the reader's
    /// own argument parser, since the reader owns a namespace of flags
    /// this core never enumerates.
    fn pass_arg(&mut self, arg: &str) -> anyhow::Result<()>;

    /// The optional post-completion tag-bitmap matcher, delegated
    /// entirely to the reader — this core never computes bitmap
    /// membership itself. Defaults to "always matches" for readers
    /// that don't support the `-m` flag.
    fn matches(&self, _tags_seen: u64) -> bool {
        true
    }
}

/// One queued record for [`FakeReader`]: owned bytes so the reader can
/// hand out a borrow scoped to a single `dispatch_pending` call, the
/// same lifetime shape the real shared-memory binding has.
pub struct FakeRecord {
    pub tag: core_format::TagId,
    pub tx_id: u32,
    pub origin: u8,
    pub bytes: Vec<u8>,
    pub seen_bitmap: u64,
}

impl FakeRecord {
    pub fn new(tag: core_format::TagId, tx_id: u32, origin: u8, bytes: impl Into<Vec<u8>>, seen_bitmap: u64) -> Self {
        Self {
            tag,
            tx_id,
            origin,
            bytes: bytes.into(),
            seen_bitmap,
        }
    }
}

/// Replays a fixed script of records, one per `dispatch_pending` call,
/// used by integration tests across `core-dispatch`/`core-render`/
/// `logbridge-bin`.
pub struct FakeReader {
    records: Vec<FakeRecord>,
    pos: usize,
    passed_args: Vec<String>,
}

impl FakeReader {
    pub fn new(records: Vec<FakeRecord>) -> Self {
        Self {
            records,
            pos: 0,
            passed_args: Vec::new(),
        }
    }

    pub fn passed_args(&self) -> &[String] {
        &self.passed_args
    }
}

impl TagReader for FakeReader {
    fn dispatch_pending(&mut self, on_tag: &mut dyn FnMut(TagRecord<'_>)) -> anyhow::Result<bool> {
        let Some(record) = self.records.get(self.pos) else {
            return Ok(false);
        };
        self.pos += 1;
        on_tag(TagRecord::new(
            record.tag,
            record.tx_id,
            record.origin,
            &record.bytes,
            record.seen_bitmap,
        ));
        Ok(true)
    }

    fn pass_arg(&mut self, arg: &str) -> anyhow::Result<()> {
        self.passed_args.push(arg.to_string());
        Ok(())
    }
}

#[cfg(feature = "vsl-ffi")]
pub mod ffi {
    //! Real shared-memory binding. Left unimplemented: linking requires
    //! the accelerator's system library, which this workspace does not
    //! vendor. A production build enables `vsl-ffi` and supplies the
    //! vendor's headers/library via its own build script.

    use super::TagReader;
    use core_format::TagRecord;

    pub struct VslReader {
        _private: (),
    }

    impl VslReader {
        pub fn new() -> Self {
            Self { _private: () }
        }
    }

    impl Default for VslReader {
        fn default() -> Self {
            Self::new()
        }
    }

    impl TagReader for VslReader {
        fn dispatch_pending(&mut self, _on_tag: &mut dyn FnMut(TagRecord<'_>)) -> anyhow::Result<bool> {
            anyhow::bail!("vsl-ffi binding not vendored in this workspace")
        }

        fn pass_arg(&mut self, _arg: &str) -> anyhow::Result<()> {
            anyhow::bail!("vsl-ffi binding not vendored in this workspace")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_format::{origin, TagId};

    #[test]
    fn dispatches_one_record_per_call_in_order() {
        let mut reader = FakeReader::new(vec![
            FakeRecord::new(TagId::Url, 1, origin::CLIENT, b"/a".as_slice(), 0),
            FakeRecord::new(TagId::ReqEnd, 1, origin::CLIENT, b"".as_slice(), 0),
        ]);
        let mut seen = Vec::new();
        while reader.dispatch_pending(&mut |rec| seen.push((rec.tag, rec.bytes.to_vec()))).unwrap() {}
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].1, b"/a");
    }

    #[test]
    fn pass_arg_records_unrecognized_flags() {
        let mut reader = FakeReader::new(vec![]);
        reader.pass_arg("-n").unwrap();
        assert_eq!(reader.passed_args(), &["-n".to_string()]);
    }
}
