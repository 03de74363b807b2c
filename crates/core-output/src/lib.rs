//! Output adapters plus the `TagReader`/`Producer` trait seams for the
//! two external collaborators this core treats as interfaces only: the
//! accelerator's shared-memory log and the bus client library.

mod adapter;
mod producer;
mod reader;

pub use adapter::{BusAdapter, NullAdapter, StdoutAdapter};
pub use producer::{KafkaProducer, Producer};
pub use reader::{FakeReader, FakeRecord, TagReader};

#[cfg(feature = "vsl-ffi")]
pub use reader::ffi::VslReader;
