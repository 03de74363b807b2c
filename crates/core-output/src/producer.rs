//! The bus producer seam. `rdkafka::producer::BaseProducer` backs the
//! real implementation: it's the idiomatic Rust Kafka client for
//! talking to a broker from a synchronous driver loop.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use core_diag::Counters;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{BaseProducer, BaseRecord, DeliveryResult, Producer as _, ProducerContext};
use rdkafka::ClientContext;

/// The producer seam every output adapter that talks to the bus goes
/// through. `poll`/`flush` return the count of events the call
/// serviced, so the driver loop can tell when a shutdown drain has
/// finished.
pub trait Producer {
    fn produce(&mut self, topic: &str, partition: i32, key: Option<&[u8]>, value: &[u8]) -> anyhow::Result<()>;
    fn poll(&mut self, timeout: Duration) -> usize;
    /// Attempts to drain the outbound queue within `timeout`; returns
    /// the number of messages still queued afterward (zero means fully
    /// drained).
    fn flush(&mut self, timeout: Duration) -> usize;
}

/// Bridges rdkafka's delivery callback (invoked on the producer's own
/// I/O thread) back to the process-wide counters via atomic
/// increments, never touching the hot dispatch path.
struct DeliveryContext {
    counters: Arc<Counters>,
}

impl ClientContext for DeliveryContext {}

impl ProducerContext for DeliveryContext {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _delivery_opaque: Self::DeliveryOpaque) {
        if result.is_err() {
            Counters::incr(&self.counters.producer_delivery_errors);
        }
    }
}

pub struct KafkaProducer {
    inner: BaseProducer<DeliveryContext>,
}

impl KafkaProducer {
    /// Builds a producer from pass-through `kafka.*` config keys.
    /// `bootstrap` is `bootstrap.servers`; `opts` are the remaining
    /// `kafka.*` keys with the prefix stripped.
    pub fn new(
        bootstrap: &str,
        opts: impl IntoIterator<Item = (String, String)>,
        counters: Arc<Counters>,
    ) -> anyhow::Result<Self> {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", bootstrap);
        for (key, value) in opts {
            config.set(key, value);
        }
        let inner: BaseProducer<DeliveryContext> = config
            .create_with_context(DeliveryContext { counters })
            .context("failed to create Kafka producer handle")?;
        Ok(Self { inner })
    }
}

impl Producer for KafkaProducer {
    fn produce(&mut self, topic: &str, partition: i32, key: Option<&[u8]>, value: &[u8]) -> anyhow::Result<()> {
        let mut record: BaseRecord<[u8], [u8], ()> = BaseRecord::to(topic).payload(value).partition(partition);
        if let Some(k) = key {
            record = record.key(k);
        }
        self.inner
            .send(record)
            .map_err(|(err, _record)| anyhow::anyhow!(err))
            .context("kafka enqueue failed")
    }

    fn poll(&mut self, timeout: Duration) -> usize {
        self.inner.poll(timeout);
        self.inner.in_flight_count() as usize
    }

    fn flush(&mut self, timeout: Duration) -> usize {
        if let Err(err) = self.inner.flush(timeout) {
            tracing::warn!(target: "diag", error = %err, "producer flush did not fully drain within timeout");
        }
        self.inner.in_flight_count() as usize
    }
}
