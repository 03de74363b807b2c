//! Output adapters: `bus`, `stdout`, `null`. All three implement
//! [`core_render::OutputAdapter`]; the driver loop picks one at
//! startup per the `output` configuration key.

use std::io::Write;
use std::time::{Duration, Instant};

use core_diag::{Channel, Counters, RateLimiter};
use core_render::OutputAdapter;
use core_txcache::TxRec;
use core_format::{KEY, MAIN};

use crate::producer::Producer;

/// Produces MAIN renders to the configured topic/partition, stashing
/// KEY renders as `rec.key` for MAIN's produce call to pick up. Every
/// produce call is followed by a zero-timeout poll to drive delivery
/// callbacks.
pub struct BusAdapter<P: Producer> {
    producer: P,
    topic: String,
    partition: i32,
    counters: std::sync::Arc<Counters>,
    rate_limiter: RateLimiter,
}

impl<P: Producer> BusAdapter<P> {
    pub fn new(
        producer: P,
        topic: String,
        partition: i32,
        counters: std::sync::Arc<Counters>,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            producer,
            topic,
            partition,
            counters,
            rate_limiter,
        }
    }
}

impl<P: Producer> OutputAdapter for BusAdapter<P> {
    fn emit(&mut self, fconf: usize, rec: &mut TxRec, buf: &[u8]) -> anyhow::Result<()> {
        if fconf == KEY {
            rec.key = Some(buf.to_vec());
            return Ok(());
        }
        debug_assert_eq!(fconf, MAIN);

        let key = rec.key.take();
        if let Err(err) = self.producer.produce(&self.topic, self.partition, key.as_deref(), buf) {
            // Transport errors are counted and rate-limited, never
            // propagated — the message is dropped.
            Counters::incr(&self.counters.txerr);
            let (decision, summary) = self.rate_limiter.record(Channel::ProduceErrors, Instant::now());
            if let Some(summary) = summary {
                tracing::warn!(target: "diag", total = summary.total, suppressed = summary.suppressed, "produce-error rate limit period closed");
            }
            if decision == core_diag::Decision::Log {
                tracing::warn!(target: "diag", error = %err, "producer enqueue failed, message dropped");
            }
        }
        self.producer.poll(Duration::ZERO);
        Ok(())
    }

    fn poll(&mut self) {
        self.producer.poll(Duration::ZERO);
    }

    fn drain(&mut self, timeout: Duration) -> usize {
        self.producer.flush(timeout)
    }
}

/// Prints the buffer plus a trailing newline.
pub struct StdoutAdapter;

impl OutputAdapter for StdoutAdapter {
    fn emit(&mut self, _fconf: usize, _rec: &mut TxRec, buf: &[u8]) -> anyhow::Result<()> {
        let mut out = std::io::stdout().lock();
        out.write_all(buf)?;
        out.write_all(b"\n")?;
        Ok(())
    }
}

/// Discards every render. Useful for load testing the pipeline without
/// a live bus.
pub struct NullAdapter;

impl OutputAdapter for NullAdapter {
    fn emit(&mut self, _fconf: usize, _rec: &mut TxRec, _buf: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
}
