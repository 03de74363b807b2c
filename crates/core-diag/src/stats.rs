use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};

use crate::counters::CountersSnapshot;

/// Append-only stats file, emitted periodically as a JSON document.
/// Reopened lazily on `HUP` — the same `tracing-appender::rolling::never`
/// + `non_blocking` pairing `logbridge-bin` uses for its own log file,
/// pointed at a second path.
pub struct StatsSink {
    dir: PathBuf,
    filename: String,
    writer: NonBlocking,
    _guard: WorkerGuard,
}

impl StatsSink {
    pub fn open(path: &Path) -> Result<Self> {
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();
        let filename = path
            .file_name()
            .and_then(|f| f.to_str())
            .context("stats file path has no file name")?
            .to_string();
        let appender = tracing_appender::rolling::never(&dir, &filename);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok(Self {
            dir,
            filename,
            writer,
            _guard: guard,
        })
    }

    /// Drops the current appender and recreates it against the same
    /// path, so an external rotator (rename-then-signal) is picked up
    /// on the next [`emit`](Self::emit).
    pub fn reopen(&mut self) -> Result<()> {
        let reopened = Self::open(&self.dir.join(&self.filename))?;
        *self = reopened;
        Ok(())
    }

    pub fn emit(&mut self, counters: &CountersSnapshot) -> Result<()> {
        let line = serde_json::to_string(counters).context("serialize counters")?;
        writeln!(self.writer, "{line}").context("write stats line")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_one_json_line_per_call() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let mut sink = StatsSink::open(&path).unwrap();
        sink.emit(&CountersSnapshot {
            tx: 3,
            ..Default::default()
        })
        .unwrap();
        drop(sink);
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"tx\":3"));
    }

    #[test]
    fn reopen_preserves_target_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.json");
        let mut sink = StatsSink::open(&path).unwrap();
        sink.emit(&CountersSnapshot::default()).unwrap();
        sink.reopen().unwrap();
        sink.emit(&CountersSnapshot {
            tx: 1,
            ..Default::default()
        })
        .unwrap();
        drop(sink);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
