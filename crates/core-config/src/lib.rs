//! Configuration-file loading. Reads a flat `key = value` properties
//! file — the same shape `rdkafka`'s own `ClientConfig` expects for
//! its pass-through `kafka.*` keys. [`discover`] finds a default path,
//! [`load_from`] is the single entry point, unknown keys are
//! tolerated, and a typed, defaulted struct carries the result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{path}:{line}: malformed line (expected `key = value` or `key value`): {text:?}")]
    MalformedLine {
        path: PathBuf,
        line: usize,
        text: String,
    },
    #[error("{path}: `{key}` must be {expected}, got {value:?}")]
    InvalidValue {
        path: PathBuf,
        key: &'static str,
        expected: &'static str,
        value: String,
    },
    #[error("format.main is required")]
    MissingFormatMain,
    #[error("an empty `topic` is a configuration error when output = \"bus\"")]
    EmptyTopicForBusOutput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    String,
    Json,
}

impl Encoding {
    fn parse(path: &Path, key: &'static str, value: &str) -> Result<Self, ConfigError> {
        match value {
            "string" => Ok(Encoding::String),
            "json" => Ok(Encoding::Json),
            other => Err(ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key,
                expected: "one of \"string\", \"json\"",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Bus,
    Stdout,
    Null,
}

impl Default for OutputKind {
    fn default() -> Self {
        OutputKind::Bus
    }
}

impl OutputKind {
    fn parse(path: &Path, value: &str) -> Result<Self, ConfigError> {
        match value {
            "bus" => Ok(OutputKind::Bus),
            "stdout" => Ok(OutputKind::Stdout),
            "null" => Ok(OutputKind::Null),
            other => Err(ConfigError::InvalidValue {
                path: path.to_path_buf(),
                key: "output",
                expected: "one of \"bus\", \"stdout\", \"null\"",
                value: other.to_string(),
            }),
        }
    }
}

/// `log.to`'s `syslog|stderr` bitmask. Both bits may be set; `syslog`
/// is accepted but not wired to an actual sink in this workspace (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogTargets {
    pub syslog: bool,
    pub stderr: bool,
}

impl Default for LogTargets {
    fn default() -> Self {
        Self {
            syslog: false,
            stderr: true,
        }
    }
}

impl LogTargets {
    fn parse(value: &str) -> Self {
        let mut targets = LogTargets {
            syslog: false,
            stderr: false,
        };
        for token in value.split('|').map(str::trim) {
            match token {
                "syslog" => targets.syslog = true,
                "stderr" => targets.stderr = true,
                _ => {}
            }
        }
        targets
    }
}

/// Newtype so `Config` can derive `Default` without committing to a
/// default encoding at the type level; resolved by
/// [`Config::main_encoding`]/[`Config::key_encoding`].
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodingOrDefault(Option<Encoding>);

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub format_main: String,
    pub format_key: Option<String>,
    pub format_main_encoding: EncodingOrDefault,
    pub format_key_encoding: EncodingOrDefault,
    pub scratch_size: usize,
    pub tag_size_max: usize,
    pub logline_hashsize: usize,
    pub logline_hash_max: usize,
    pub datacopy: bool,
    pub log_level: u8,
    pub log_to: LogTargets,
    pub log_rate_max: u64,
    pub log_rate_period_secs: u64,
    pub stats_interval_secs: u64,
    pub stats_file: Option<PathBuf>,
    pub topic: String,
    pub partition: i32,
    /// Makes the "empty topic with the bus adapter selected is a
    /// configuration error" rule concretely checkable (see
    /// DESIGN.md). Defaults to `bus`.
    pub output: OutputKind,
    pub kafka: HashMap<String, String>,
    pub topic_opts: HashMap<String, String>,
    pub varnish_args: Vec<(String, String)>,
}

impl Config {
    pub fn main_encoding(&self) -> Encoding {
        self.format_main_encoding.0.unwrap_or(Encoding::String)
    }

    pub fn key_encoding(&self) -> Encoding {
        self.format_key_encoding.0.unwrap_or(Encoding::String)
    }
}

const DEFAULT_SCRATCH_SIZE: usize = 4096; // core_scratch::DEFAULT_SIZE
const DEFAULT_TAG_SIZE_MAX: usize = 2048; // core_dispatch::DEFAULT_TAG_SIZE_MAX
const DEFAULT_HASH_SIZE: usize = 5000; // core_txcache::DEFAULT_HASH_SIZE
const DEFAULT_BUCKET_CAP: usize = 5; // core_txcache::DEFAULT_BUCKET_CAP
const DEFAULT_LOG_LEVEL: u8 = 6;
const DEFAULT_LOG_RATE_MAX: u64 = 10;
const DEFAULT_LOG_RATE_PERIOD_SECS: u64 = 60;
const DEFAULT_STATS_INTERVAL_SECS: u64 = 60;
const DEFAULT_PARTITION: i32 = -1;

/// Looks for a config file at `$XDG_CONFIG_HOME/logbridge/logbridge.conf`,
/// falling back to `$HOME/.config/logbridge/logbridge.conf`. Returns
/// `None` when neither variable is set or no file is there, in which
/// case the caller should fall back to an explicit `-S` path or fail.
pub fn discover() -> Option<PathBuf> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))?;
    let candidate = base.join("logbridge").join("logbridge.conf");
    candidate.is_file().then_some(candidate)
}

/// Parses `path`. `path` being `None` (no `-S` flag, nothing found by
/// [`discover`]) is reported as a missing `format.main`, a fatal
/// startup error.
pub fn load_from(path: Option<&Path>) -> Result<Config, ConfigError> {
    let Some(path) = path else {
        return Err(ConfigError::MissingFormatMain);
    };

    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut config = Config {
        scratch_size: DEFAULT_SCRATCH_SIZE,
        tag_size_max: DEFAULT_TAG_SIZE_MAX,
        logline_hashsize: DEFAULT_HASH_SIZE,
        logline_hash_max: DEFAULT_BUCKET_CAP,
        datacopy: true,
        log_level: DEFAULT_LOG_LEVEL,
        log_to: LogTargets::default(),
        log_rate_max: DEFAULT_LOG_RATE_MAX,
        log_rate_period_secs: DEFAULT_LOG_RATE_PERIOD_SECS,
        stats_interval_secs: DEFAULT_STATS_INTERVAL_SECS,
        partition: DEFAULT_PARTITION,
        output: OutputKind::Bus,
        ..Config::default()
    };

    for (number, raw_line) in text.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = split_key_value(line).ok_or_else(|| ConfigError::MalformedLine {
            path: path.to_path_buf(),
            line: number + 1,
            text: raw_line.to_string(),
        })?;
        apply_key(&mut config, path, key, value)?;
    }

    if config.format_main.is_empty() {
        return Err(ConfigError::MissingFormatMain);
    }
    if config.output == OutputKind::Bus && config.topic.is_empty() {
        return Err(ConfigError::EmptyTopicForBusOutput);
    }

    Ok(config)
}

fn split_key_value(line: &str) -> Option<(&str, &str)> {
    if let Some(idx) = line.find('=') {
        let key = line[..idx].trim();
        let value = line[idx + 1..].trim();
        return (!key.is_empty()).then_some((key, value));
    }
    let mut parts = line.splitn(2, char::is_whitespace);
    let key = parts.next()?.trim();
    let value = parts.next().unwrap_or("").trim();
    (!key.is_empty()).then_some((key, value))
}

fn apply_key(config: &mut Config, path: &Path, key: &str, value: &str) -> Result<(), ConfigError> {
    if let Some(name) = key.strip_prefix("kafka.") {
        config.kafka.insert(name.to_string(), value.to_string());
        return Ok(());
    }
    if let Some(name) = key.strip_prefix("topic.") {
        config.topic_opts.insert(name.to_string(), value.to_string());
        return Ok(());
    }
    if let Some(name) = key.strip_prefix("varnish.arg.") {
        config.varnish_args.push((name.to_string(), value.to_string()));
        return Ok(());
    }

    match key {
        "format.main" => config.format_main = value.to_string(),
        "format.key" => config.format_key = (!value.is_empty()).then(|| value.to_string()),
        "format.main.encoding" => {
            config.format_main_encoding = EncodingOrDefault(Some(Encoding::parse(path, "format.main.encoding", value)?))
        }
        "format.key.encoding" => {
            config.format_key_encoding = EncodingOrDefault(Some(Encoding::parse(path, "format.key.encoding", value)?))
        }
        "scratch.size" => config.scratch_size = parse_usize(path, "scratch.size", value)?,
        "tag.size.max" => config.tag_size_max = parse_usize(path, "tag.size.max", value)?,
        "logline.hashsize" => config.logline_hashsize = parse_usize(path, "logline.hashsize", value)?,
        "logline.hash.max" => config.logline_hash_max = parse_usize(path, "logline.hash.max", value)?,
        "datacopy" => config.datacopy = parse_bool(path, "datacopy", value)?,
        "log.level" => {
            let level = parse_usize(path, "log.level", value)?;
            if level > 7 {
                return Err(ConfigError::InvalidValue {
                    path: path.to_path_buf(),
                    key: "log.level",
                    expected: "0-7",
                    value: value.to_string(),
                });
            }
            config.log_level = level as u8;
        }
        "log.to" => config.log_to = LogTargets::parse(value),
        "log.rate.max" => config.log_rate_max = parse_u64(path, "log.rate.max", value)?,
        "log.rate.period" => config.log_rate_period_secs = parse_u64(path, "log.rate.period", value)?,
        "stats.interval" => config.stats_interval_secs = parse_u64(path, "stats.interval", value)?,
        "stats.file" => config.stats_file = (!value.is_empty()).then(|| PathBuf::from(value)),
        "topic" => config.topic = value.to_string(),
        "partition" => config.partition = parse_i32(path, "partition", value)?,
        "output" => config.output = OutputKind::parse(path, value)?,
        _ => {
            tracing::debug!(target: "config", key, "ignoring unknown configuration key");
        }
    }
    Ok(())
}

fn parse_usize(path: &Path, key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        path: path.to_path_buf(),
        key,
        expected: "a non-negative integer",
        value: value.to_string(),
    })
}

fn parse_u64(path: &Path, key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        path: path.to_path_buf(),
        key,
        expected: "a non-negative integer",
        value: value.to_string(),
    })
}

fn parse_i32(path: &Path, key: &'static str, value: &str) -> Result<i32, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        path: path.to_path_buf(),
        key,
        expected: "an integer",
        value: value.to_string(),
    })
}

fn parse_bool(path: &Path, key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::InvalidValue {
            path: path.to_path_buf(),
            key,
            expected: "true/false, 1/0, or yes/no",
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_core_keys_and_applies_defaults() {
        let file = write_config(
            "format.main = %U%q\n\
             topic = requests\n\
             scratch.size 8192\n\
             # a comment\n\
             \n\
             log.level=3\n",
        );
        let config = load_from(Some(file.path())).unwrap();
        assert_eq!(config.format_main, "%U%q");
        assert_eq!(config.topic, "requests");
        assert_eq!(config.scratch_size, 8192);
        assert_eq!(config.log_level, 3);
        assert_eq!(config.logline_hashsize, DEFAULT_HASH_SIZE);
        assert_eq!(config.main_encoding(), Encoding::String);
    }

    #[test]
    fn passes_through_kafka_topic_and_varnish_arg_prefixes() {
        let file = write_config(
            "format.main = %U\n\
             topic = requests\n\
             kafka.bootstrap.servers = localhost:9092\n\
             topic.compression.type = snappy\n\
             varnish.arg.n = /var/lib/varnish\n",
        );
        let config = load_from(Some(file.path())).unwrap();
        assert_eq!(
            config.kafka.get("bootstrap.servers").map(String::as_str),
            Some("localhost:9092")
        );
        assert_eq!(
            config.topic_opts.get("compression.type").map(String::as_str),
            Some("snappy")
        );
        assert_eq!(config.varnish_args, vec![("n".to_string(), "/var/lib/varnish".to_string())]);
    }

    #[test]
    fn empty_topic_with_bus_output_is_an_error() {
        let file = write_config("format.main = %U\n");
        let err = load_from(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::EmptyTopicForBusOutput));
    }

    #[test]
    fn empty_topic_is_fine_for_stdout_output() {
        let file = write_config("format.main = %U\noutput = stdout\n");
        let config = load_from(Some(file.path())).unwrap();
        assert_eq!(config.output, OutputKind::Stdout);
    }

    #[test]
    fn missing_format_main_is_an_error() {
        let file = write_config("topic = requests\n");
        let err = load_from(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFormatMain));
    }

    #[test]
    fn unknown_keys_are_tolerated() {
        let file = write_config("format.main = %U\ntopic = requests\nsome.future.key = 1\n");
        assert!(load_from(Some(file.path())).is_ok());
    }

    #[test]
    fn rejects_out_of_range_log_level() {
        let file = write_config("format.main = %U\ntopic = requests\nlog.level = 9\n");
        let err = load_from(Some(file.path())).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "log.level", .. }));
    }

    #[test]
    fn log_to_parses_both_bits() {
        let file = write_config("format.main = %U\ntopic = requests\nlog.to = syslog|stderr\n");
        let config = load_from(Some(file.path())).unwrap();
        assert!(config.log_to.syslog);
        assert!(config.log_to.stderr);
    }

    #[test]
    fn missing_path_is_reported_as_missing_format_main() {
        let err = load_from(None).unwrap_err();
        assert!(matches!(err, ConfigError::MissingFormatMain));
    }
}
