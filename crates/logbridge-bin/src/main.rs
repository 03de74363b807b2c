//! `logbridge`: tails a web-accelerator's shared-memory transaction
//! log, assembles per-transaction records with `core-dispatch`, and
//! publishes rendered observations onto a message-bus topic via
//! `core-output`'s `bus`/`stdout`/`null` adapters.
//!
//! Command line: `logbridge [VSL_ARGS] [-h] [-S CONFIG_PATH] [-m]`.
//! `VSL_ARGS` are forwarded verbatim to the reader's own argument
//! parser rather than parsed here — `clap`'s declarative matcher has
//! no clean way to accept arbitrary unrecognized leading-dash flags
//! interleaved with ours, so this binary walks `std::env::args()` by
//! hand, the same shape a traditional `getopt(argc, argv, VSL_ARGS
//! "hS:m")` loop has (see DESIGN.md).

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use core_config::{Config, OutputKind};
use core_diag::{Channel, Counters, RateLimiter, StatsSink};
use core_dispatch::{Dispatcher, Outcome};
use core_format::Program;
use core_output::{BusAdapter, KafkaProducer, NullAdapter, StdoutAdapter, TagReader};
use core_render::{render_complete, Encoding, OutputAdapter};
use core_txcache::TransactionCache;

#[cfg(feature = "vsl-ffi")]
use core_output::VslReader;

/// Three-state termination counter: 1 while running, 0 once the
/// dispatch loop should exit and the drain phase begins, reset to 1
/// for the drain phase itself, then a further decrement to -1 forces
/// an immediate exit from inside the signal handler. This mirrors the
/// classic `--conf.run <= -1` double-signal rule: one signal starts a
/// graceful drain, a second forces immediate exit.
static RUN: AtomicI8 = AtomicI8::new(1);
static NEED_STATS_REOPEN: AtomicBool = AtomicBool::new(false);

extern "C" fn handle_termination(_sig: libc::c_int) {
    if RUN.fetch_sub(1, Ordering::SeqCst) - 1 <= -1 {
        std::process::exit(0);
    }
}

extern "C" fn handle_hup(_sig: libc::c_int) {
    NEED_STATS_REOPEN.store(true, Ordering::SeqCst);
}

fn install_signal_handlers(stats_enabled: bool) {
    unsafe {
        libc::signal(libc::SIGINT, handle_termination as libc::sighandler_t);
        libc::signal(libc::SIGTERM, handle_termination as libc::sighandler_t);
        // Handled by rdkafka/the OS socket layer, not us.
        libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        if stats_enabled {
            libc::signal(libc::SIGHUP, handle_hup as libc::sighandler_t);
        }
    }
}

/// Parsed command-line state: our own flags, plus every unrecognized
/// token forwarded verbatim for the reader's argument parser.
struct Cli {
    config_path: Option<PathBuf>,
    matcher_flag: bool,
    reader_args: Vec<String>,
}

fn parse_cli(mut argv: impl Iterator<Item = String>) -> Result<Cli> {
    let mut cli = Cli {
        config_path: None,
        matcher_flag: false,
        reader_args: Vec::new(),
    };
    while let Some(arg) = argv.next() {
        match arg.as_str() {
            "-h" => {
                print_usage();
                std::process::exit(1);
            }
            "-S" => {
                let path = argv.next().context("-S requires a configuration file path")?;
                cli.config_path = Some(PathBuf::from(path));
            }
            "-m" => {
                cli.matcher_flag = true;
                // Falls through to the reader's parser too, mirroring
                // the original `case 'm': conf.m_flag = 1; /* FALLTHRU */`.
                cli.reader_args.push(arg);
            }
            _ => cli.reader_args.push(arg),
        }
    }
    Ok(cli)
}

fn print_usage() {
    eprintln!(
        "logbridge [VSL_ARGS] [-h] [-S <config-file>]\n\n\
         Streams a web-accelerator's transaction log onto a message-bus topic.\n\
         VSL_ARGS are delegated to the reader's own argument parser.\n\
         -S <path>   configuration file (default: discovered under $XDG_CONFIG_HOME)\n\
         -m          enable the post-completion tag-bitmap matcher\n\
         -h          this message"
    );
}

fn configure_logging(log_to: core_config::LogTargets) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Writes to a rotated file via `tracing-appender::non_blocking`;
    // `log.to`'s `stderr` bit picks stderr instead when the file
    // target isn't wanted. `syslog` is accepted but not wired to an
    // actual syslog sink in this workspace (see DESIGN.md).
    let (writer, guard) = if log_to.stderr {
        tracing_appender::non_blocking(std::io::stderr())
    } else {
        let appender = tracing_appender::rolling::never(".", "logbridge.log");
        tracing_appender::non_blocking(appender)
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(writer)
        .try_init();
    Ok(guard)
}

fn build_output_adapter(
    config: &Config,
    counters: Arc<Counters>,
) -> Result<Box<dyn OutputAdapter>> {
    match config.output {
        OutputKind::Null => Ok(Box::new(NullAdapter)),
        OutputKind::Stdout => Ok(Box::new(StdoutAdapter)),
        OutputKind::Bus => {
            let bootstrap = config
                .kafka
                .get("bootstrap.servers")
                .cloned()
                .unwrap_or_default();
            let mut opts: Vec<(String, String)> = config
                .kafka
                .iter()
                .filter(|(k, _)| k.as_str() != "bootstrap.servers")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            opts.extend(config.topic_opts.iter().map(|(k, v)| (k.clone(), v.clone())));
            let producer = KafkaProducer::new(&bootstrap, opts, counters.clone())
                .context("failed to create Kafka producer handle")?;
            let rate_limiter = RateLimiter::new(
                config.log_rate_max,
                Duration::from_secs(config.log_rate_period_secs.max(1)),
            );
            Ok(Box::new(BusAdapter::new(
                producer,
                config.topic.clone(),
                config.partition,
                counters,
                rate_limiter,
            )))
        }
    }
}

fn main() -> Result<()> {
    let cli = match parse_cli(std::env::args().skip(1)) {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err:#}");
            print_usage();
            std::process::exit(1);
        }
    };

    let config_path = cli.config_path.clone().or_else(core_config::discover);
    let config = match core_config::load_from(config_path.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            std::process::exit(1);
        }
    };

    let _log_guard = configure_logging(config.log_to)?;
    info!(target: "runtime", "startup");

    let hostname = hostname::get()
        .map(|h| h.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "-".to_string());

    let program = match core_format::compile(&config.format_main, config.format_key.as_deref(), &hostname) {
        Ok(program) => program,
        Err(err) => {
            error!(target: "compile", error = %err, "template compile error");
            std::process::exit(1);
        }
    };

    let counters = Arc::new(Counters::new());
    let mut rate_limiter = RateLimiter::new(
        config.log_rate_max,
        Duration::from_secs(config.log_rate_period_secs.max(1)),
    );
    let mut stats_sink = match config.stats_file.as_deref() {
        Some(path) => Some(StatsSink::open(path).context("failed to open stats file")?),
        None => None,
    };

    install_signal_handlers(stats_sink.is_some());

    let slot_counts: Vec<usize> = program.templates.iter().map(|t| t.slots.len()).collect();
    let mut cache = TransactionCache::new(
        config.logline_hashsize,
        config.logline_hash_max,
        config.scratch_size,
        slot_counts,
    );
    let dispatcher = Dispatcher::new(config.tag_size_max, core_encode::DEFAULT_TIME_FORMAT);
    let encodings = [config.main_encoding(), config.key_encoding()];
    let encodings: Vec<Encoding> = encodings[..program.templates.len().min(2)].to_vec();

    let mut adapter = match build_output_adapter(&config, counters.clone()) {
        Ok(adapter) => adapter,
        Err(err) => {
            error!(target: "runtime", error = %err, "fatal startup error");
            std::process::exit(1);
        }
    };

    #[cfg(feature = "vsl-ffi")]
    let mut reader = VslReader::new();
    #[cfg(not(feature = "vsl-ffi"))]
    let mut reader = core_output::FakeReader::new(Vec::new());

    for arg in &cli.reader_args {
        if let Err(err) = reader.pass_arg(arg) {
            error!(target: "runtime", error = %err, arg = %arg, "reader rejected command-line argument");
            std::process::exit(1);
        }
    }

    run_driver_loop(
        &program,
        &mut cache,
        &dispatcher,
        &counters,
        &encodings,
        cli.matcher_flag,
        &mut reader,
        adapter.as_mut(),
        &mut rate_limiter,
        stats_sink.as_mut(),
        config.stats_interval_secs,
    )
}

#[allow(clippy::too_many_arguments)]
fn run_driver_loop(
    program: &Program,
    cache: &mut TransactionCache,
    dispatcher: &Dispatcher,
    counters: &Arc<Counters>,
    encodings: &[Encoding],
    matcher_flag: bool,
    reader: &mut dyn TagReader,
    adapter: &mut dyn OutputAdapter,
    rate_limiter: &mut RateLimiter,
    mut stats_sink: Option<&mut StatsSink>,
    stats_interval_secs: u64,
) -> Result<()> {
    let mut last_stats_emit = Instant::now();
    let stats_interval = Duration::from_secs(stats_interval_secs.max(1));

    RUN.store(1, Ordering::SeqCst);
    while RUN.load(Ordering::SeqCst) > 0 {
        let mut pending_complete: Vec<u32> = Vec::new();
        let more = reader.dispatch_pending(&mut |tag| {
            if let Outcome::Complete(tx_id) = dispatcher.on_tag(program, cache, counters, tag) {
                pending_complete.push(tx_id);
            }
        })?;

        let reader_shared: &dyn TagReader = &*reader;
        for tx_id in pending_complete {
            let matcher: Option<&dyn Fn(u64) -> bool> = if matcher_flag {
                Some(&|seen| reader_shared.matches(seen))
            } else {
                None
            };
            if let Err(err) = render_complete(program, cache, tx_id, counters, encodings, matcher, adapter) {
                note_delivery_failure(rate_limiter, &err);
            }
        }

        adapter.poll();
        maybe_reopen_stats(&mut stats_sink);
        maybe_emit_stats(&mut stats_sink, counters, cache, &mut last_stats_emit, stats_interval);

        if !more {
            break;
        }
    }

    // Drain phase: reset to the "running" state so a single further
    // signal stops the drain gracefully, while a second one hits
    // `RUN <= -1` inside the handler and force-exits.
    RUN.store(1, Ordering::SeqCst);
    let drain_poll_interval = Duration::from_millis(100);
    while RUN.load(Ordering::SeqCst) > 0 {
        if adapter.drain(drain_poll_interval) == 0 {
            break;
        }
    }

    info!(target: "runtime", "shutdown complete");
    Ok(())
}

fn note_delivery_failure(rate_limiter: &mut RateLimiter, err: &anyhow::Error) {
    let (decision, summary) = rate_limiter.record(Channel::DeliveryErrors, Instant::now());
    if let Some(summary) = summary {
        warn!(target: "diag", total = summary.total, suppressed = summary.suppressed, "delivery-error rate limit period closed");
    }
    if decision == core_diag::Decision::Log {
        warn!(target: "diag", error = %err, "render/emit failed");
    }
}

fn maybe_reopen_stats(stats_sink: &mut Option<&mut StatsSink>) {
    if !NEED_STATS_REOPEN.swap(false, Ordering::SeqCst) {
        return;
    }
    if let Some(sink) = stats_sink.as_mut() {
        if let Err(err) = sink.reopen() {
            error!(target: "stats", error = %err, "failed to reopen stats file on HUP");
        }
    }
}

fn maybe_emit_stats(
    stats_sink: &mut Option<&mut StatsSink>,
    counters: &Counters,
    cache: &TransactionCache,
    last_emit: &mut Instant,
    interval: Duration,
) {
    let Some(sink) = stats_sink.as_mut() else {
        return;
    };
    if last_emit.elapsed() < interval {
        return;
    }
    Counters::set(&counters.current_transaction_count, cache.current_transaction_count() as u64);
    if let Err(err) = sink.emit(&counters.snapshot()) {
        error!(target: "stats", error = %err, "failed to write stats line");
    }
    *last_emit = Instant::now();
}
