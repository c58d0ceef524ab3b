//! Stderr logging for the photogauge crates.
//!
//! Lines look like `[  1.234s  INFO photogauge_ruler] message`. The level
//! passed to [`init_with_level`] applies to the `photogauge*` crates; every
//! other crate (image decoders and the like) is capped at `warn`. The
//! optional `tracing` feature adds an `EnvFilter`-driven subscriber instead.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

const OWN_PREFIX: &str = "photogauge";
const DEPENDENCY_LEVEL: LevelFilter = LevelFilter::Warn;

/// Crate name of a log target, `photogauge_ruler::ticks` -> `photogauge_ruler`.
fn crate_of(target: &str) -> &str {
    target.split("::").next().unwrap_or(target)
}

struct StderrLogger {
    level: LevelFilter,
    started: Instant,
}

impl StderrLogger {
    fn level_for(&self, target: &str) -> LevelFilter {
        if crate_of(target).starts_with(OWN_PREFIX) {
            self.level
        } else {
            self.level.min(DEPENDENCY_LEVEL)
        }
    }
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let line = format!(
            "[{:7.3}s {:>5} {}] {}\n",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            crate_of(record.target()),
            record.args()
        );
        // Single write per record.
        let _ = std::io::stderr().lock().write_all(line.as_bytes());
    }

    fn flush(&self) {
        let _ = std::io::stderr().lock().flush();
    }
}

static LOGGER: OnceLock<StderrLogger> = OnceLock::new();

/// Install the stderr logger; `level` applies to the photogauge crates.
///
/// Only the first call installs anything. Later calls return `Ok(())` and
/// keep the original level.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| StderrLogger {
        level,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(level);
    Ok(())
}

/// Crates whose spans and events `verbose` raises to `debug`.
#[cfg(feature = "tracing")]
const CRATES: [&str; 4] = [
    "photogauge",
    "photogauge_core",
    "photogauge_ruler",
    "photogauge_objects",
];

/// Install a `tracing` subscriber; `RUST_LOG` overrides the default filter.
///
/// The default is `info`, with the measurement crates at `debug` when
/// `verbose` is set. Spans report their duration on close.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool, verbose: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose));
    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

#[cfg(feature = "tracing")]
fn default_filter(verbose: bool) -> EnvFilter {
    if !verbose {
        return EnvFilter::new("info");
    }
    let directives: Vec<String> = CRATES.iter().map(|c| format!("{c}=debug")).collect();
    EnvFilter::new(format!("info,{}", directives.join(",")))
}
