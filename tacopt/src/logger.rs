//! Minimal stderr logger configured through `TACOPT_LOG`.
//!
//! Accepts either a bare level (`TACOPT_LOG=debug`) or a comma-separated
//! list of `target=level` pairs with an optional bare default, e.g.
//! `TACOPT_LOG=warn,dataflow=trace,loops=debug`. Targets are the scopes the
//! library crates log under (`ir`, `dataflow`, `dominance`, `loops`,
//! `induction`, `folding`, `cse`, `copy-prop`, `dce`, `licm`,
//! `strength-reduction`, `fuse`, `optimize`).

use std::io::Write;

use log::{LevelFilter, Log, Metadata, Record};

struct Logger {
    default: LevelFilter,
    targets: Vec<(String, LevelFilter)>,
}

impl Logger {
    fn filter_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .find(|(name, _)| name == target)
            .map(|(_, filter)| *filter)
            .unwrap_or(self.default)
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.filter_for(metadata.target())
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(
            stderr,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

fn parse_level(text: &str) -> Option<LevelFilter> {
    match text.trim().to_ascii_lowercase().as_str() {
        "off" => Some(LevelFilter::Off),
        "error" => Some(LevelFilter::Error),
        "warn" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

/// Install the logger. Unparseable directives are ignored rather than
/// fatal; a bad `TACOPT_LOG` should never break a compile.
pub fn init() {
    let mut default = LevelFilter::Error;
    let mut targets = Vec::new();
    if let Ok(spec) = std::env::var("TACOPT_LOG") {
        for directive in spec.split(',').filter(|d| !d.trim().is_empty()) {
            match directive.split_once('=') {
                Some((target, level)) => {
                    if let Some(filter) = parse_level(level) {
                        targets.push((target.trim().to_string(), filter));
                    }
                }
                None => {
                    if let Some(filter) = parse_level(directive) {
                        default = filter;
                    }
                }
            }
        }
    }

    let max = targets
        .iter()
        .map(|(_, filter)| *filter)
        .chain(std::iter::once(default))
        .max()
        .unwrap_or(LevelFilter::Error);
    let logger = Logger { default, targets };
    if log::set_boxed_logger(Box::new(logger)).is_ok() {
        log::set_max_level(max);
    }
}
