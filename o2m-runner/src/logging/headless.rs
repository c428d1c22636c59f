use super::{Frontend, Options};
use anyhow::Result;
use tracing_subscriber::{
    filter::{LevelFilter, Targets},
    fmt::{format::FmtSpan, Layer as FmtLayer},
    layer::SubscriberExt as _,
    Layer as _, Registry,
};

/// Crates whose events make up the runner's own log.
const OWN_TARGETS: [&str; 3] = ["o2m_core", "o2m_relation", "o2m_runner"];

/// Logs to stderr, leaving stdout to the command's JSON output.
pub(crate) struct HeadlessLogger {}

/// Our crates log at INFO, or everything when verbose. The HTTP stack only
/// gets a say when verbose, and then at DEBUG, as its TRACE output is mostly
/// connection pool chatter.
fn targets(verbose: bool) -> Targets {
    let (own, default) = if verbose {
        (LevelFilter::TRACE, LevelFilter::DEBUG)
    } else {
        (LevelFilter::INFO, LevelFilter::WARN)
    };
    OWN_TARGETS
        .iter()
        .fold(Targets::new().with_default(default), |targets, target| {
            targets.with_target(*target, own)
        })
}

/// Fetches are spans: announce each one and report how long it took. With
/// `verbose`, also show every time a span is entered and left, which tells
/// interleaved concurrent fetches apart.
fn span_events(verbose: bool) -> FmtSpan {
    if verbose {
        FmtSpan::FULL
    } else {
        FmtSpan::NEW | FmtSpan::CLOSE
    }
}

impl Frontend for HeadlessLogger {
    fn set_up(&mut self, options: &Options) -> Result<()> {
        let fmt_layer = FmtLayer::new()
            .with_writer(std::io::stderr)
            .with_target(options.verbose)
            .with_span_events(span_events(options.verbose))
            .with_ansi(options.color)
            .with_filter(targets(options.verbose));

        tracing::subscriber::set_global_default(Registry::default().with(fmt_layer))
            .map_err(|e| anyhow::anyhow!("failed to set up tracing: {}", e))?;

        tracing::debug!(verbose = options.verbose, "logging to stderr");
        Ok(())
    }

    fn tear_down(&mut self) -> Result<()> {
        Ok(())
    }
}
