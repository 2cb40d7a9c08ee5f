//! framepipe demo - Main Entry Point
//!
//! Builds a synthetic topology out of the built-in elements, runs it to
//! EOF and prints the statistics.
//!
//! ```text
//! framepipe [config.toml|config.json]
//! ```

use anyhow::Context;
use framepipe::{
    config::{DemoConfig, LoggingConfig},
    pipeline::{PipelineBuilder, PipelineState},
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

fn main() -> anyhow::Result<()> {
    let config_path = std::env::args().nth(1);
    let demo = match &config_path {
        Some(path) => DemoConfig::load(path)
            .with_context(|| format!("Failed to load demo config from {}", path))?,
        None => DemoConfig::default(),
    };

    // Keep the guard alive so the file writer flushes on exit
    let _log_guard = init_logging(&demo.pipeline.logging);

    tracing::info!(
        config = config_path.as_deref().unwrap_or("<defaults>"),
        frames = demo.topology.frames,
        branches = demo.topology.branches.len(),
        "Starting framepipe demo"
    );

    let (pipeline, handles) = PipelineBuilder::new(demo.pipeline.clone())
        .build_from(&demo.topology)
        .context("Failed to build pipeline")?;
    let events = pipeline.events();

    pipeline.start().context("Failed to start pipeline")?;

    if !pipeline.wait_for_state(PipelineState::Eof, demo.run_timeout()) {
        tracing::warn!(
            state = ?pipeline.state(),
            "Pipeline did not reach EOF within {:?}, stopping",
            demo.run_timeout()
        );
    }

    for event in events.try_iter() {
        tracing::debug!(?event, "Pipeline event");
    }

    print!("{}", pipeline.stats());
    pipeline.stop();

    for (branch, sink) in handles.sinks.iter().enumerate() {
        tracing::info!(
            branch,
            received = sink.received_count(),
            eof = sink.eof_count(),
            "Branch finished"
        );
    }
    tracing::info!(
        emitted = handles.source.emitted(),
        processed = pipeline.processed_frames(),
        fps = pipeline.fps(),
        "Demo finished"
    );
    Ok(())
}

/// Install the tracing subscriber. `RUST_LOG` takes precedence over the
/// configured filter. Returns the guard of the file writer, if any.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    let (file_layer, guard) = match &logging.directory {
        Some(directory) => {
            let appender = tracing_appender::rolling::daily(directory, "framepipe.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}
