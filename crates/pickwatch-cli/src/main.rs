use anyhow::Result;
use tracing_subscriber::fmt::SubscriberBuilder;
use tracing_subscriber::EnvFilter;

/// Fmt subscriber with a `RUST_LOG` override and a quiet default.
fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    SubscriberBuilder::default()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow::anyhow!("failed to initialize tracing: {err}"))
}

// The binary takes no arguments: the scheduler invokes it, it runs one sync
// pass and exits. A non-zero exit means config, connection, or commit failed.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_tracing("info")?;

    let summary = pickwatch_sync::run_sync_once_from_env().await?;
    println!(
        "sync complete: run_id={} champions={} fetched={} upserted={} rejected={} write_failures={} query_failures={}",
        summary.run_id,
        summary.champions,
        summary.fetched,
        summary.upserted,
        summary.rejected,
        summary.write_failures,
        summary.query_failures
    );

    Ok(())
}
