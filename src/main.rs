use evserve::config::Config;
use evserve::server::listener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;

    let mut reactor = listener::build(&cfg)?;
    let stop = reactor.stop_handle();

    // The reactor is a blocking loop; it gets a thread of its own.
    let mut serving = tokio::task::spawn_blocking(move || reactor.run());

    tokio::select! {
        res = &mut serving => {
            res??;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
            stop.stop()?;
            serving.await??;
        }
    }

    Ok(())
}
