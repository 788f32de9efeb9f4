use pac2200_to_influx::{Config, InfluxWriter, Poller};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    info!("starting pac2200-to-influx");

    let cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("invalid configuration: {e}");
            std::process::exit(1);
        }
    };
    info!(
        influx_url = %cfg.influx.url,
        bucket = %cfg.influx.bucket,
        org = %cfg.influx.org,
        device = %cfg.device_base_url,
        poll_interval_secs = cfg.poll_interval_secs,
        "configuration loaded"
    );

    let writer = match InfluxWriter::new(&cfg.influx) {
        Ok(writer) => writer,
        Err(e) => {
            error!("failed to build influx client: {e}");
            std::process::exit(1);
        }
    };
    let mut poller = match Poller::new(cfg.sources(), writer, cfg.poll_interval_secs) {
        Ok(poller) => poller,
        Err(e) => {
            error!("failed to build device client: {e}");
            std::process::exit(1);
        }
    };

    let sig = tokio::signal::ctrl_c();
    tokio::pin!(sig);
    tokio::select! {
        biased;
        _ = &mut sig => {
            info!("shutdown requested");
        }
        _ = poller.run() => {}
    }
}
