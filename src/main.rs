use stock_watch::{BrowserSource, Config, JsonFileStore, Monitor, NtfyNotifier};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Always exit cleanly: failures are reported through the log only.
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {:#}", e);
            return;
        }
    };

    if config.targets.is_empty() {
        tracing::info!("🛒 Monitoring for products: all protein products");
    } else {
        let names: Vec<&str> = config.targets.iter().collect();
        tracing::info!("🛒 Monitoring for products: {}", names.join(", "));
    }

    let store = JsonFileStore::new(&config.state_file);
    let mut monitor = Monitor::new(config.pincode.as_str(), config.targets.clone(), Box::new(store));
    match &config.ntfy_topic {
        Some(topic) => match NtfyNotifier::new(&config.ntfy_server, topic) {
            Ok(notifier) => monitor = monitor.with_notifier(Box::new(notifier)),
            Err(e) => {
                tracing::error!(error = %e, "Could not create ntfy client. Push notifications will be disabled.");
            }
        },
        None => {
            tracing::warn!("NTFY_TOPIC environment variable not set. Push notifications will be disabled.");
        }
    }

    let mut source = BrowserSource::new(config.browser());
    let report = monitor.run(&mut source).await;

    tracing::info!(
        outcome = %report.outcome,
        observed = report.observed,
        alerts = report.alerts,
        delivered = report.delivered,
        persisted = report.persisted,
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "Stock check finished"
    );
}
