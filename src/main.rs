use competing_consumer::subscription::{handler_fn, Consumer, ConsumerConfig, Error, Event};
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Read an optional numeric setting from the environment
fn env_number<T: std::str::FromStr>(key: &str) -> Result<Option<T>, Error> {
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::Configuration(format!("{} must be a number, got '{}'", key, raw))),
        Err(_) => Ok(None),
    }
}

fn config_from_env() -> Result<ConsumerConfig, Error> {
    let stream = std::env::var("EVENTSTORE_STREAM").unwrap_or_default();
    let group = std::env::var("EVENTSTORE_GROUP").unwrap_or_default();

    let mut config = ConsumerConfig::new(stream, group);
    if let Some(concurrency) = env_number::<usize>("CONSUMER_CONCURRENCY")? {
        config = config.with_concurrency(concurrency);
    }
    if let Some(delay_ms) = env_number::<u64>("CONSUMER_POLL_DELAY_MS")? {
        config = config.with_poll_delay(Duration::from_millis(delay_ms));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = config_from_env()?;
    let mut consumer = Consumer::new(
        config,
        handler_fn(|event: Event| async move {
            info!(
                event_id = %event.event_id,
                event_type = event.event_type.as_deref().unwrap_or("-"),
                stream = event.stream_id.as_deref().unwrap_or("-"),
                data = %event.data,
                "Received event"
            );
            Ok(())
        }),
    )?;

    consumer
        .on_nack(|event| warn!(event_id = %event.event_id, "Event nacked"))
        .on_error(|err| error!(error = %err, "Consumer error"));

    consumer.start()?;
    info!(
        stream = %consumer.config().stream,
        group = %consumer.config().group,
        "Consuming; press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested, draining in-flight events");
    consumer.stop().await;

    Ok(())
}
