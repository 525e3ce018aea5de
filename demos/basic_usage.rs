//! Basic usage of the TSV-RPC client
//!
//! Needs a server on TYCOON_URL (default kt://localhost:1978).
//! Run with: cargo run --example basic_usage

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use tycoon_client::{Client, ClientConfig, Error, IncrementOrigin, Serializer, TextSerializer};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env()?;
    let client = Client::with_config(config);
    info!("Using {}", client);

    client.void().await?;

    // Text values through a serializer
    let text = TextSerializer;
    client
        .set("example:hello", text.serialize(&"Hello, Tycoon!".to_string())?, None)
        .await?;
    let (data, expires) = client.get("example:hello").await?;
    info!("Retrieved: {} (expires: {:?})", text.deserialize(&data)?, expires);

    match client.add("example:hello", "again", None).await {
        Err(Error::LogicalInconsistency(msg)) => info!("add refused: {}", msg),
        Err(e) => return Err(e.into()),
        Ok(()) => warn!("add unexpectedly succeeded"),
    }

    // Counters
    client.remove_bulk(["example:visits"], false).await?;
    let visits = client.increment("example:visits", 1, None, None).await?;
    info!("Visits: {}", visits);
    let visits = client
        .increment("example:visits", 2, Some(IncrementOrigin::Try), None)
        .await?;
    info!("Visits: {}", visits);

    // Bulk calls
    let stored = client
        .set_bulk([("example:a", "1"), ("example:b", "2")], Some(300), true)
        .await?;
    info!("Stored {} records", stored);
    for key in client.match_prefix("example:", Some(10)).await? {
        info!("Key: {}", String::from_utf8_lossy(&key));
    }

    let status = client.status().await?;
    info!(
        "Records: {}",
        String::from_utf8_lossy(status.find(b"count").unwrap_or(b"?".as_slice()))
    );

    info!("{}", client.pool_metrics().to_prometheus());
    client.dispose();
    Ok(())
}
