use anyhow::{Context, Error, anyhow};
use bidcore::app::config::EngineConfig;
use bidcore::app::context::EngineContext;
use bidcore::core::models::{AdSize, AdUnitType, CacheKey};
use bidcore::core::network::TokioExecutor;
use bidcore::core::observability;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Parses `placement:WIDTHxHEIGHT[:type]`
fn parse_key(arg: &str) -> Result<CacheKey, Error> {
    let mut parts = arg.split(':');
    let placement = parts.next().unwrap_or_default();
    let size = parts
        .next()
        .ok_or_else(|| anyhow!("Missing size in '{}'", arg))?;
    let (width, height) = size
        .split_once('x')
        .ok_or_else(|| anyhow!("Size must be WIDTHxHEIGHT in '{}'", arg))?;
    let ad_unit_type = match parts.next() {
        Some(kind) => kind.parse::<AdUnitType>()?,
        None => AdUnitType::Banner,
    };

    CacheKey::new(
        placement,
        AdSize::new(width.parse()?, height.parse()?),
        ad_unit_type,
    )
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let mut args = std::env::args().skip(1);
    let config_path = PathBuf::from(args.next().unwrap_or_else(|| "bidcore.yaml".into()));

    let config = if config_path.exists() {
        EngineConfig::load(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?
    } else {
        EngineConfig::default()
    };

    observability::init(&config.logging)?;

    let keys = args.map(|arg| parse_key(&arg)).collect::<Result<Vec<_>, _>>()?;

    let executor = Arc::new(TokioExecutor::current(config.executor.max_concurrent_tasks)?);
    let ctx = EngineContext::build(&config, executor)?;

    ctx.refresh_config();
    if !ctx.prefetch(keys.clone()) {
        warn!("No bid call sent");
    }

    tokio::time::sleep(config.network.request_timeout + Duration::from_millis(200)).await;

    for key in &keys {
        match ctx.publish_token(key) {
            Some(token) => info!("Bid cached for {}, token {}", key, token),
            None => info!("No bid for {}", key),
        }
    }

    ctx.shutdown();
    info!("Shutdown successful");

    Ok(())
}
