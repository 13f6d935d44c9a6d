use anyhow::Context;
use mimalloc::MiMalloc;
use std::collections::BTreeMap;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use seat_lock_core::{
    config::Config,
    models::{PerformanceId, SessionId},
    services::ViewTracker,
    CoordinatorContext,
};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("invalid configuration")?;

    let registry = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log));
    if config.app.log_format == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    // seat-watch <performance_id> [map.json]
    let mut args = std::env::args().skip(1);
    let performance_id = args
        .next()
        .or_else(|| std::env::var("PERFORMANCE_ID").ok())
        .context("performance id must be given as the first argument or PERFORMANCE_ID")?;
    let performance_id: i64 = performance_id.trim().parse().context("performance id must be a number")?;
    let performance_id = PerformanceId::new(performance_id)?;
    let map_path = args.next().or_else(|| std::env::var("MAP_FILE").ok());

    info!("Starting seat-watch for performance {} ({})", performance_id, config.app.environment);

    let ctx = CoordinatorContext::connect(config).await?;
    let session = ctx.open_session(performance_id, SessionId::new());

    if let Some(path) = map_path {
        let raw = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read map {}", path))?;
        let document: serde_json::Value = serde_json::from_str(&raw).context("map is not valid JSON")?;
        let count = session.load_map(&document);
        info!("Loaded {} seats from {}", count, path);
    }

    let mut changes = session.store().changes();
    let mut tracker = ViewTracker::new();

    loop {
        if session.needs_render(&mut tracker) {
            let view = session.view();
            let summary = session.with_merged(|merged| {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for seat in merged {
                    *counts.entry(format!("{:?}", seat.status).to_lowercase()).or_default() += 1;
                }
                counts
            });
            info!(
                version = view.version,
                feed = ?view.feed_state,
                locks = view.overrides.len(),
                "Seat view changed: {:?}",
                summary
            );
        }

        tokio::select! {
            changed = changes.changed() => {
                if changed.is_err() {
                    warn!("Lock store went away");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    session.close();
    Ok(())
}
