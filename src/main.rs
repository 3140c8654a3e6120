use std::sync::Arc;

use dotenv::dotenv;
use sqlx::postgres::PgPoolOptions;
use tracing::{info, warn};

use vidverse_relations::config::settings::Settings;
use vidverse_relations::relations::reconcile::Reconciler;
use vidverse_relations::store::postgres::PgCounterStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt::init();

    let settings = Settings::new();

    let pool = PgPoolOptions::new()
        .max_connections(settings.max_connections)
        .connect(&settings.database_url)
        .await?;

    info!("database connected");

    sqlx::migrate!().run(&pool).await?;

    let counters = Arc::new(PgCounterStore::new(pool));
    let reconciler = Reconciler::new(counters.clone());

    info!(
        "reconciliation worker running every {:?}",
        settings.reconcile_interval
    );

    let mut ticker = tokio::time::interval(settings.reconcile_interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match counters.counter_user_ids().await {
                    Ok(user_ids) => {
                        let summary = reconciler.sweep(&user_ids).await;
                        info!(
                            scanned = summary.scanned,
                            repaired = summary.repaired,
                            "reconcile sweep complete"
                        );
                    }
                    Err(error) => warn!(%error, "could not list counter rows"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("worker shutdown");
                break;
            }
        }
    }

    Ok(())
}
