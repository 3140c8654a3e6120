use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub max_connections: u32,
    pub reconcile_interval: Duration,
}

impl Settings {
    pub fn new() -> Self {
        let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

        let max_connections: u32 = env::var("MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let reconcile_interval = env::var("RECONCILE_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(300));

        Self {
            database_url,
            max_connections,
            reconcile_interval,
        }
    }
}
