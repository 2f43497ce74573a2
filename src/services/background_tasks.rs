// Background maintenance tasks: periodic eviction of the in-process
// rate-limit/failed-login fallback maps (§4.4) and best-effort cleanup of
// expired refresh sessions.

use std::time::Duration;
use tracing::{error, info};

use crate::app::AppState;

pub struct BackgroundTaskManager {
    state: AppState,
}

impl BackgroundTaskManager {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    pub async fn start_all_tasks(&self) {
        info!("starting background maintenance tasks");
        self.spawn_local_window_eviction();
        self.spawn_expired_session_cleanup();
    }

    /// Sweeps the rate limiter's in-process fallback map every 5 minutes,
    /// per §4.4's backing-store contract.
    fn spawn_local_window_eviction(&self) {
        let rate_limiter = self.state.rate_limit_service.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                rate_limiter.evict_stale_local_entries(Duration::from_secs(900));
            }
        });
    }

    /// Deletes refresh sessions past their expiry on an hourly cadence, to
    /// keep the table from growing unbounded.
    fn spawn_expired_session_cleanup(&self) {
        let pool = self.state.diesel_pool.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(3600));
            loop {
                interval.tick().await;
                match pool.get().await {
                    Ok(mut conn) => {
                        use diesel::prelude::*;
                        use diesel_async::RunQueryDsl;

                        let deleted = diesel::delete(
                            crate::schema::refresh_sessions::table
                                .filter(crate::schema::refresh_sessions::expires_at.lt(chrono::Utc::now())),
                        )
                        .execute(&mut conn)
                        .await;

                        match deleted {
                            Ok(count) if count > 0 => info!("cleaned up {} expired refresh sessions", count),
                            Ok(_) => {},
                            Err(e) => error!("expired session cleanup failed: {}", e),
                        }
                    },
                    Err(e) => error!("could not acquire db connection for session cleanup: {}", e),
                }
            }
        });
    }
}

pub async fn initialize_background_tasks(state: AppState) {
    let manager = BackgroundTaskManager::new(state);
    manager.start_all_tasks().await;
}
