use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::state::AppState;
use crate::tokens::bind::BindKind;

/// How often expired in-memory CSRF tokens are dropped.
const CSRF_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Runs `tick` every `every` until `token` is cancelled. The first run is one
/// full interval after start.
pub fn spawn_periodic<F>(
    name: &'static str,
    every: Duration,
    token: CancellationToken,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    tracing::debug!("🛑 {} stopped", name);
                    break;
                }
                _ = interval.tick() => tick(),
            }
        }
    })
}

/// The process's background maintenance: secret rotation and store sweeps.
pub struct BackgroundTasks {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    pub fn start(state: &AppState) -> Self {
        let token = CancellationToken::new();
        let config = &state.config;
        let mut handles = Vec::new();

        let secrets = state.secrets.clone();
        handles.push(spawn_periodic(
            "secret rotation",
            config.secret_rotation_interval,
            token.clone(),
            move || secrets.rotate(),
        ));

        for kind in [BindKind::Csrf, BindKind::Rsp] {
            let bind = state.bind.clone();
            handles.push(spawn_periodic(
                "revocation sweep",
                config.revocation_sweep_interval,
                token.clone(),
                move || {
                    let removed = bind.registry(kind).sweep(Instant::now());
                    if removed > 0 {
                        tracing::debug!("🧹 Swept {} revoked {} tokens", removed, kind.cookie_name());
                    }
                },
            ));
        }

        let limiter = state.rate_limiter.clone();
        handles.push(spawn_periodic(
            "fingerprint cleanup",
            config.rate_limit_cleanup_interval,
            token.clone(),
            move || {
                let removed = limiter.limiter().cleanup(Instant::now());
                tracing::info!("🧹 Removed {} expired fingerprint windows", removed);
            },
        ));

        if let Some(store) = state.memory_csrf.clone() {
            handles.push(spawn_periodic(
                "csrf sweep",
                CSRF_SWEEP_INTERVAL,
                token.clone(),
                move || {
                    let removed = store.sweep(Instant::now());
                    if removed > 0 {
                        tracing::debug!("🧹 Removed {} expired CSRF tokens", removed);
                    }
                },
            ));
        }

        tracing::info!("✅ {} background tasks started", handles.len());
        Self { token, handles }
    }

    /// Cancels every task and waits for it to finish.
    pub async fn shutdown(self) {
        self.token.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("❌ Background task ended abnormally: {}", e);
            }
        }
        tracing::info!("✅ Background tasks stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn periodic_task_ticks_until_cancelled() {
        let count = Arc::new(AtomicUsize::new(0));
        let token = CancellationToken::new();
        let counter = count.clone();
        let handle = spawn_periodic("test", Duration::from_millis(20), token.clone(), move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(110)).await;
        token.cancel();
        handle.await.unwrap();

        let ticks = count.load(Ordering::SeqCst);
        assert!(ticks >= 2, "only {} ticks", ticks);

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), ticks);
    }
}
