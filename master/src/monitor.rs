// master/src/monitor.rs

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry::Registry;

/// Monitor de liveness: cada `every` marca como no sanos los workers sin
/// heartbeat hace más de `ttl`. Corre hasta que se cancele el token.
pub async fn monitor_workers(
    registry: Arc<Registry>,
    every: Duration,
    ttl: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("monitor de workers detenido");
                break;
            }
            _ = ticker.tick() => {
                let demoted = registry.sweep_stale(Instant::now(), ttl);
                if !demoted.is_empty() {
                    info!("{} worker(s) sin heartbeat: {:?}", demoted.len(), demoted);
                }
            }
        }
    }
}
