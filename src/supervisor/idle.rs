//! Idle connection reaper.
//!
//! Periodically releases the datastore handle once no gated request has
//! used it for `idle_timeout`. It only ever closes; reconnecting is left to
//! the next request.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time;

use crate::datastore::Connector;
use crate::supervisor::ConnectionSupervisor;

pub struct IdleReaper<C: Connector> {
    supervisor: ConnectionSupervisor<C>,
    idle_timeout: Duration,
    interval: Duration,
}

impl<C: Connector> IdleReaper<C> {
    pub fn new(supervisor: ConnectionSupervisor<C>, idle_timeout: Duration) -> Self {
        let interval = (idle_timeout / 4).clamp(Duration::from_secs(1), Duration::from_secs(60));
        Self {
            supervisor,
            idle_timeout,
            interval,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            idle_timeout_secs = self.idle_timeout.as_secs(),
            interval_secs = self.interval.as_secs(),
            "Idle reaper starting"
        );

        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.supervisor.release_idle(self.idle_timeout).await;
                }
                _ = shutdown.recv() => {
                    tracing::info!("Idle reaper received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}
