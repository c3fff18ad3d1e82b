// Poll scheduler - delayed first fetch plus a fixed-period recurring fetch
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub const INITIAL_DELAY: Duration = Duration::from_secs(2);
pub const POLL_PERIOD: Duration = Duration::from_secs(120);

/// One fetch cycle; errors are handled and logged by the implementation.
#[async_trait]
pub trait FetchCycle: Send + Sync {
    async fn fetch(&self, routing_key: &str);
}

#[derive(Debug, Clone, Copy)]
pub struct ScheduleSettings {
    pub initial_delay: Duration,
    pub period: Duration,
}

impl Default for ScheduleSettings {
    fn default() -> Self {
        Self {
            initial_delay: INITIAL_DELAY,
            period: POLL_PERIOD,
        }
    }
}

/// Running triggers; dropping the handle does not stop them, `stop` does.
pub struct SchedulerHandle {
    initial: JoinHandle<()>,
    periodic: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Cancel both triggers. Safe to call more than once.
    pub fn stop(&self) {
        self.initial.abort();
        self.periodic.abort();
    }

    pub fn is_polling(&self) -> bool {
        !self.periodic.is_finished()
    }
}

pub fn start(
    fetcher: Arc<dyn FetchCycle>,
    routing_key: watch::Receiver<String>,
    settings: ScheduleSettings,
) -> SchedulerHandle {
    let in_flight = Arc::new(Mutex::new(()));

    let initial = {
        let fetcher = fetcher.clone();
        let routing_key = routing_key.clone();
        let in_flight = in_flight.clone();
        tokio::spawn(async move {
            tokio::time::sleep(settings.initial_delay).await;
            let key = current_key(&routing_key);
            if key.is_empty() {
                tracing::error!("routing key not set - please check the configuration");
            } else {
                run_guarded(fetcher.as_ref(), &key, &in_flight).await;
            }
        })
    };

    let periodic = tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + settings.period, settings.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            let key = current_key(&routing_key);
            if key.is_empty() {
                tracing::info!("routing key not set, periodic polling stopped");
                break;
            }
            run_guarded(fetcher.as_ref(), &key, &in_flight).await;
        }
    });

    tracing::info!(
        "polling every {:?}, first fetch in {:?}",
        settings.period,
        settings.initial_delay
    );
    SchedulerHandle { initial, periodic }
}

fn current_key(routing_key: &watch::Receiver<String>) -> String {
    routing_key.borrow().trim().to_string()
}

/// Skip the trigger if another cycle still holds the guard.
async fn run_guarded(fetcher: &dyn FetchCycle, key: &str, in_flight: &Mutex<()>) {
    let Ok(_guard) = in_flight.try_lock() else {
        tracing::warn!("previous fetch cycle still running, skipping this trigger");
        return;
    };
    fetcher.fetch(key).await;
}
