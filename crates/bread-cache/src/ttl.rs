//! Periodic TTL sweeps.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::trace;

use crate::dispatcher::Message;

/// Spawn a task that asks the dispatcher to expire idle lines every
/// `period`.
///
/// The task only holds a weak sender, so it never keeps the dispatcher
/// alive; it stops as soon as the dispatcher is gone.
pub(crate) fn spawn_sweeper<E: Send + Sync + 'static>(
    inbox: mpsc::WeakSender<Message<E>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(inbox) = inbox.upgrade() else {
                break;
            };
            if inbox.send(Message::Sweep).await.is_err() {
                break;
            }
        }

        trace!("TTL sweeper stopped");
    })
}
