//! Background sweep of idle rooms and stale sessions.

use std::sync::Arc;
use std::time::Duration;

use keyrace_protocol::Codec;
use keyrace_session::ProfileProvider;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use crate::server::ServerState;

/// Starts the periodic sweep. Abort the returned handle to stop it.
pub(crate) fn spawn_sweeper<P, C>(state: Arc<ServerState<P, C>>) -> JoinHandle<()>
where
    P: ProfileProvider,
    C: Codec,
{
    tokio::spawn(async move {
        let period = state.config.sweep_interval.max(Duration::from_millis(1));
        tracing::info!(
            sweep_interval_s = period.as_secs(),
            room_ttl_s = state.config.room_ttl.as_secs(),
            "starting room sweeper"
        );

        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            sweep_once(&state).await;
        }
    })
}

/// Closes expired rooms and forgets sessions whose grace ran out.
pub(crate) async fn sweep_once<P, C>(state: &ServerState<P, C>)
where
    P: ProfileProvider,
    C: Codec,
{
    let closed = state.registry.sweep_expired().await;

    // Rooms drop held players on their own; this forgets the sessions.
    let (expired, removed) = {
        let mut sessions = state.sessions.lock().await;
        let expired = sessions.expire_stale().len();
        (expired, sessions.cleanup_expired())
    };

    if !closed.is_empty() || removed > 0 {
        tracing::info!(
            rooms_closed = closed.len(),
            sessions_expired = expired,
            sessions_removed = removed,
            "sweep completed"
        );
    } else {
        tracing::trace!("sweep found nothing to do");
    }
}
