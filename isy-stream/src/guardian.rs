//! Heartbeat guardian
//!
//! Runs beside the read loop of one start generation. Every heartbeat interval
//! it checks that the read loop is still alive and that a heartbeat arrived
//! within the interval. When either check fails it reports a lost connection
//! with a retry attempt of zero and exits; the next start spawns a new one.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tracing::debug;

use crate::controller::StreamShared;
use crate::types::ConnectionState;

/// Body of the guardian task
pub(crate) async fn watch(shared: Arc<StreamShared>, epoch: u64) {
    while shared.status() != ConnectionState::StopUpdates {
        sleep(shared.heartbeat_interval()).await;

        if !shared.is_current(epoch) {
            return;
        }

        let interval = shared.heartbeat_interval();
        let liveness_age = shared.session_for(epoch).map(|session| session.liveness_age());
        if is_stale(shared.read_loop_finished(epoch), liveness_age, interval) {
            debug!(
                epoch,
                interval_secs = interval.as_secs(),
                "Missed heartbeat, forcing reconnect"
            );
            shared.connection_lost(epoch, 0);
            return;
        }
    }
}

/// True when the read loop has ended or the last sign of life is older than
/// `interval`. A session that is still connecting has no age and is left to
/// the connect timeout.
pub(crate) fn is_stale(read_loop_finished: bool, liveness_age: Option<Duration>, interval: Duration) -> bool {
    read_loop_finished || liveness_age.map_or(false, |age| age > interval)
}
