//! Connection supervisor: the read loop of one start generation
//!
//! Opens the socket, installs a fresh [`StreamSession`], then reads frames
//! until the stream fails or a shutdown is requested. Every failure is logged
//! at its severity and reported as a lost connection carrying the current
//! retry attempt, so consecutive failures walk the backoff schedule while one
//! successful connect resets it.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::controller::StreamShared;
use crate::error::{Severity, TransportError};
use crate::session::StreamSession;
use crate::transport::Frame;

/// Body of the read-loop task
pub(crate) async fn run(shared: Arc<StreamShared>, epoch: u64, mut shutdown: watch::Receiver<bool>) {
    let failure = match read_loop(&shared, epoch, &mut shutdown).await {
        Ok(()) => {
            debug!(epoch, "Read loop stopped on request");
            return;
        }
        Err(failure) => failure,
    };

    log_failure(epoch, &failure);
    shared.connection_lost(epoch, shared.retry_attempt());
}

/// Returns `Ok` only when asked to stop
async fn read_loop(
    shared: &Arc<StreamShared>,
    epoch: u64,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), TransportError> {
    let connect_timeout = shared.config.connect_timeout;
    let connected = tokio::select! {
        _ = shutdown_requested(shutdown) => None,
        result = timeout(connect_timeout, shared.connector.connect(&shared.request)) => Some(result),
    };

    let mut stream = match connected {
        None => return Ok(()),
        Some(Ok(Ok(stream))) => stream,
        Some(Ok(Err(e))) => return Err(e),
        Some(Err(_)) => return Err(TransportError::ConnectTimeout(connect_timeout)),
    };

    let session = Arc::new(StreamSession::new(epoch, shared.config.heartbeat_interval));
    if !shared.session_opened(epoch, Arc::clone(&session)) {
        stream.close().await;
        return Ok(());
    }
    info!(epoch, url = %shared.request.url, "Event stream connected");

    loop {
        // Re-read every pass so a new server interval applies immediately
        let interval = session.heartbeat_interval();

        let next = tokio::select! {
            _ = shutdown_requested(shutdown) => None,
            next = timeout(interval, stream.next_frame()) => Some(next),
        };
        let Some(next) = next else {
            stream.close().await;
            return Ok(());
        };

        match next {
            Err(_) => return Err(TransportError::ReceiveTimeout(interval)),
            Ok(None) => return Err(TransportError::UnexpectedEof),
            Ok(Some(Err(e))) => return Err(e),
            Ok(Some(Ok(Frame::Text(text)))) => shared.dispatch(&session, &text),
            Ok(Some(Ok(Frame::Close(close)))) => {
                let (code, reason) = match close {
                    Some(close) => (Some(close.code), close.reason),
                    None => (None, String::new()),
                };
                return Err(TransportError::Closed { code, reason });
            }
            Ok(Some(Ok(Frame::Binary(data)))) => {
                warn!(epoch, len = data.len(), "Ignoring unexpected binary frame");
            }
            Ok(Some(Ok(other))) => {
                debug!(frame = ?other, "Ignoring control frame");
            }
        }
    }
}

/// Resolves once shutdown is signalled or the signal is dropped
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

fn log_failure(epoch: u64, failure: &TransportError) {
    match failure.severity() {
        Severity::Debug => debug!(epoch, "Event stream interrupted: {}", failure),
        Severity::Warn => warn!(epoch, "Event stream failed: {}", failure),
        Severity::Error => error!(epoch, error = ?failure, "Event stream error: {}", failure),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_requested_resolves_on_signal() {
        let (tx, mut rx) = watch::channel(false);
        let waiter = tokio::spawn(async move { shutdown_requested(&mut rx).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(!waiter.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_requested_resolves_when_sender_dropped() {
        let (tx, mut rx) = watch::channel(false);
        drop(tx);
        shutdown_requested(&mut rx).await;
    }
}
