//! Per-connection liveness bookkeeping

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

/// State of one open connection. A fresh session is created for every
/// successful connect and dropped when that connection ends.
#[derive(Debug)]
pub struct StreamSession {
    epoch: u64,
    opened_at: Instant,
    state: Mutex<SessionState>,
}

#[derive(Debug)]
struct SessionState {
    heartbeat_interval: Duration,
    last_heartbeat: Option<Instant>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    frames: u64,
}

impl StreamSession {
    pub fn new(epoch: u64, heartbeat_interval: Duration) -> Self {
        Self {
            epoch,
            opened_at: Instant::now(),
            state: Mutex::new(SessionState {
                heartbeat_interval,
                last_heartbeat: None,
                last_heartbeat_at: None,
                frames: 0,
            }),
        }
    }

    /// Start generation this session belongs to
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn opened_at(&self) -> Instant {
        self.opened_at
    }

    pub fn record_frame(&self) {
        self.state.lock().frames += 1;
    }

    pub fn frames_received(&self) -> u64 {
        self.state.lock().frames
    }

    /// Note a heartbeat, adopting the server's interval when it sent one
    pub fn record_heartbeat(&self, interval: Option<Duration>) {
        let mut state = self.state.lock();
        state.last_heartbeat = Some(Instant::now());
        state.last_heartbeat_at = Some(Utc::now());
        if let Some(interval) = interval {
            state.heartbeat_interval = interval;
        }
    }

    /// Current heartbeat interval; also the receive timeout of the read loop
    pub fn heartbeat_interval(&self) -> Duration {
        self.state.lock().heartbeat_interval
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_heartbeat_at
    }

    pub fn last_heartbeat_age(&self) -> Option<Duration> {
        self.state.lock().last_heartbeat.map(|at| at.elapsed())
    }

    /// Time since the last heartbeat, or since the session opened if none
    /// has arrived yet
    pub fn liveness_age(&self) -> Duration {
        let since = self.state.lock().last_heartbeat.unwrap_or(self.opened_at);
        since.elapsed()
    }
}
