//! Periodic timers.

use crate::inbox::Inbox;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tidal_core::{Error, Result, Tuple, Value};

static NEXT_FIRING: AtomicI64 = AtomicI64::new(1);

/// Wall-clock milliseconds since the Unix epoch.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Delivers `[id, time]` into a collection every period until cancelled.
pub(crate) struct PeriodicTimer {
    collection: String,
    cancel: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTimer {
    pub fn start(collection: &str, period: Duration, inbox: Arc<Inbox>) -> Result<Self> {
        if period.is_zero() {
            return Err(Error::usage(format!("periodic {} has a zero period", collection)));
        }
        let (cancel, cancelled) = mpsc::channel::<()>();
        let name = String::from(collection);
        let handle = thread::Builder::new()
            .name(format!("tidal-timer-{}", collection))
            .spawn(move || loop {
                match cancelled.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        let id = NEXT_FIRING.fetch_add(1, Ordering::Relaxed);
                        let now = now_ms() as i64;
                        let t = Tuple::new(vec![Value::Int64(id), Value::DateTime(now)]);
                        inbox.deliver(name.clone(), t);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|e| Error::usage(format!("cannot start timer {}: {}", collection, e)))?;
        tracing::debug!(collection, period_ms = period.as_millis() as u64, "timer started");
        Ok(Self {
            collection: String::from(collection),
            cancel: Some(cancel),
            handle: Some(handle),
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Stops the timer and waits for its thread.
    pub fn cancel(&mut self) {
        drop(self.cancel.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!(collection = %self.collection, "timer thread panicked");
            }
        }
    }
}

impl Drop for PeriodicTimer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_timer_fires_until_cancelled() {
        let inbox = Inbox::new();
        let mut timer = PeriodicTimer::start("tick", Duration::from_millis(5), inbox.clone()).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while inbox.len() < 2 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(2));
        }
        timer.cancel();
        let fired = inbox.drain();
        assert!(fired.len() >= 2);
        assert!(fired.iter().all(|(c, t)| c == "tick" && t.len() == 2));
        assert_ne!(fired[0].1, fired[1].1);

        thread::sleep(Duration::from_millis(20));
        assert!(inbox.is_empty());
        assert_eq!(timer.collection(), "tick");
    }

    #[test]
    fn test_zero_period_rejected() {
        assert!(PeriodicTimer::start("tick", Duration::ZERO, Inbox::new()).is_err());
    }
}
