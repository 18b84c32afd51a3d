//! Queue of tuples waiting for the next tick.

use crate::instance::Event;
use parking_lot::Mutex;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tidal_core::Tuple;

/// Inbound queue of one instance. Transports and timers deliver into it;
/// each tick drains it.
#[derive(Default)]
pub struct Inbox {
    queue: Mutex<Vec<(String, Tuple)>>,
    waker: Mutex<Option<Sender<Event>>>,
}

impl Inbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queues `t` for `collection`. A background driver is woken up.
    pub fn deliver(&self, collection: impl Into<String>, t: Tuple) {
        self.queue.lock().push((collection.into(), t));
        if let Some(waker) = self.waker.lock().as_ref() {
            // a closed driver just leaves the tuple queued
            let _ = waker.send(Event::Wake);
        }
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub(crate) fn drain(&self) -> Vec<(String, Tuple)> {
        std::mem::take(&mut *self.queue.lock())
    }

    pub(crate) fn set_waker(&self, waker: Option<Sender<Event>>) {
        *self.waker.lock() = waker;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use tidal_core::tuple;

    #[test]
    fn test_deliver_and_drain() {
        let inbox = Inbox::new();
        inbox.deliver("a", tuple![1]);
        inbox.deliver("b", tuple![2]);
        assert_eq!(inbox.len(), 2);
        let got = inbox.drain();
        assert_eq!(got[0], (String::from("a"), tuple![1]));
        assert!(inbox.is_empty());
    }

    #[test]
    fn test_deliver_wakes_driver() {
        let inbox = Inbox::new();
        let (tx, rx) = mpsc::channel();
        inbox.set_waker(Some(tx));
        inbox.deliver("a", tuple![1]);
        assert!(matches!(rx.try_recv(), Ok(Event::Wake)));
        drop(rx);
        inbox.deliver("a", tuple![2]);
        assert_eq!(inbox.len(), 2);
    }
}
