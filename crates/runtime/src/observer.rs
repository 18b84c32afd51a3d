//! Per-collection callbacks and shutdown hooks.

use std::collections::BTreeMap;
use tidal_core::{Error, Result, Tuple};

/// Identifier of a registered callback.
pub type CallbackId = u64;

/// Identifier of a shutdown hook.
pub type HookId = u64;

/// Callback invoked with the contents of the collection it watches.
pub type Callback = Box<dyn FnMut(&[Tuple]) + Send>;

/// Hook run once while the instance stops.
pub type Hook = Box<dyn FnOnce() + Send>;

struct Observer {
    collection: String,
    callback: Callback,
}

/// Callbacks keyed by id; invoked in registration order.
pub(crate) struct Observers {
    observers: BTreeMap<CallbackId, Observer>,
    next_id: CallbackId,
}

impl Default for Observers {
    fn default() -> Self {
        Self::new()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self {
            observers: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Ids start at 1 and are never reused.
    pub fn register(&mut self, collection: &str, callback: Callback) -> CallbackId {
        let id = self.next_id;
        self.next_id += 1;
        self.observers.insert(
            id,
            Observer {
                collection: String::from(collection),
                callback,
            },
        );
        id
    }

    pub fn unregister(&mut self, id: CallbackId) -> Result<()> {
        match self.observers.remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::usage(format!("missing callback: {}", id))),
        }
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    /// Calls every callback watching one of `changed`. `read` returns a
    /// collection's contents; it is called once per collection.
    pub fn notify<F>(&mut self, changed: &[String], mut read: F)
    where
        F: FnMut(&str) -> Option<Vec<Tuple>>,
    {
        if changed.is_empty() || self.observers.is_empty() {
            return;
        }
        let mut cache: BTreeMap<String, Option<Vec<Tuple>>> = BTreeMap::new();
        for obs in self.observers.values_mut() {
            if !changed.iter().any(|c| *c == obs.collection) {
                continue;
            }
            let contents = cache
                .entry(obs.collection.clone())
                .or_insert_with(|| read(&obs.collection));
            if let Some(tuples) = contents {
                (obs.callback)(tuples);
            }
        }
    }
}

/// Hooks run around shutdown.
pub(crate) struct ShutdownHooks {
    hooks: BTreeMap<HookId, Hook>,
    post: Vec<Hook>,
    next_id: HookId,
}

impl Default for ShutdownHooks {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownHooks {
    pub fn new() -> Self {
        Self {
            hooks: BTreeMap::new(),
            post: Vec::new(),
            next_id: 0,
        }
    }

    pub fn on_shutdown(&mut self, hook: Hook) -> HookId {
        let id = self.next_id;
        self.next_id += 1;
        self.hooks.insert(id, hook);
        id
    }

    pub fn cancel(&mut self, id: HookId) -> Result<()> {
        match self.hooks.remove(&id) {
            Some(_) => Ok(()),
            None => Err(Error::usage(format!("no shutdown hook with id {}", id))),
        }
    }

    pub fn post_shutdown(&mut self, hook: Hook) {
        self.post.push(hook);
    }

    pub fn run_shutdown(&mut self) {
        for (_, hook) in std::mem::take(&mut self.hooks) {
            hook();
        }
    }

    pub fn run_post(&mut self) {
        for hook in std::mem::take(&mut self.post) {
            hook();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use tidal_core::tuple;

    #[test]
    fn test_notify_only_changed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut obs = Observers::new();
        let s = seen.clone();
        let a = obs.register("a", Box::new(move |ts| s.lock().push(ts.len())));
        let s = seen.clone();
        obs.register("b", Box::new(move |_| s.lock().push(100)));

        let mut reads = 0;
        obs.notify(&[String::from("a")], |_| {
            reads += 1;
            Some(vec![tuple![1], tuple![2]])
        });
        assert_eq!(*seen.lock(), vec![2]);
        assert_eq!(reads, 1);

        obs.unregister(a).unwrap();
        assert!(matches!(obs.unregister(a), Err(Error::Usage { .. })));
        assert_eq!(obs.len(), 1);
    }

    #[test]
    fn test_callback_ids_not_reused() {
        let mut obs = Observers::new();
        let a = obs.register("a", Box::new(|_| {}));
        assert_eq!(a, 1);
        obs.unregister(a).unwrap();
        let b = obs.register("a", Box::new(|_| {}));
        assert_eq!(b, 2);
        assert!(obs.unregister(a).is_err());
        assert_eq!(obs.len(), 1);
    }

    #[test]
    fn test_hooks_order_and_cancel() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut hooks = ShutdownHooks::new();
        let l = log.clone();
        hooks.on_shutdown(Box::new(move || l.lock().push("first")));
        let l = log.clone();
        let dropped = hooks.on_shutdown(Box::new(move || l.lock().push("cancelled")));
        let l = log.clone();
        hooks.post_shutdown(Box::new(move || l.lock().push("post")));
        let l = log.clone();
        hooks.on_shutdown(Box::new(move || l.lock().push("second")));

        hooks.cancel(dropped).unwrap();
        assert!(matches!(hooks.cancel(dropped), Err(Error::Usage { .. })));
        hooks.run_shutdown();
        hooks.run_post();
        hooks.run_shutdown();
        assert_eq!(*log.lock(), vec!["first", "second", "post"]);
    }
}
