//! Registry of the instances running in one process.

use crate::instance::{Instance, InstanceId, Lifecycle};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tidal_core::Result;

type Registry = Mutex<BTreeMap<InstanceId, Instance>>;

/// Keeps track of instances so they can be shut down together. An instance
/// leaves the registry when it stops.
#[derive(Clone, Default)]
pub struct InstanceManager {
    instances: Arc<Registry>,
}

impl InstanceManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `instance`. A stopped instance cannot be registered.
    pub fn register(&self, instance: &Instance) -> Result<InstanceId> {
        let id = instance.id();
        let registry: Weak<Registry> = Arc::downgrade(&self.instances);
        instance.post_shutdown(move || {
            if let Some(r) = registry.upgrade() {
                r.lock().remove(&id);
            }
        })?;
        self.instances.lock().insert(id, instance.clone());
        Ok(id)
    }

    pub fn get(&self, id: InstanceId) -> Option<Instance> {
        self.instances.lock().get(&id).cloned()
    }

    pub fn ids(&self) -> Vec<InstanceId> {
        self.instances.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.instances.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stops every registered instance. All of them are stopped even if some
    /// fail; the first error is returned.
    pub fn shutdown_all(&self) -> Result<()> {
        let instances = std::mem::take(&mut *self.instances.lock());
        tracing::info!(instances = instances.len(), "shutting down all instances");
        let mut first_err = None;
        for (id, instance) in instances {
            if instance.lifecycle() == Lifecycle::Stopped {
                continue;
            }
            if let Err(e) = instance.stop() {
                tracing::warn!(id, error = %e, "instance shutdown failed");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
