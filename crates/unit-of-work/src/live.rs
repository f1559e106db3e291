//! Live-instance arena for detecting units of work that were never disposed.

use std::collections::HashMap;
use std::panic::Location;
use std::sync::{Mutex, PoisonError};

use uuid::Uuid;

/// A unit of work that was created and not yet disposed.
#[derive(Debug, Clone)]
pub struct LiveInstance {
    pub id: Uuid,
    pub activity: String,
    pub created_site: &'static Location<'static>,
}

/// Counted arena of undisposed units of work, owned by one manager.
///
/// Instances register on creation and unregister on dispose. Tests assert
/// the arena is empty once they are done; whatever remains names the call
/// site that forgot to dispose.
#[derive(Debug, Default)]
pub struct LiveInstances {
    live: Mutex<HashMap<Uuid, LiveInstance>>,
}

impl LiveInstances {
    pub(crate) fn register(&self, instance: LiveInstance) {
        self.lock().insert(instance.id, instance);
    }

    pub(crate) fn release(&self, id: Uuid) {
        self.lock().remove(&id);
    }

    /// Returns the number of undisposed instances.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Returns every undisposed instance.
    pub fn snapshot(&self) -> Vec<LiveInstance> {
        self.lock().values().cloned().collect()
    }

    /// Panics if any unit of work is still undisposed.
    #[track_caller]
    pub fn assert_empty(&self) {
        let live = self.snapshot();
        if !live.is_empty() {
            let sites: Vec<String> = live
                .iter()
                .map(|i| format!("{} ({}) created at {}", i.id, i.activity, i.created_site))
                .collect();
            panic!(
                "{} unit(s) of work were never disposed: {}",
                live.len(),
                sites.join("; ")
            );
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, LiveInstance>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
