use nginx_cache_core::{PurgeEvent, PurgeObserver, TriggerContext};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// A named event as seen by subscribers.
#[derive(Debug, Clone, Copy)]
pub struct HookEvent<'a> {
    pub name: &'a str,
    /// The triggering context the event fired in, if any.
    pub context: Option<&'a TriggerContext>,
}

pub type HookCallback = Arc<dyn Fn(&HookEvent<'_>) + Send + Sync>;

pub trait EventBus: Send + Sync {
    fn emit(&self, event: &HookEvent<'_>) -> usize;
    fn subscribe(&self, name: &str, callback: HookCallback);
}

/// Synchronous action registry. Callbacks run in registration order on the
/// caller's thread.
#[derive(Default)]
pub struct HookRegistry {
    hooks: Mutex<HashMap<String, Vec<HookCallback>>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_action<F>(&self, name: &str, callback: F)
    where
        F: Fn(&HookEvent<'_>) + Send + Sync + 'static,
    {
        self.subscribe(name, Arc::new(callback));
    }

    /// Fires `name` with no payload. Returns how many callbacks ran.
    pub fn do_action(&self, name: &str, context: Option<&TriggerContext>) -> usize {
        self.emit(&HookEvent { name, context })
    }

    pub fn has_action(&self, name: &str) -> bool {
        self.hooks
            .lock()
            .expect("hooks lock")
            .get(name)
            .is_some_and(|callbacks| !callbacks.is_empty())
    }

    pub fn remove_all(&self, name: &str) {
        self.hooks.lock().expect("hooks lock").remove(name);
    }
}

impl EventBus for HookRegistry {
    fn emit(&self, event: &HookEvent<'_>) -> usize {
        // Snapshot so a callback may register further hooks without deadlocking.
        let callbacks = match self.hooks.lock().expect("hooks lock").get(event.name) {
            Some(callbacks) => callbacks.clone(),
            None => return 0,
        };
        tracing::trace!(hook = event.name, count = callbacks.len(), "running hook");
        for callback in &callbacks {
            callback(event);
        }
        callbacks.len()
    }

    fn subscribe(&self, name: &str, callback: HookCallback) {
        self.hooks
            .lock()
            .expect("hooks lock")
            .entry(name.to_string())
            .or_default()
            .push(callback);
    }
}

impl PurgeObserver for HookRegistry {
    fn on_purge_event(&self, event: PurgeEvent) {
        self.do_action(event.hook_name(), None);
    }
}
