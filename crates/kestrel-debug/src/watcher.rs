use std::sync::Arc;

use kestrel_remote::{RemoteVm, RequestId, TypeId};
use parking_lot::Mutex;

use crate::breakpoints::{BreakpointId, BreakpointRegistry};
use crate::error::DebugResult;

/// Turns type-load notifications into resolution attempts.
///
/// The target is asked for a single catch-all subscription; filtering by
/// file or type name happens here, against the registry's pending lists.
pub struct ClassLoadWatcher {
    vm: Arc<dyn RemoteVm>,
    registry: Arc<BreakpointRegistry>,
    subscription: Mutex<Option<RequestId>>,
}

impl ClassLoadWatcher {
    pub fn new(vm: Arc<dyn RemoteVm>, registry: Arc<BreakpointRegistry>) -> Self {
        Self {
            vm,
            registry,
            subscription: Mutex::new(None),
        }
    }

    /// Subscribe once. Must happen before the first registration so no load
    /// can fall between the registry's scan and the subscription.
    pub fn ensure_subscribed(&self) -> DebugResult<RequestId> {
        let mut subscription = self.subscription.lock();
        if let Some(request) = *subscription {
            return Ok(request);
        }
        let request = self.vm.subscribe_type_load("*")?;
        tracing::debug!(target: "kestrel.watcher", request, "subscribed to type loads");
        *subscription = Some(request);
        Ok(request)
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.lock().is_some()
    }

    pub fn on_type_loaded(&self, type_id: TypeId) -> Vec<BreakpointId> {
        let changed = self.registry.on_type_loaded(type_id);
        if !changed.is_empty() {
            tracing::debug!(target: "kestrel.watcher", type_id, breakpoints = ?changed, "type load resolved breakpoints");
        }
        changed
    }

    /// Check every loaded type, for when notifications may have been dropped.
    pub fn rescan(&self) -> Vec<BreakpointId> {
        tracing::warn!(target: "kestrel.watcher", "rescanning loaded types");
        self.registry.rescan()
    }

    pub fn unsubscribe(&self) {
        if let Some(request) = self.subscription.lock().take() {
            if let Err(err) = self.vm.delete_request(request) {
                tracing::debug!(target: "kestrel.watcher", request, error = %err, "failed to drop type-load subscription");
            }
        }
    }
}
