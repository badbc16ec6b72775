use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use kestrel_config::{BreakpointsConfig, MethodOverloadPolicy};
use kestrel_remote::{Location, RemoteError, RemoteVm, RequestId, TypeId};
use parking_lot::Mutex;

use super::source_match::{file_name, source_matches};
use super::{
    BreakpointDescriptor, BreakpointId, BreakpointKind, BreakpointSpec, HitCondition, MethodTarget,
    ResolutionState,
};
use crate::error::{DebugError, DebugResult};

/// A line breakpoint still waiting for a type from its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: BreakpointId,
    pub file: String,
    pub line: u32,
}

struct Entry {
    descriptor: BreakpointDescriptor,
    attached_types: HashSet<TypeId>,
}

#[derive(Default)]
struct RegistryState {
    breakpoints: HashMap<BreakpointId, Entry>,
    /// Keyed by bare file name; the stored path is matched on load.
    pending_by_file: HashMap<String, Vec<PendingEntry>>,
    /// Method breakpoints keyed by the exact type name they wait for.
    pending_by_type: HashMap<String, Vec<BreakpointId>>,
    request_owner: HashMap<RequestId, BreakpointId>,
}

/// Owns breakpoint definitions and reconciles them with the types the target
/// has loaded.
///
/// The state lock is held across the remote calls of a single operation, so
/// a `remove` never interleaves with a resolution attempt for the same id.
pub struct BreakpointRegistry {
    vm: Arc<dyn RemoteVm>,
    config: BreakpointsConfig,
    next_id: AtomicU64,
    state: Mutex<RegistryState>,
}

impl BreakpointRegistry {
    pub fn new(vm: Arc<dyn RemoteVm>, config: BreakpointsConfig) -> Self {
        Self {
            vm,
            config,
            next_id: AtomicU64::new(1),
            state: Mutex::new(RegistryState::default()),
        }
    }

    /// Register a breakpoint and try to resolve it against loaded types.
    pub fn register(&self, spec: BreakpointSpec) -> DebugResult<BreakpointDescriptor> {
        let hit_condition = spec
            .hit_condition
            .as_deref()
            .map(str::parse::<HitCondition>)
            .transpose()?;
        match &spec.kind {
            BreakpointKind::Line { line: 0, .. } => return Err(DebugError::InvalidLine),
            BreakpointKind::Method(target)
                if target.param_types.is_none()
                    && self.config.method_overloads == MethodOverloadPolicy::RequireSignature =>
            {
                return Err(DebugError::MissingSignature {
                    type_name: target.type_name.clone(),
                    method_name: target.method_name.clone(),
                });
            }
            _ => {}
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut entry = Entry {
            descriptor: BreakpointDescriptor {
                id,
                kind: spec.kind,
                enabled: spec.enabled,
                condition: spec.condition,
                hit_condition,
                log_message: spec.log_message,
                requests: Vec::new(),
                state: ResolutionState::Pending,
                hit_count: 0,
            },
            attached_types: HashSet::new(),
        };

        let mut guard = self.state.lock();
        let state = &mut *guard;
        match entry.descriptor.kind.clone() {
            BreakpointKind::Line { file, line } => {
                let mut matching = 0usize;
                for type_id in self.vm.list_loaded_types(None)? {
                    let Some(source) = self.source_file(type_id) else {
                        continue;
                    };
                    if !source_matches(self.config.source_match, &file, &source) {
                        continue;
                    }
                    matching += 1;
                    self.attach_line(&mut entry, &mut state.request_owner, type_id, line);
                }
                entry.descriptor.state = match entry.attached_types.len() {
                    0 => ResolutionState::Pending,
                    attached if attached < matching => ResolutionState::PartiallyResolved,
                    _ => ResolutionState::Resolved,
                };
                if entry.descriptor.state != ResolutionState::Resolved {
                    state
                        .pending_by_file
                        .entry(file_name(&file).to_string())
                        .or_default()
                        .push(PendingEntry { id, file, line });
                }
            }
            BreakpointKind::Method(target) => {
                for type_id in self.vm.list_loaded_types(Some(target.type_name.as_str()))? {
                    self.attach_method(&mut entry, &mut state.request_owner, type_id, &target);
                }
                if entry.attached_types.is_empty() {
                    state
                        .pending_by_type
                        .entry(target.type_name.clone())
                        .or_default()
                        .push(id);
                } else {
                    entry.descriptor.state = ResolutionState::Resolved;
                }
            }
        }

        tracing::debug!(
            target: "kestrel.breakpoints",
            id,
            state = ?entry.descriptor.state,
            requests = entry.descriptor.requests.len(),
            "registered breakpoint"
        );
        let snapshot = entry.descriptor.clone();
        state.breakpoints.insert(id, entry);
        Ok(snapshot)
    }

    /// Re-run matching for unresolved entries against one newly loaded type.
    /// Returns the ids that gained requests.
    pub fn on_type_loaded(&self, type_id: TypeId) -> Vec<BreakpointId> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let mut changed = Vec::new();

        let type_name = match self.vm.type_name(type_id) {
            Ok(name) => name,
            Err(err) => {
                tracing::debug!(target: "kestrel.breakpoints", type_id, error = %err, "skipping type that vanished");
                return changed;
            }
        };

        if let Some(waiting) = state.pending_by_type.remove(&type_name) {
            let mut still_waiting = Vec::new();
            for id in waiting {
                let Some(entry) = state.breakpoints.get_mut(&id) else {
                    continue;
                };
                let BreakpointKind::Method(target) = entry.descriptor.kind.clone() else {
                    continue;
                };
                if self.attach_method(entry, &mut state.request_owner, type_id, &target) > 0 {
                    entry.descriptor.state = ResolutionState::Resolved;
                    changed.push(id);
                } else {
                    still_waiting.push(id);
                }
            }
            if !still_waiting.is_empty() {
                state.pending_by_type.insert(type_name.clone(), still_waiting);
            }
        }

        let Some(source) = self.source_file(type_id) else {
            return changed;
        };
        let key = file_name(&source).to_string();
        let Some(pending) = state.pending_by_file.get(&key).cloned() else {
            return changed;
        };

        let mut resolved = HashSet::new();
        for PendingEntry { id, file, line } in pending {
            if !source_matches(self.config.source_match, &file, &source) {
                continue;
            }
            let Some(entry) = state.breakpoints.get_mut(&id) else {
                continue;
            };
            if entry.attached_types.contains(&type_id) {
                continue;
            }
            if self.attach_line(entry, &mut state.request_owner, type_id, line) == 0 {
                continue;
            }
            changed.push(id);
            if entry.descriptor.state == ResolutionState::Pending {
                entry.descriptor.state = ResolutionState::Resolved;
                resolved.insert(id);
            }
            tracing::debug!(
                target: "kestrel.breakpoints",
                id,
                type_name = %type_name,
                state = ?entry.descriptor.state,
                "resolved breakpoint on type load"
            );
        }

        if !resolved.is_empty() {
            if let Some(list) = state.pending_by_file.get_mut(&key) {
                list.retain(|p| !resolved.contains(&p.id));
                if list.is_empty() {
                    state.pending_by_file.remove(&key);
                }
            }
        }
        changed
    }

    /// Run load matching for every loaded type, e.g. after missed notifications.
    pub fn rescan(&self) -> Vec<BreakpointId> {
        let types = match self.vm.list_loaded_types(None) {
            Ok(types) => types,
            Err(err) => {
                tracing::warn!(target: "kestrel.breakpoints", error = %err, "rescan failed to list loaded types");
                return Vec::new();
            }
        };
        let mut changed = Vec::new();
        for type_id in types {
            for id in self.on_type_loaded(type_id) {
                if !changed.contains(&id) {
                    changed.push(id);
                }
            }
        }
        changed
    }

    /// Detach every request and forget every pending entry for `id`.
    /// Returns whether the breakpoint existed; calling it twice is harmless.
    pub fn remove(&self, id: BreakpointId) -> bool {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        state.pending_by_file.retain(|_, list| {
            list.retain(|p| p.id != id);
            !list.is_empty()
        });
        state.pending_by_type.retain(|_, ids| {
            ids.retain(|other| *other != id);
            !ids.is_empty()
        });

        let Some(entry) = state.breakpoints.remove(&id) else {
            return false;
        };
        for request in &entry.descriptor.requests {
            state.request_owner.remove(request);
            self.delete_request(*request);
        }
        tracing::debug!(target: "kestrel.breakpoints", id, "removed breakpoint");
        true
    }

    pub fn set_enabled(&self, id: BreakpointId, enabled: bool) -> DebugResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .breakpoints
            .get_mut(&id)
            .ok_or(DebugError::UnknownBreakpoint(id))?;
        for request in &entry.descriptor.requests {
            match self.vm.set_request_enabled(*request, enabled) {
                Ok(()) => {}
                Err(err) if err.is_stale_handle() => {
                    tracing::debug!(target: "kestrel.breakpoints", id, request, "request already gone");
                }
                Err(err) => return Err(err.into()),
            }
        }
        entry.descriptor.enabled = enabled;
        Ok(())
    }

    pub fn get(&self, id: BreakpointId) -> Option<BreakpointDescriptor> {
        self.state
            .lock()
            .breakpoints
            .get(&id)
            .map(|e| e.descriptor.clone())
    }

    /// Snapshots of every breakpoint, ordered by id.
    pub fn breakpoints(&self) -> Vec<BreakpointDescriptor> {
        let state = self.state.lock();
        let mut out: Vec<_> = state
            .breakpoints
            .values()
            .map(|e| e.descriptor.clone())
            .collect();
        out.sort_by_key(|d| d.id);
        out
    }

    pub fn pending_for_file(&self, file: &str) -> Vec<PendingEntry> {
        self.state
            .lock()
            .pending_by_file
            .get(file_name(file))
            .cloned()
            .unwrap_or_default()
    }

    pub fn breakpoint_for_request(&self, request: RequestId) -> Option<BreakpointId> {
        self.state.lock().request_owner.get(&request).copied()
    }

    /// Count a hit of `request` and return the owning breakpoint afterwards.
    /// Disabled breakpoints are returned but not counted.
    pub fn record_hit(&self, request: RequestId) -> Option<BreakpointDescriptor> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let id = state.request_owner.get(&request)?;
        let entry = state.breakpoints.get_mut(id)?;
        if entry.descriptor.enabled {
            entry.descriptor.hit_count += 1;
        }
        Some(entry.descriptor.clone())
    }

    /// Drop everything, detaching requests on a best-effort basis.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        for request in state.request_owner.keys() {
            self.delete_request(*request);
        }
        *state = RegistryState::default();
    }

    fn source_file(&self, type_id: TypeId) -> Option<String> {
        match self.vm.type_source_file(type_id) {
            Ok(source) => source,
            Err(err) => {
                tracing::debug!(target: "kestrel.breakpoints", type_id, error = %err, "no source file for type");
                None
            }
        }
    }

    fn delete_request(&self, request: RequestId) {
        if let Err(err) = self.vm.delete_request(request) {
            tracing::debug!(target: "kestrel.breakpoints", request, error = %err, "failed to delete request");
        }
    }

    /// Attach at the first location for `line` in `type_id`. Returns the
    /// number of requests created.
    fn attach_line(
        &self,
        entry: &mut Entry,
        owners: &mut HashMap<RequestId, BreakpointId>,
        type_id: TypeId,
        line: u32,
    ) -> usize {
        let locations = match self.vm.locations_for_line(type_id, line) {
            Ok(locations) => locations,
            Err(err) => {
                log_attach_failure(entry.descriptor.id, type_id, &err);
                return 0;
            }
        };
        let Some(location) = locations.into_iter().next() else {
            return 0;
        };
        usize::from(self.attach(entry, owners, location))
    }

    fn attach_method(
        &self,
        entry: &mut Entry,
        owners: &mut HashMap<RequestId, BreakpointId>,
        type_id: TypeId,
        target: &MethodTarget,
    ) -> usize {
        let methods = match self.vm.methods_by_name(type_id, &target.method_name) {
            Ok(methods) => methods,
            Err(err) => {
                log_attach_failure(entry.descriptor.id, type_id, &err);
                return 0;
            }
        };

        let mut attached = 0;
        for method in methods {
            if target
                .param_types
                .as_ref()
                .is_some_and(|params| *params != method.param_types)
            {
                continue;
            }
            // Inherited declarations have no entry location on this type.
            match self.vm.method_entry_location(type_id, method.id) {
                Ok(Some(location)) => {
                    if self.attach(entry, owners, location) {
                        attached += 1;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(target: "kestrel.breakpoints", method = %method.name, error = %err, "skipping overload");
                }
            }
        }
        tracing::debug!(
            target: "kestrel.breakpoints",
            id = entry.descriptor.id,
            method = %target.method_name,
            overloads = attached,
            "attached method breakpoint"
        );
        attached
    }

    fn attach(
        &self,
        entry: &mut Entry,
        owners: &mut HashMap<RequestId, BreakpointId>,
        location: Location,
    ) -> bool {
        let id = entry.descriptor.id;
        let request = match self.vm.create_location_breakpoint(location) {
            Ok(request) => request,
            Err(err) => {
                log_attach_failure(id, location.type_id, &err);
                return false;
            }
        };
        if !entry.descriptor.enabled {
            if let Err(err) = self.vm.set_request_enabled(request, false) {
                tracing::warn!(target: "kestrel.breakpoints", id, request, error = %err, "failed to disable new request");
            }
        }
        owners.insert(request, id);
        entry.descriptor.requests.push(request);
        entry.attached_types.insert(location.type_id);
        true
    }
}

fn log_attach_failure(id: BreakpointId, type_id: TypeId, err: &RemoteError) {
    if err.is_stale_handle() {
        tracing::debug!(target: "kestrel.breakpoints", id, type_id, error = %err, "type vanished during resolution");
    } else {
        tracing::warn!(target: "kestrel.breakpoints", id, type_id, error = %err, "failed to attach breakpoint");
    }
}
