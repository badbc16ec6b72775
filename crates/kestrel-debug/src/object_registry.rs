use std::collections::{BTreeSet, HashMap, VecDeque};

use kestrel_remote::ObjectId;
use serde::Serialize;

/// Small, stable name for an expandable evaluation result, shown as `@n`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[derive(Clone, Debug)]
struct Entry {
    object: ObjectId,
    type_name: String,
    invalid: bool,
}

/// Maps remote objects to handles. Unpinned handles are stop-scoped and
/// bounded: once more than `max_unpinned` exist the oldest are evicted.
#[derive(Debug)]
pub struct ObjectRegistry {
    next_handle: u32,
    by_object: HashMap<ObjectId, ObjectHandle>,
    entries: HashMap<ObjectHandle, Entry>,
    pinned: BTreeSet<ObjectHandle>,
    max_unpinned: usize,
    unpinned_fifo: VecDeque<ObjectHandle>,
}

impl Default for ObjectRegistry {
    fn default() -> Self {
        Self::with_max_unpinned(10_000)
    }
}

impl ObjectRegistry {
    pub fn with_max_unpinned(max_unpinned: usize) -> Self {
        Self {
            next_handle: 1,
            by_object: HashMap::new(),
            entries: HashMap::new(),
            pinned: BTreeSet::new(),
            max_unpinned,
            unpinned_fifo: VecDeque::new(),
        }
    }

    /// Handle for `object`, reusing the existing one if it is still tracked.
    pub fn track(&mut self, object: ObjectId, type_name: &str) -> ObjectHandle {
        if let Some(handle) = self.by_object.get(&object).copied() {
            if let Some(entry) = self.entries.get_mut(&handle) {
                entry.type_name = type_name.to_string();
                entry.invalid = false;
            }
            return handle;
        }

        let handle = self.allocate_handle();
        self.by_object.insert(object, handle);
        self.entries.insert(
            handle,
            Entry {
                object,
                type_name: type_name.to_string(),
                invalid: false,
            },
        );
        self.unpinned_fifo.push_back(handle);
        self.evict_overflow();
        handle
    }

    pub fn object_id(&self, handle: ObjectHandle) -> Option<ObjectId> {
        self.entries.get(&handle).map(|e| e.object)
    }

    pub fn type_name(&self, handle: ObjectHandle) -> Option<&str> {
        self.entries.get(&handle).map(|e| e.type_name.as_str())
    }

    pub fn handle_for(&self, object: ObjectId) -> Option<ObjectHandle> {
        self.by_object.get(&object).copied()
    }

    /// Record that the target reported `object` as collected.
    pub fn mark_invalid(&mut self, object: ObjectId) {
        if let Some(handle) = self.by_object.get(&object) {
            if let Some(entry) = self.entries.get_mut(handle) {
                entry.invalid = true;
            }
        }
    }

    /// Unknown handles count as invalid.
    pub fn is_invalid(&self, handle: ObjectHandle) -> bool {
        self.entries.get(&handle).is_none_or(|e| e.invalid)
    }

    pub fn pin(&mut self, handle: ObjectHandle) {
        if self.entries.contains_key(&handle) && self.pinned.insert(handle) {
            self.unpinned_fifo.retain(|h| *h != handle);
        }
    }

    pub fn unpin(&mut self, handle: ObjectHandle) {
        if self.pinned.remove(&handle) && self.entries.contains_key(&handle) {
            self.unpinned_fifo.push_back(handle);
            self.evict_overflow();
        }
    }

    pub fn is_pinned(&self, handle: ObjectHandle) -> bool {
        self.pinned.contains(&handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every handle that is not pinned. Called when the target resumes.
    pub fn clear_unpinned(&mut self) {
        for handle in self.unpinned_fifo.drain(..) {
            if let Some(entry) = self.entries.remove(&handle) {
                self.by_object.remove(&entry.object);
            }
        }
    }

    /// Next free handle number. After wrapping, numbers still in use are
    /// skipped.
    fn allocate_handle(&mut self) -> ObjectHandle {
        loop {
            let handle = ObjectHandle(self.next_handle);
            self.next_handle = self.next_handle.wrapping_add(1).max(1);
            if !self.entries.contains_key(&handle) {
                return handle;
            }
        }
    }

    fn evict_overflow(&mut self) {
        while self.unpinned_fifo.len() > self.max_unpinned {
            let Some(handle) = self.unpinned_fifo.pop_front() else {
                break;
            };
            if self.pinned.contains(&handle) {
                continue;
            }
            if let Some(entry) = self.entries.remove(&handle) {
                self.by_object.remove(&entry.object);
            }
        }
    }
}
