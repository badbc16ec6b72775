use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::{
    FrameId, FrameInfo, InvokeTarget, Location, MethodId, MethodInfo, ObjectId, RemoteError,
    RemoteValue, RemoteVm, RequestId, Result, ThreadId, TypeId, VariableInfo, VmEvent,
};

const OBJECT_TYPE: &str = "java.lang.Object";
const STRING_TYPE: &str = "java.lang.String";

/// What a mock method does when invoked.
#[derive(Clone)]
pub enum MockBehavior {
    Return(RemoteValue),
    Throw(String),
    Compute(Arc<dyn Fn(&[RemoteValue]) -> RemoteValue + Send + Sync>),
}

impl std::fmt::Debug for MockBehavior {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Return(value) => f.debug_tuple("Return").field(value).finish(),
            Self::Throw(ty) => f.debug_tuple("Throw").field(ty).finish(),
            Self::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct MockMethod {
    pub name: String,
    pub param_types: Vec<String>,
    pub return_type: String,
    pub is_static: bool,
    pub behavior: MockBehavior,
}

impl MockMethod {
    pub fn new(name: &str, param_types: &[&str], return_type: &str) -> Self {
        Self {
            name: name.to_string(),
            param_types: param_types.iter().map(|p| p.to_string()).collect(),
            return_type: return_type.to_string(),
            is_static: false,
            behavior: MockBehavior::Return(RemoteValue::Void),
        }
    }

    pub fn constructor(param_types: &[&str]) -> Self {
        Self::new("<init>", param_types, "void")
    }

    pub fn make_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn returns(mut self, value: RemoteValue) -> Self {
        self.behavior = MockBehavior::Return(value);
        self
    }

    pub fn throws(mut self, exception_type: &str) -> Self {
        self.behavior = MockBehavior::Throw(exception_type.to_string());
        self
    }

    pub fn computes(
        mut self,
        f: impl Fn(&[RemoteValue]) -> RemoteValue + Send + Sync + 'static,
    ) -> Self {
        self.behavior = MockBehavior::Compute(Arc::new(f));
        self
    }
}

/// Declarative description of a type known to the mock VM.
#[derive(Clone, Debug)]
pub struct MockType {
    pub name: String,
    pub source_file: Option<String>,
    pub superclass: Option<String>,
    pub interfaces: Vec<String>,
    pub lines: Vec<u32>,
    pub methods: Vec<MockMethod>,
    pub fields: Vec<String>,
    pub static_fields: Vec<(String, RemoteValue)>,
}

impl MockType {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            source_file: None,
            superclass: (name != OBJECT_TYPE).then(|| OBJECT_TYPE.to_string()),
            interfaces: Vec::new(),
            lines: Vec::new(),
            methods: Vec::new(),
            fields: Vec::new(),
            static_fields: Vec::new(),
        }
    }

    pub fn interface(name: &str) -> Self {
        Self {
            superclass: None,
            ..Self::new(name)
        }
    }

    pub fn source(mut self, file: &str) -> Self {
        self.source_file = Some(file.to_string());
        self
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.superclass = Some(superclass.to_string());
        self
    }

    pub fn implements(mut self, interface: &str) -> Self {
        self.interfaces.push(interface.to_string());
        self
    }

    pub fn lines(mut self, lines: impl IntoIterator<Item = u32>) -> Self {
        self.lines.extend(lines);
        self
    }

    pub fn method(mut self, method: MockMethod) -> Self {
        self.methods.push(method);
        self
    }

    pub fn field(mut self, name: &str) -> Self {
        self.fields.push(name.to_string());
        self
    }

    pub fn static_field(mut self, name: &str, value: RemoteValue) -> Self {
        self.static_fields.push((name.to_string(), value));
        self
    }
}

/// A stack frame pushed onto a mock thread.
#[derive(Clone, Debug)]
pub struct MockFrame {
    pub declaring_type: TypeId,
    pub this: Option<ObjectId>,
    pub line: u32,
    /// `(name, type name, value)` in declaration order.
    pub locals: Vec<(String, String, RemoteValue)>,
}

impl MockFrame {
    pub fn new(declaring_type: TypeId) -> Self {
        Self {
            declaring_type,
            this: None,
            line: 1,
            locals: Vec::new(),
        }
    }

    pub fn this(mut self, object: ObjectId) -> Self {
        self.this = Some(object);
        self
    }

    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    pub fn local(mut self, name: &str, type_name: &str, value: RemoteValue) -> Self {
        self.locals
            .push((name.to_string(), type_name.to_string(), value));
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MockRequest {
    pub id: RequestId,
    pub location: Location,
    pub enabled: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct InvocationRecord {
    pub thread: ThreadId,
    pub method_id: MethodId,
    pub method_name: String,
    pub target: Option<InvokeTarget>,
    pub args: Vec<RemoteValue>,
}

struct TypeEntry {
    name: String,
    source_file: Option<String>,
    superclass: Option<String>,
    interfaces: Vec<String>,
    lines: Vec<u32>,
    methods: Vec<(MethodInfo, MockBehavior)>,
    fields: Vec<String>,
    static_fields: HashMap<String, RemoteValue>,
    loaded: bool,
}

enum HeapObject {
    Instance {
        type_id: TypeId,
        fields: Vec<(String, RemoteValue)>,
    },
    Str(String),
    Array {
        type_id: TypeId,
        elements: Vec<RemoteValue>,
    },
}

struct ThreadEntry {
    suspended: bool,
    /// Top of stack first.
    frames: Vec<(FrameId, MockFrame)>,
}

struct State {
    connected: bool,
    next_id: u64,
    next_request: RequestId,
    types: BTreeMap<TypeId, TypeEntry>,
    objects: HashMap<ObjectId, HeapObject>,
    threads: BTreeMap<ThreadId, ThreadEntry>,
    requests: BTreeMap<RequestId, MockRequest>,
    type_load_filters: Vec<(RequestId, String)>,
    invocations: Vec<InvocationRecord>,
}

impl State {
    fn alloc_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn check_connected(&self) -> Result<()> {
        if self.connected {
            Ok(())
        } else {
            Err(RemoteError::Disconnected)
        }
    }

    fn type_entry(&self, type_id: TypeId) -> Result<&TypeEntry> {
        self.types
            .get(&type_id)
            .ok_or(RemoteError::InvalidType(type_id))
    }

    fn type_by_name(&self, name: &str) -> Option<TypeId> {
        self.types
            .iter()
            .find(|(_, entry)| entry.name == name)
            .map(|(id, _)| *id)
    }

    fn define(&mut self, ty: MockType, loaded: bool) -> TypeId {
        let type_id = self.alloc_id();
        let mut methods = Vec::with_capacity(ty.methods.len());
        for method in ty.methods {
            let id = self.alloc_id();
            methods.push((
                MethodInfo {
                    id,
                    name: method.name,
                    param_types: method.param_types,
                    return_type: method.return_type,
                    is_static: method.is_static,
                },
                method.behavior,
            ));
        }
        self.types.insert(
            type_id,
            TypeEntry {
                name: ty.name,
                source_file: ty.source_file,
                superclass: ty.superclass,
                interfaces: ty.interfaces,
                lines: ty.lines,
                methods,
                fields: ty.fields,
                static_fields: ty.static_fields.into_iter().collect(),
                loaded,
            },
        );
        type_id
    }

    fn ensure_type(&mut self, name: &str) -> TypeId {
        match self.type_by_name(name) {
            Some(id) => id,
            None => self.define(MockType::new(name), true),
        }
    }

    /// Type ids from `type_id` up through its superclass chain.
    fn lineage(&self, type_id: TypeId) -> Vec<TypeId> {
        let mut out = Vec::new();
        let mut current = Some(type_id);
        while let Some(id) = current {
            if out.contains(&id) {
                break;
            }
            out.push(id);
            current = self
                .types
                .get(&id)
                .and_then(|entry| entry.superclass.as_deref())
                .and_then(|name| self.type_by_name(name));
        }
        out
    }

    fn find_method(&self, method_id: MethodId) -> Option<(&MethodInfo, &MockBehavior)> {
        self.types.values().find_map(|entry| {
            entry
                .methods
                .iter()
                .find(|(info, _)| info.id == method_id)
                .map(|(info, behavior)| (info, behavior))
        })
    }

    fn suspended_frame(&self, thread: ThreadId, frame: FrameId) -> Result<&MockFrame> {
        let entry = self
            .threads
            .get(&thread)
            .ok_or(RemoteError::InvalidThread(thread))?;
        if !entry.suspended {
            return Err(RemoteError::InvalidFrame { thread, frame });
        }
        entry
            .frames
            .iter()
            .find(|(id, _)| *id == frame)
            .map(|(_, f)| f)
            .ok_or(RemoteError::InvalidFrame { thread, frame })
    }

    fn check_suspended(&self, thread: ThreadId) -> Result<()> {
        match self.threads.get(&thread) {
            Some(entry) if entry.suspended => Ok(()),
            Some(_) => Err(RemoteError::NotSuspended(thread)),
            None => Err(RemoteError::InvalidThread(thread)),
        }
    }
}

/// Deterministic, in-memory stand-in for a target process.
///
/// The mock keeps a tiny heap, a type table, threads with frames and the set
/// of event requests. Every [`RemoteVm`] call goes through one lock, and
/// invocations are recorded so tests can assert which remote calls happened.
pub struct MockVm {
    state: Mutex<State>,
    events: broadcast::Sender<VmEvent>,
}

impl Default for MockVm {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVm {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(256);
        let vm = Self {
            state: Mutex::new(State {
                connected: true,
                next_id: 0,
                next_request: 0,
                types: BTreeMap::new(),
                objects: HashMap::new(),
                threads: BTreeMap::new(),
                requests: BTreeMap::new(),
                type_load_filters: Vec::new(),
                invocations: Vec::new(),
            }),
            events,
        };
        vm.add_type(MockType::new(OBJECT_TYPE));
        vm.add_type(MockType::interface("java.lang.CharSequence"));
        vm.add_type(MockType::interface("java.lang.Comparable"));
        vm.add_type(
            MockType::new(STRING_TYPE)
                .implements("java.lang.CharSequence")
                .implements("java.lang.Comparable"),
        );
        vm
    }

    /// Define a type that is already loaded (no load event is emitted).
    pub fn add_type(&self, ty: MockType) -> TypeId {
        self.state.lock().define(ty, true)
    }

    /// Define a type that the target has not loaded yet.
    pub fn define_type(&self, ty: MockType) -> TypeId {
        self.state.lock().define(ty, false)
    }

    /// Mark a defined type as loaded and notify matching type-load subscribers.
    pub fn load_type(&self, type_id: TypeId) {
        let notify = {
            let mut state = self.state.lock();
            let Some(entry) = state.types.get_mut(&type_id) else {
                return;
            };
            entry.loaded = true;
            let name = entry.name.clone();
            state
                .type_load_filters
                .iter()
                .any(|(_, filter)| filter_matches(filter, &name))
        };
        if notify {
            self.emit(VmEvent::TypeLoaded { type_id });
        }
    }

    pub fn type_id(&self, name: &str) -> Option<TypeId> {
        self.state.lock().type_by_name(name)
    }

    pub fn method_id(&self, type_id: TypeId, name: &str, param_types: &[&str]) -> Option<MethodId> {
        let state = self.state.lock();
        state.types.get(&type_id)?.methods.iter().find_map(|(info, _)| {
            (info.name == name
                && info.param_types.len() == param_types.len()
                && info.param_types.iter().zip(param_types).all(|(a, b)| a == b))
            .then_some(info.id)
        })
    }

    pub fn new_object(&self, type_id: TypeId, fields: Vec<(&str, RemoteValue)>) -> ObjectId {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.objects.insert(
            id,
            HeapObject::Instance {
                type_id,
                fields: fields
                    .into_iter()
                    .map(|(name, value)| (name.to_string(), value))
                    .collect(),
            },
        );
        id
    }

    pub fn new_string(&self, text: &str) -> RemoteValue {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.objects.insert(id, HeapObject::Str(text.to_string()));
        RemoteValue::String(id)
    }

    /// `element_type` is the component type name, e.g. `int`.
    pub fn new_array(&self, element_type: &str, elements: Vec<RemoteValue>) -> RemoteValue {
        let mut state = self.state.lock();
        let type_id = state.ensure_type(&format!("{element_type}[]"));
        let id = state.alloc_id();
        state
            .objects
            .insert(id, HeapObject::Array { type_id, elements });
        RemoteValue::Array(id)
    }

    /// Simulate garbage collection of an object.
    pub fn collect(&self, object: ObjectId) {
        self.state.lock().objects.remove(&object);
    }

    pub fn disconnect(&self) {
        self.state.lock().connected = false;
        self.emit(VmEvent::Terminated);
    }

    /// Add a suspended thread with no frames.
    pub fn add_thread(&self) -> ThreadId {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.threads.insert(
            id,
            ThreadEntry {
                suspended: true,
                frames: Vec::new(),
            },
        );
        id
    }

    /// Push a frame on top of the thread's stack.
    pub fn push_frame(&self, thread: ThreadId, frame: MockFrame) -> FrameId {
        let mut state = self.state.lock();
        let id = state.alloc_id();
        if let Some(entry) = state.threads.get_mut(&thread) {
            entry.frames.insert(0, (id, frame));
        }
        id
    }

    pub fn set_local(&self, thread: ThreadId, frame: FrameId, name: &str, value: RemoteValue) {
        let mut state = self.state.lock();
        let Some(entry) = state.threads.get_mut(&thread) else {
            return;
        };
        let Some((_, frame)) = entry.frames.iter_mut().find(|(id, _)| *id == frame) else {
            return;
        };
        if let Some(local) = frame.locals.iter_mut().find(|(n, _, _)| n == name) {
            local.2 = value;
        }
    }

    pub fn suspend(&self, thread: ThreadId) {
        if let Some(entry) = self.state.lock().threads.get_mut(&thread) {
            entry.suspended = true;
        }
    }

    pub fn is_suspended(&self, thread: ThreadId) -> bool {
        self.state
            .lock()
            .threads
            .get(&thread)
            .is_some_and(|entry| entry.suspended)
    }

    pub fn emit(&self, event: VmEvent) {
        // No receivers is fine: nobody is listening yet.
        let _ = self.events.send(event);
    }

    /// Suspend `thread` and report a hit of `request_id`.
    pub fn hit(&self, request_id: RequestId, thread: ThreadId) {
        let location = {
            let mut state = self.state.lock();
            if let Some(entry) = state.threads.get_mut(&thread) {
                entry.suspended = true;
            }
            state.requests.get(&request_id).map(|req| req.location)
        };
        if let Some(location) = location {
            self.emit(VmEvent::BreakpointHit {
                request_id,
                thread,
                location,
            });
        }
    }

    pub fn requests(&self) -> Vec<MockRequest> {
        self.state.lock().requests.values().cloned().collect()
    }

    pub fn request(&self, id: RequestId) -> Option<MockRequest> {
        self.state.lock().requests.get(&id).cloned()
    }

    pub fn type_load_subscriptions(&self) -> usize {
        self.state.lock().type_load_filters.len()
    }

    pub fn invocations(&self) -> Vec<InvocationRecord> {
        self.state.lock().invocations.clone()
    }

    pub fn invocation_count(&self, method_name: &str) -> usize {
        self.state
            .lock()
            .invocations
            .iter()
            .filter(|rec| rec.method_name == method_name)
            .count()
    }

    fn invoke(
        &self,
        thread: ThreadId,
        target: Option<InvokeTarget>,
        method: MethodId,
        args: &[RemoteValue],
    ) -> Result<RemoteValue> {
        let behavior = {
            let mut state = self.state.lock();
            state.check_connected()?;
            state.check_suspended(thread)?;
            if let Some(InvokeTarget::Instance(object)) = target {
                if !state.objects.contains_key(&object) {
                    return Err(RemoteError::InvalidObject(object));
                }
            }
            let (info, behavior) = state
                .find_method(method)
                .ok_or(RemoteError::InvalidMethod(method))?;
            let method_name = info.name.clone();
            let behavior = behavior.clone();
            tracing::trace!(target: "kestrel.remote", thread, method = %method_name, "mock invocation");
            state.invocations.push(InvocationRecord {
                thread,
                method_id: method,
                method_name,
                target,
                args: args.to_vec(),
            });
            behavior
        };

        match behavior {
            MockBehavior::Return(value) => Ok(value),
            MockBehavior::Throw(exception_type) => {
                Err(RemoteError::InvocationFailed { exception_type })
            }
            MockBehavior::Compute(f) => Ok(f(args)),
        }
    }
}

fn filter_matches(filter: &str, name: &str) -> bool {
    if filter == "*" {
        return true;
    }
    match filter.strip_suffix('*') {
        Some(prefix) => name.starts_with(prefix),
        None => filter == name,
    }
}

impl RemoteVm for MockVm {
    fn list_loaded_types(&self, name: Option<&str>) -> Result<Vec<TypeId>> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state
            .types
            .iter()
            .filter(|(_, entry)| entry.loaded)
            .filter(|(_, entry)| name.is_none_or(|name| entry.name == name))
            .map(|(id, _)| *id)
            .collect())
    }

    fn type_name(&self, type_id: TypeId) -> Result<String> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state.type_entry(type_id)?.name.clone())
    }

    fn type_source_file(&self, type_id: TypeId) -> Result<Option<String>> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state.type_entry(type_id)?.source_file.clone())
    }

    fn superclass(&self, type_id: TypeId) -> Result<Option<TypeId>> {
        let state = self.state.lock();
        state.check_connected()?;
        let entry = state.type_entry(type_id)?;
        Ok(entry
            .superclass
            .as_deref()
            .and_then(|name| state.type_by_name(name)))
    }

    fn interfaces(&self, type_id: TypeId) -> Result<Vec<TypeId>> {
        let state = self.state.lock();
        state.check_connected()?;
        let entry = state.type_entry(type_id)?;
        Ok(entry
            .interfaces
            .iter()
            .filter_map(|name| state.type_by_name(name))
            .collect())
    }

    fn locations_for_line(&self, type_id: TypeId, line: u32) -> Result<Vec<Location>> {
        let state = self.state.lock();
        state.check_connected()?;
        let entry = state.type_entry(type_id)?;
        if !entry.lines.contains(&line) {
            return Ok(Vec::new());
        }
        let method_id = entry.methods.first().map(|(info, _)| info.id).unwrap_or(0);
        Ok(vec![Location {
            type_id,
            method_id,
            line,
            index: u64::from(line),
        }])
    }

    fn methods_by_name(&self, type_id: TypeId, name: &str) -> Result<Vec<MethodInfo>> {
        let state = self.state.lock();
        state.check_connected()?;
        state.type_entry(type_id)?;
        let mut out: Vec<MethodInfo> = Vec::new();
        for id in state.lineage(type_id) {
            let Some(entry) = state.types.get(&id) else {
                continue;
            };
            for (info, _) in &entry.methods {
                if info.name != name {
                    continue;
                }
                // Overrides shadow the inherited declaration.
                if id != type_id && out.iter().any(|m| m.param_types == info.param_types) {
                    continue;
                }
                out.push(info.clone());
            }
        }
        Ok(out)
    }

    fn method_entry_location(
        &self,
        type_id: TypeId,
        method_id: MethodId,
    ) -> Result<Option<Location>> {
        let state = self.state.lock();
        state.check_connected()?;
        let entry = state.type_entry(type_id)?;
        if !entry.methods.iter().any(|(info, _)| info.id == method_id) {
            return Err(RemoteError::InvalidMethod(method_id));
        }
        let line = entry.lines.first().copied().unwrap_or(0);
        Ok(Some(Location {
            type_id,
            method_id,
            line,
            index: 0,
        }))
    }

    fn create_location_breakpoint(&self, location: Location) -> Result<RequestId> {
        let mut state = self.state.lock();
        state.check_connected()?;
        state.type_entry(location.type_id)?;
        state.next_request += 1;
        let id = state.next_request;
        state.requests.insert(
            id,
            MockRequest {
                id,
                location,
                enabled: true,
            },
        );
        Ok(id)
    }

    fn set_request_enabled(&self, request: RequestId, enabled: bool) -> Result<()> {
        let mut state = self.state.lock();
        state.check_connected()?;
        let req = state
            .requests
            .get_mut(&request)
            .ok_or(RemoteError::InvalidRequest(request))?;
        req.enabled = enabled;
        Ok(())
    }

    fn delete_request(&self, request: RequestId) -> Result<()> {
        let mut state = self.state.lock();
        state.check_connected()?;
        if state.requests.remove(&request).is_some() {
            return Ok(());
        }
        let before = state.type_load_filters.len();
        state.type_load_filters.retain(|(id, _)| *id != request);
        if state.type_load_filters.len() == before {
            return Err(RemoteError::InvalidRequest(request));
        }
        Ok(())
    }

    fn subscribe_type_load(&self, filter: &str) -> Result<RequestId> {
        let mut state = self.state.lock();
        state.check_connected()?;
        state.next_request += 1;
        let id = state.next_request;
        state.type_load_filters.push((id, filter.to_string()));
        Ok(id)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<VmEvent> {
        self.events.subscribe()
    }

    fn thread_is_suspended(&self, thread: ThreadId) -> Result<bool> {
        let state = self.state.lock();
        state.check_connected()?;
        state
            .threads
            .get(&thread)
            .map(|entry| entry.suspended)
            .ok_or(RemoteError::InvalidThread(thread))
    }

    fn resume_thread(&self, thread: ThreadId) -> Result<()> {
        let mut state = self.state.lock();
        state.check_connected()?;
        let entry = state
            .threads
            .get_mut(&thread)
            .ok_or(RemoteError::InvalidThread(thread))?;
        entry.suspended = false;
        Ok(())
    }

    fn frames(&self, thread: ThreadId) -> Result<Vec<FrameInfo>> {
        let state = self.state.lock();
        state.check_connected()?;
        let entry = state
            .threads
            .get(&thread)
            .ok_or(RemoteError::InvalidThread(thread))?;
        if !entry.suspended {
            return Err(RemoteError::NotSuspended(thread));
        }
        Ok(entry
            .frames
            .iter()
            .map(|(id, frame)| FrameInfo {
                id: *id,
                location: Location {
                    type_id: frame.declaring_type,
                    method_id: 0,
                    line: frame.line,
                    index: u64::from(frame.line),
                },
            })
            .collect())
    }

    fn frame_this(&self, thread: ThreadId, frame: FrameId) -> Result<Option<ObjectId>> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state.suspended_frame(thread, frame)?.this)
    }

    fn visible_variables(&self, thread: ThreadId, frame: FrameId) -> Result<Vec<VariableInfo>> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state
            .suspended_frame(thread, frame)?
            .locals
            .iter()
            .map(|(name, type_name, _)| VariableInfo {
                name: name.clone(),
                type_name: type_name.clone(),
            })
            .collect())
    }

    fn variable_value(&self, thread: ThreadId, frame: FrameId, name: &str) -> Result<RemoteValue> {
        let state = self.state.lock();
        state.check_connected()?;
        state
            .suspended_frame(thread, frame)?
            .locals
            .iter()
            .find(|(n, _, _)| n == name)
            .map(|(_, _, value)| value.clone())
            .ok_or_else(|| RemoteError::Other(format!("no local variable `{name}`")))
    }

    fn frame_declaring_type(&self, thread: ThreadId, frame: FrameId) -> Result<TypeId> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state.suspended_frame(thread, frame)?.declaring_type)
    }

    fn object_type(&self, object: ObjectId) -> Result<TypeId> {
        let mut state = self.state.lock();
        state.check_connected()?;
        match state.objects.get(&object) {
            Some(HeapObject::Instance { type_id, .. }) => Ok(*type_id),
            Some(HeapObject::Array { type_id, .. }) => Ok(*type_id),
            Some(HeapObject::Str(_)) => Ok(state.ensure_type(STRING_TYPE)),
            None => Err(RemoteError::InvalidObject(object)),
        }
    }

    fn get_field(&self, object: ObjectId, name: &str) -> Result<Option<RemoteValue>> {
        let state = self.state.lock();
        state.check_connected()?;
        match state.objects.get(&object) {
            Some(HeapObject::Instance { type_id, fields }) => {
                if let Some((_, value)) = fields.iter().find(|(n, _)| n == name) {
                    return Ok(Some(value.clone()));
                }
                // Declared but never assigned reads as null.
                let declared = state.lineage(*type_id).into_iter().any(|id| {
                    state
                        .types
                        .get(&id)
                        .is_some_and(|entry| entry.fields.iter().any(|f| f == name))
                });
                Ok(declared.then_some(RemoteValue::Null))
            }
            Some(_) => Ok(None),
            None => Err(RemoteError::InvalidObject(object)),
        }
    }

    fn set_field(&self, object: ObjectId, name: &str, value: RemoteValue) -> Result<()> {
        let mut state = self.state.lock();
        state.check_connected()?;
        match state.objects.get_mut(&object) {
            Some(HeapObject::Instance { fields, .. }) => {
                match fields.iter_mut().find(|(n, _)| n == name) {
                    Some(slot) => slot.1 = value,
                    None => fields.push((name.to_string(), value)),
                }
                Ok(())
            }
            Some(_) => Err(RemoteError::Unsupported(format!(
                "object {object} has no field `{name}`"
            ))),
            None => Err(RemoteError::InvalidObject(object)),
        }
    }

    fn get_static_field(&self, type_id: TypeId, name: &str) -> Result<Option<RemoteValue>> {
        let state = self.state.lock();
        state.check_connected()?;
        Ok(state.type_entry(type_id)?.static_fields.get(name).cloned())
    }

    fn array_length(&self, array: ObjectId) -> Result<usize> {
        let state = self.state.lock();
        state.check_connected()?;
        match state.objects.get(&array) {
            Some(HeapObject::Array { elements, .. }) => Ok(elements.len()),
            Some(_) => Err(RemoteError::Unsupported(format!("object {array} is not an array"))),
            None => Err(RemoteError::InvalidObject(array)),
        }
    }

    fn get_array_element(&self, array: ObjectId, index: usize) -> Result<RemoteValue> {
        let state = self.state.lock();
        state.check_connected()?;
        match state.objects.get(&array) {
            Some(HeapObject::Array { elements, .. }) => {
                elements
                    .get(index)
                    .cloned()
                    .ok_or(RemoteError::InvalidIndex {
                        index,
                        length: elements.len(),
                    })
            }
            Some(_) => Err(RemoteError::Unsupported(format!("object {array} is not an array"))),
            None => Err(RemoteError::InvalidObject(array)),
        }
    }

    fn set_array_element(&self, array: ObjectId, index: usize, value: RemoteValue) -> Result<()> {
        let mut state = self.state.lock();
        state.check_connected()?;
        match state.objects.get_mut(&array) {
            Some(HeapObject::Array { elements, .. }) => {
                let length = elements.len();
                let slot = elements
                    .get_mut(index)
                    .ok_or(RemoteError::InvalidIndex { index, length })?;
                *slot = value;
                Ok(())
            }
            Some(_) => Err(RemoteError::Unsupported(format!("object {array} is not an array"))),
            None => Err(RemoteError::InvalidObject(array)),
        }
    }

    fn string_value(&self, string: ObjectId) -> Result<String> {
        let state = self.state.lock();
        state.check_connected()?;
        match state.objects.get(&string) {
            Some(HeapObject::Str(text)) => Ok(text.clone()),
            Some(_) => Err(RemoteError::Unsupported(format!("object {string} is not a string"))),
            None => Err(RemoteError::InvalidObject(string)),
        }
    }

    fn wrap_local_string(&self, text: &str) -> Result<ObjectId> {
        let mut state = self.state.lock();
        state.check_connected()?;
        let id = state.alloc_id();
        state.objects.insert(id, HeapObject::Str(text.to_string()));
        Ok(id)
    }

    fn invoke_method(
        &self,
        thread: ThreadId,
        target: InvokeTarget,
        method: MethodId,
        args: &[RemoteValue],
    ) -> Result<RemoteValue> {
        self.invoke(thread, Some(target), method, args)
    }

    fn new_instance(
        &self,
        thread: ThreadId,
        type_id: TypeId,
        constructor: MethodId,
        args: &[RemoteValue],
    ) -> Result<RemoteValue> {
        let result = self.invoke(thread, None, constructor, args)?;
        if !matches!(result, RemoteValue::Void) {
            return Ok(result);
        }
        let mut state = self.state.lock();
        let id = state.alloc_id();
        state.objects.insert(
            id,
            HeapObject::Instance {
                type_id,
                fields: Vec::new(),
            },
        );
        Ok(RemoteValue::Object(id))
    }
}
