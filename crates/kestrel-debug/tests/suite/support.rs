use std::sync::Arc;

use kestrel_config::DebuggerConfig;
use kestrel_debug::{DebugSession, FrameContext};
use kestrel_remote::{
    FrameId, MockFrame, MockMethod, MockType, MockVm, ObjectId, RemoteValue, ThreadId, TypeId,
};

/// A target suspended inside `com.example.Main.run` at line 10.
///
/// Locals: `x: int = 10`, `s: String = "hello"`, `arr: int[] = [10, 20, 30]`,
/// `nothing: Object = null`. `this` has `count = 7` and an unset `name`.
pub struct Fixture {
    pub vm: Arc<MockVm>,
    pub main: TypeId,
    pub this: ObjectId,
    pub thread: ThreadId,
    pub frame: FrameId,
}

impl Fixture {
    pub fn new() -> Self {
        let vm = Arc::new(MockVm::new());
        let int_text = vm.new_string("int");
        let long_text = vm.new_string("long");
        let label = vm.new_string("main");

        let main = vm.add_type(
            MockType::new("com.example.Main")
                .source("com/example/Main.java")
                .lines(1..=30)
                .field("count")
                .field("name")
                .static_field("LIMIT", RemoteValue::Int(100))
                .method(MockMethod::new("run", &[], "void"))
                .method(MockMethod::new("f", &["int"], "java.lang.String").returns(int_text))
                .method(MockMethod::new("f", &["long"], "java.lang.String").returns(long_text))
                .method(
                    MockMethod::new("explode", &[], "boolean")
                        .throws("java.lang.IllegalStateException"),
                )
                .method(MockMethod::new("getLabel", &[], "java.lang.String").returns(label))
                .method(MockMethod::new("isReady", &[], "boolean").returns(RemoteValue::Boolean(true)))
                .method(
                    MockMethod::new("twice", &["int"], "int")
                        .make_static()
                        .computes(|args| match args {
                            [RemoteValue::Int(v)] => RemoteValue::Int(v * 2),
                            _ => RemoteValue::Void,
                        }),
                ),
        );
        vm.add_type(
            MockType::new("com.example.Point")
                .source("com/example/Point.java")
                .field("x")
                .field("y")
                .method(MockMethod::constructor(&["int", "int"])),
        );

        let this = vm.new_object(main, vec![("count", RemoteValue::Int(7))]);
        let s = vm.new_string("hello");
        let arr = vm.new_array(
            "int",
            vec![RemoteValue::Int(10), RemoteValue::Int(20), RemoteValue::Int(30)],
        );

        let thread = vm.add_thread();
        let frame = vm.push_frame(
            thread,
            MockFrame::new(main)
                .this(this)
                .at_line(10)
                .local("x", "int", RemoteValue::Int(10))
                .local("s", "java.lang.String", s)
                .local("arr", "int[]", arr)
                .local("nothing", "java.lang.Object", RemoteValue::Null),
        );

        Self {
            vm,
            main,
            this,
            thread,
            frame,
        }
    }

    pub fn ctx(&self) -> FrameContext {
        FrameContext {
            thread: self.thread,
            frame: self.frame,
        }
    }

    pub fn set_x(&self, value: i32) {
        self.vm
            .set_local(self.thread, self.frame, "x", RemoteValue::Int(value));
    }

    /// Load `java.lang.Number`, `Integer` and `Boolean`, then push a frame on
    /// top of `thread` with locals `boxed: Integer = 5` and
    /// `flag: Boolean = false`.
    pub fn push_boxed_frame(&self) -> FrameContext {
        self.vm.add_type(MockType::new("java.lang.Number"));
        let vm = Arc::downgrade(&self.vm);
        let integer = self.vm.add_type(
            MockType::new("java.lang.Integer")
                .extends("java.lang.Number")
                .implements("java.lang.Comparable")
                .field("value")
                .method(
                    MockMethod::new("valueOf", &["int"], "java.lang.Integer")
                        .make_static()
                        .computes(move |args| {
                            let Some(vm) = vm.upgrade() else {
                                return RemoteValue::Null;
                            };
                            let Some(integer) = vm.type_id("java.lang.Integer") else {
                                return RemoteValue::Null;
                            };
                            let value = args.first().cloned().unwrap_or(RemoteValue::Null);
                            RemoteValue::Object(vm.new_object(integer, vec![("value", value)]))
                        }),
                ),
        );
        let boolean = self.vm.add_type(
            MockType::new("java.lang.Boolean")
                .implements("java.lang.Comparable")
                .field("value"),
        );

        let five = self.vm.new_object(integer, vec![("value", RemoteValue::Int(5))]);
        let no = self
            .vm
            .new_object(boolean, vec![("value", RemoteValue::Boolean(false))]);
        let frame = self.vm.push_frame(
            self.thread,
            MockFrame::new(self.main)
                .this(self.this)
                .at_line(11)
                .local("boxed", "java.lang.Integer", RemoteValue::Object(five))
                .local("flag", "java.lang.Boolean", RemoteValue::Object(no)),
        );
        FrameContext {
            thread: self.thread,
            frame,
        }
    }

    pub fn session(&self) -> DebugSession {
        self.session_with(DebuggerConfig::default())
    }

    pub fn session_with(&self, config: DebuggerConfig) -> DebugSession {
        DebugSession::new(self.vm.clone(), config)
    }
}
