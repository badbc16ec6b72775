use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kestrel_config::{DebuggerConfig, EvaluationConfig};
use kestrel_debug::{BreakpointSpec, DebugError, ResolutionState, SessionEvent, StopReason};
use kestrel_remote::{MockFrame, MockMethod, MockType, RemoteValue, VmEvent};
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use super::support::Fixture;

const WAIT: Duration = Duration::from_secs(5);

async fn eventually(mut check: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !check() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[test]
fn evaluate_reports_display_and_type() {
    let fx = Fixture::new();
    let session = fx.session();

    let result = session.evaluate("1 + 2", fx.ctx());
    assert_eq!(result.display_value, "3");
    assert_eq!(result.type_name, "int");
    assert_eq!(result.expandable_handle, None);

    let result = session.evaluate("s", fx.ctx());
    assert_eq!(result.display_value, "hello");
    assert_eq!(result.type_name, "java.lang.String");

    let result = session.evaluate("1.0 / 4", fx.ctx());
    assert_eq!(result.display_value, "0.25");
    assert_eq!(result.type_name, "double");
}

#[test]
fn evaluation_errors_become_display_text() {
    let fx = Fixture::new();
    let session = fx.session();

    let result = session.evaluate("5 / 0", fx.ctx());
    assert_eq!(result.display_value, "Error: division by zero");
    assert_eq!(result.type_name, "");

    let result = session.evaluate("1 +", fx.ctx());
    assert!(result.display_value.starts_with("Error: "), "{result:?}");
    assert!(session.try_evaluate("1 +", fx.ctx()).is_err());
}

#[test]
fn objects_get_expandable_handles() {
    let fx = Fixture::new();
    let session = fx.session();

    let result = session.evaluate("this", fx.ctx());
    assert!(result.display_value.starts_with("Main@"), "{result:?}");
    assert_eq!(result.type_name, "com.example.Main");
    let handle = result.expandable_handle.unwrap();
    assert_eq!(handle.to_string(), "@1");
    assert_eq!(session.object_for_handle(handle), Some(fx.this));

    // The same object keeps its handle.
    let again = session.evaluate("this", fx.ctx());
    assert_eq!(again.expandable_handle, Some(handle));

    let array = session.evaluate("arr", fx.ctx());
    assert_eq!(array.display_value, "int[3]");
    assert_eq!(array.type_name, "int[]");
    assert_ne!(array.expandable_handle, Some(handle));

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(
        json,
        serde_json::json!({
            "displayValue": result.display_value,
            "typeName": "com.example.Main",
            "expandableHandle": 1,
        })
    );
    let plain = serde_json::to_value(session.evaluate("x", fx.ctx())).unwrap();
    assert!(plain.get("expandableHandle").is_none());
}

#[test]
fn long_strings_are_truncated_for_display_only() {
    let fx = Fixture::new();
    let session = fx.session();
    let long = "a".repeat(100);

    let result = session.evaluate(&format!("\"{long}\""), fx.ctx());
    assert_eq!(result.display_value, format!("{}…", "a".repeat(80)));

    let length = session.evaluate(&format!("\"{long}\".length"), fx.ctx());
    assert_eq!(length.display_value, "100");

    let session = fx.session_with(DebuggerConfig {
        evaluation: EvaluationConfig {
            max_string_display: 5,
            ..EvaluationConfig::default()
        },
        ..DebuggerConfig::default()
    });
    assert_eq!(session.evaluate("s + s", fx.ctx()).display_value, "hello…");
}

#[test]
fn resume_drops_unpinned_handles() {
    let fx = Fixture::new();
    let session = fx.session();

    let this = session
        .evaluate("this", fx.ctx())
        .expandable_handle
        .unwrap();
    let arr = session.evaluate("arr", fx.ctx()).expandable_handle.unwrap();
    session.pin(this);

    session.resume(fx.thread).unwrap();
    assert!(!fx.vm.is_suspended(fx.thread));
    assert_eq!(session.object_for_handle(this), Some(fx.this));
    assert_eq!(session.object_for_handle(arr), None);

    session.unpin(this);
    fx.vm.suspend(fx.thread);
    session.resume(fx.thread).unwrap();
    assert_eq!(session.object_for_handle(this), None);
}

#[test]
fn continuing_another_thread_keeps_handles() {
    let fx = Fixture::new();
    let session = fx.session();
    let handle = session
        .evaluate("this", fx.ctx())
        .expandable_handle
        .unwrap();

    let other = fx.vm.add_thread();
    fx.vm
        .push_frame(other, MockFrame::new(fx.main).this(fx.this).at_line(10));
    let bp = session
        .add_line_breakpoint("com/example/Main.java", 10, Some("false"))
        .unwrap();
    let location = fx.vm.request(bp.requests[0]).unwrap().location;

    let emitted = session.handle_event(&VmEvent::BreakpointHit {
        request_id: bp.requests[0],
        thread: other,
        location,
    });
    assert!(emitted.is_empty());
    assert!(!fx.vm.is_suspended(other));
    assert!(fx.vm.is_suspended(fx.thread));
    assert_eq!(session.object_for_handle(handle), Some(fx.this));

    // Resuming the inspected thread still drops them.
    session.resume(fx.thread).unwrap();
    assert_eq!(session.object_for_handle(handle), None);
}

#[test]
fn collected_objects_invalidate_their_handle() {
    let fx = Fixture::new();
    let session = fx.session();

    let handle = session
        .evaluate("this", fx.ctx())
        .expandable_handle
        .unwrap();
    fx.vm.collect(fx.this);

    let result = session.evaluate("count", fx.ctx());
    assert!(result.display_value.starts_with("Error: "), "{result:?}");
    assert_eq!(session.object_for_handle(handle), None);
}

#[test]
fn evaluation_on_a_running_thread_is_refused() {
    let fx = Fixture::new();
    let session = fx.session();
    session.resume(fx.thread).unwrap();

    let result = session.evaluate("x", fx.ctx());
    assert!(result.display_value.starts_with("Error: "), "{result:?}");
    assert!(matches!(
        session.top_frame(fx.thread),
        Err(DebugError::Remote(_))
    ));
}

#[test]
fn top_frame_of_a_frameless_thread() {
    let fx = Fixture::new();
    let session = fx.session();
    assert_eq!(session.top_frame(fx.thread).unwrap(), fx.ctx());

    let empty = fx.vm.add_thread();
    assert!(matches!(
        session.top_frame(empty),
        Err(DebugError::NoFrames(thread)) if thread == empty
    ));
}

#[test]
fn evaluations_on_one_thread_never_overlap() {
    let fx = Fixture::new();
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let (a, p) = (active.clone(), peak.clone());
    fx.vm.add_type(
        MockType::new("com.example.Slow").method(
            MockMethod::new("work", &[], "int")
                .make_static()
                .computes(move |_| {
                    let now = a.fetch_add(1, Ordering::SeqCst) + 1;
                    p.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(20));
                    a.fetch_sub(1, Ordering::SeqCst);
                    RemoteValue::Int(1)
                }),
        ),
    );
    let session = Arc::new(fx.session());
    let ctx = fx.ctx();

    let workers: Vec<_> = (0..3)
        .map(|_| {
            let session = session.clone();
            std::thread::spawn(move || session.evaluate("Slow.work()", ctx))
        })
        .collect();
    for worker in workers {
        assert_eq!(worker.join().unwrap().display_value, "1");
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(active.load(Ordering::SeqCst), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_loop_gates_hits_and_reports_stops() {
    let fx = Fixture::new();
    let session = Arc::new(fx.session());
    let cancel = CancellationToken::new();
    let (task, mut events) = session.spawn_event_loop(cancel.clone());

    let bp = session
        .add_line_breakpoint("com/example/Main.java", 10, Some("x > 5"))
        .unwrap();
    let request = bp.requests[0];

    fx.set_x(3);
    fx.vm.hit(request, fx.thread);
    eventually(|| !fx.vm.is_suspended(fx.thread)).await;

    fx.set_x(10);
    fx.vm.hit(request, fx.thread);
    let stopped = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(
        stopped,
        Some(SessionEvent::Stopped {
            thread: fx.thread,
            reason: StopReason::Breakpoint { breakpoint: bp.id },
        })
    );
    assert!(fx.vm.is_suspended(fx.thread));
    assert_eq!(session.registry().get(bp.id).unwrap().hit_count, 2);

    fx.vm.disconnect();
    let terminated = tokio::time::timeout(WAIT, events.recv()).await.unwrap();
    assert_eq!(terminated, Some(SessionEvent::Terminated));
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(session.breakpoints().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_loop_resolves_pending_breakpoints_on_load() {
    let fx = Fixture::new();
    let session = Arc::new(fx.session());
    let cancel = CancellationToken::new();
    let (task, _events) = session.spawn_event_loop(cancel.clone());

    let late = fx.vm.define_type(
        MockType::new("com.example.Late")
            .source("com/example/Late.kt")
            .lines(1..=10),
    );
    let bp = session
        .add_breakpoint(BreakpointSpec::line("Late.kt", 4).log_message("late"))
        .unwrap();
    assert_eq!(bp.state, ResolutionState::Pending);

    fx.vm.load_type(late);
    eventually(|| {
        session
            .registry()
            .get(bp.id)
            .is_some_and(|bp| bp.state == ResolutionState::Resolved)
    })
    .await;

    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn event_loop_stops_on_cancel_and_when_the_listener_goes_away() {
    let fx = Fixture::new();
    let session = Arc::new(fx.session());

    let cancel = CancellationToken::new();
    let (task, _events) = session.spawn_event_loop(cancel.clone());
    cancel.cancel();
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();

    let (task, events) = session.spawn_event_loop(CancellationToken::new());
    drop(events);
    let bp = session
        .add_line_breakpoint("com/example/Main.java", 10, None)
        .unwrap();
    fx.vm.hit(bp.requests[0], fx.thread);
    tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
}
