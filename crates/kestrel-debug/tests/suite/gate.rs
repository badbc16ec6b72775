use kestrel_debug::{BreakpointSpec, DebugSession, HitNotification, SessionEvent, StopReason};
use kestrel_remote::{RequestId, VmEvent};
use pretty_assertions::assert_eq;

use super::support::Fixture;

fn line_breakpoint(session: &DebugSession, spec: BreakpointSpec) -> (u64, RequestId) {
    let bp = session.add_breakpoint(spec).unwrap();
    (bp.id, bp.requests[0])
}

fn hit(fx: &Fixture, request_id: RequestId) -> HitNotification {
    HitNotification {
        request_id,
        thread: fx.thread,
    }
}

fn main_line(line: u32) -> BreakpointSpec {
    BreakpointSpec::line("com/example/Main.java", line)
}

#[test]
fn condition_is_evaluated_in_the_hit_frame() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, request) = line_breakpoint(&session, main_line(10).condition("x > 5"));

    fx.set_x(3);
    assert!(!session.should_stop(hit(&fx, request)));
    fx.set_x(10);
    assert!(session.should_stop(hit(&fx, request)));
}

#[test]
fn unconditional_breakpoint_always_stops() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, request) = line_breakpoint(&session, main_line(10));
    assert!(session.should_stop(hit(&fx, request)));
    assert!(session.should_stop(hit(&fx, request)));
}

#[test]
fn null_and_false_conditions_continue() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, null_request) = line_breakpoint(&session, main_line(10).condition("nothing"));
    let (_, false_request) = line_breakpoint(&session, main_line(11).condition("s.isEmpty()"));
    let (_, truthy_request) = line_breakpoint(&session, main_line(12).condition("count"));

    assert!(!session.should_stop(hit(&fx, null_request)));
    assert!(!session.should_stop(hit(&fx, false_request)));
    assert!(session.should_stop(hit(&fx, truthy_request)));
}

#[test]
fn broken_conditions_stop_instead_of_running_silently() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, syntax) = line_breakpoint(&session, main_line(10).condition("x >>> 5"));
    let (_, missing) = line_breakpoint(&session, main_line(11).condition("nope > 1"));
    let (_, throws) = line_breakpoint(&session, main_line(12).condition("explode()"));

    assert!(session.should_stop(hit(&fx, syntax)));
    assert!(session.should_stop(hit(&fx, missing)));
    assert!(session.should_stop(hit(&fx, throws)));
}

#[test]
fn boxed_condition_values_are_unboxed() {
    let fx = Fixture::new();
    fx.push_boxed_frame();
    let session = fx.session();
    let (_, flag) = line_breakpoint(&session, main_line(10).condition("flag"));
    let (_, small) = line_breakpoint(&session, main_line(11).condition("boxed > 7"));
    let (_, large) = line_breakpoint(&session, main_line(12).condition("boxed > 3"));

    assert!(!session.should_stop(hit(&fx, flag)));
    assert!(!session.should_stop(hit(&fx, small)));
    assert!(session.should_stop(hit(&fx, large)));
}

#[test]
fn hit_condition_counts_before_the_condition_runs() {
    let fx = Fixture::new();
    let session = fx.session();
    let (id, request) = line_breakpoint(&session, main_line(10).hit_condition(">= 3"));

    assert!(!session.should_stop(hit(&fx, request)));
    assert!(!session.should_stop(hit(&fx, request)));
    assert!(session.should_stop(hit(&fx, request)));
    assert!(session.should_stop(hit(&fx, request)));
    assert_eq!(session.registry().get(id).unwrap().hit_count, 4);
}

#[test]
fn every_nth_hit_with_a_condition() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, request) = line_breakpoint(
        &session,
        main_line(10).hit_condition("% 2").condition("x > 5"),
    );

    assert!(!session.should_stop(hit(&fx, request)));
    assert!(session.should_stop(hit(&fx, request)));
    fx.set_x(1);
    assert!(!session.should_stop(hit(&fx, request)));
    assert!(!session.should_stop(hit(&fx, request)));
}

#[test]
fn disabled_breakpoints_neither_stop_nor_count() {
    let fx = Fixture::new();
    let session = fx.session();
    let (id, request) = line_breakpoint(&session, main_line(10));
    session.set_breakpoint_enabled(id, false).unwrap();

    assert!(!session.should_stop(hit(&fx, request)));
    assert_eq!(session.registry().get(id).unwrap().hit_count, 0);
}

#[test]
fn unknown_requests_continue() {
    let fx = Fixture::new();
    let session = fx.session();
    assert!(!session.should_stop(hit(&fx, 4242)));

    let (id, request) = line_breakpoint(&session, main_line(10));
    session.remove_breakpoint(id);
    assert!(!session.should_stop(hit(&fx, request)));
}

#[test]
fn logpoints_emit_output_and_resume() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, request) = line_breakpoint(
        &session,
        main_line(10).log_message("x is $x, next ${x + 1}"),
    );
    let location = fx.vm.request(request).unwrap().location;
    fx.set_x(3);

    let emitted = session.handle_event(&VmEvent::BreakpointHit {
        request_id: request,
        thread: fx.thread,
        location,
    });
    assert_eq!(
        emitted,
        vec![SessionEvent::Output {
            text: "x is 3, next 4".to_string()
        }]
    );
    assert!(!fx.vm.is_suspended(fx.thread));
}

#[test]
fn logpoint_with_bad_expression_reports_the_error() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, request) = line_breakpoint(&session, main_line(10).log_message("value: $missing"));
    let location = fx.vm.request(request).unwrap().location;

    let emitted = session.handle_event(&VmEvent::BreakpointHit {
        request_id: request,
        thread: fx.thread,
        location,
    });
    let [SessionEvent::Output { text }] = emitted.as_slice() else {
        panic!("expected one output event, got {emitted:?}");
    };
    assert!(text.starts_with("Error:"), "{text}");
}

#[test]
fn stopping_hit_reports_the_breakpoint_and_keeps_the_thread_suspended() {
    let fx = Fixture::new();
    let session = fx.session();
    let (id, request) = line_breakpoint(&session, main_line(10).condition("x == 10"));
    let location = fx.vm.request(request).unwrap().location;

    let emitted = session.handle_event(&VmEvent::BreakpointHit {
        request_id: request,
        thread: fx.thread,
        location,
    });
    assert_eq!(
        emitted,
        vec![SessionEvent::Stopped {
            thread: fx.thread,
            reason: StopReason::Breakpoint { breakpoint: id },
        }]
    );
    assert!(fx.vm.is_suspended(fx.thread));
}

#[test]
fn skipped_hit_resumes_the_thread() {
    let fx = Fixture::new();
    let session = fx.session();
    let (_, request) = line_breakpoint(&session, main_line(10).condition("x < 0"));
    let location = fx.vm.request(request).unwrap().location;

    let emitted = session.handle_event(&VmEvent::BreakpointHit {
        request_id: request,
        thread: fx.thread,
        location,
    });
    assert!(emitted.is_empty());
    assert!(!fx.vm.is_suspended(fx.thread));
}
