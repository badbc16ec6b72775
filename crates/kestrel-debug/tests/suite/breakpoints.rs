use kestrel_config::{BreakpointsConfig, DebuggerConfig, MethodOverloadPolicy};
use kestrel_debug::{BreakpointKind, BreakpointSpec, DebugError, MethodTarget, ResolutionState};
use kestrel_remote::{MockMethod, MockType, RemoteVm};
use pretty_assertions::assert_eq;

use super::support::Fixture;

fn late_type(fx: &Fixture) -> kestrel_remote::TypeId {
    fx.vm.define_type(
        MockType::new("com.example.Late")
            .source("com/example/Late.kt")
            .lines(1..=20)
            .method(MockMethod::new("work", &[], "void")),
    )
}

#[test]
fn line_breakpoint_on_loaded_type_resolves_immediately() {
    let fx = Fixture::new();
    let session = fx.session();

    let bp = session
        .add_line_breakpoint("com/example/Main.java", 12, None)
        .unwrap();
    assert_eq!(bp.state, ResolutionState::Resolved);
    assert_eq!(bp.requests.len(), 1);

    let request = fx.vm.request(bp.requests[0]).unwrap();
    assert_eq!(request.location.type_id, fx.main);
    assert_eq!(request.location.line, 12);
    assert!(session.registry().pending_for_file("Main.java").is_empty());
}

#[test]
fn pending_line_breakpoint_resolves_on_type_load() {
    let fx = Fixture::new();
    let session = fx.session();
    let late = late_type(&fx);

    let bp = session.add_line_breakpoint("Late.kt", 5, None).unwrap();
    assert_eq!(bp.state, ResolutionState::Pending);
    assert!(bp.requests.is_empty());
    assert_eq!(session.registry().pending_for_file("Late.kt").len(), 1);

    fx.vm.load_type(late);
    assert_eq!(session.on_type_loaded(late), vec![bp.id]);

    let resolved = session.registry().get(bp.id).unwrap();
    assert_eq!(resolved.state, ResolutionState::Resolved);
    assert_eq!(resolved.requests.len(), 1);
    assert!(session.registry().pending_for_file("Late.kt").is_empty());

    // A duplicate notification attaches nothing new.
    assert!(session.on_type_loaded(late).is_empty());
    assert_eq!(fx.vm.requests().len(), 1);
}

#[test]
fn line_without_code_stays_pending() {
    let fx = Fixture::new();
    let session = fx.session();

    let bp = session
        .add_line_breakpoint("com/example/Main.java", 99, None)
        .unwrap();
    assert_eq!(bp.state, ResolutionState::Pending);
    assert!(fx.vm.requests().is_empty());
    assert_eq!(
        session.registry().pending_for_file("Main.java")[0].line,
        99
    );
}

#[test]
fn partially_resolved_breakpoint_keeps_watching_its_file() {
    let fx = Fixture::new();
    fx.vm.add_type(
        MockType::new("com.example.Main$Helper")
            .source("com/example/Main.java")
            .lines(40..=45),
    );
    let session = fx.session();

    let bp = session
        .add_line_breakpoint("com/example/Main.java", 12, None)
        .unwrap();
    assert_eq!(bp.state, ResolutionState::PartiallyResolved);
    assert_eq!(bp.requests.len(), 1);

    let nested = fx.vm.define_type(
        MockType::new("com.example.Main$1")
            .source("com/example/Main.java")
            .lines(12..=14),
    );
    fx.vm.load_type(nested);
    assert_eq!(session.on_type_loaded(nested), vec![bp.id]);

    let after = session.registry().get(bp.id).unwrap();
    assert_eq!(after.state, ResolutionState::PartiallyResolved);
    assert_eq!(after.requests.len(), 2);
    assert_eq!(session.registry().pending_for_file("Main.java").len(), 1);
}

#[test]
fn removal_before_load_leaves_nothing_behind() {
    let fx = Fixture::new();
    let session = fx.session();
    let late = late_type(&fx);

    let bp = session.add_line_breakpoint("Late.kt", 5, None).unwrap();
    assert!(session.remove_breakpoint(bp.id));
    assert!(!session.remove_breakpoint(bp.id));

    fx.vm.load_type(late);
    assert!(session.on_type_loaded(late).is_empty());
    assert!(fx.vm.requests().is_empty());
    assert!(session.breakpoints().is_empty());
    assert!(session.registry().pending_for_file("Late.kt").is_empty());
}

#[test]
fn removal_deletes_attached_requests() {
    let fx = Fixture::new();
    let session = fx.session();

    let bp = session
        .add_line_breakpoint("com/example/Main.java", 12, None)
        .unwrap();
    assert_eq!(fx.vm.requests().len(), 1);
    assert!(session.remove_breakpoint(bp.id));
    assert!(fx.vm.requests().is_empty());
    assert_eq!(session.registry().breakpoint_for_request(bp.requests[0]), None);
}

#[test]
fn method_breakpoint_without_signature_attaches_every_overload() {
    let fx = Fixture::new();
    let session = fx.session();

    let bp = session
        .add_method_breakpoint("com.example.Main", "f", None)
        .unwrap();
    assert_eq!(bp.state, ResolutionState::Resolved);
    assert_eq!(bp.requests.len(), 2);

    let methods: Vec<_> = bp
        .requests
        .iter()
        .map(|id| fx.vm.request(*id).unwrap().location.method_id)
        .collect();
    assert!(methods.contains(&fx.vm.method_id(fx.main, "f", &["int"]).unwrap()));
    assert!(methods.contains(&fx.vm.method_id(fx.main, "f", &["long"]).unwrap()));
}

#[test]
fn method_breakpoint_with_signature_attaches_one_overload() {
    let fx = Fixture::new();
    let session = fx.session();

    let target = MethodTarget::new("com.example.Main", "f").with_signature(["long"]);
    let bp = session.add_breakpoint(BreakpointSpec::method(target)).unwrap();
    assert_eq!(bp.requests.len(), 1);
    assert_eq!(
        fx.vm.request(bp.requests[0]).unwrap().location.method_id,
        fx.vm.method_id(fx.main, "f", &["long"]).unwrap()
    );
}

#[test]
fn require_signature_policy_rejects_bare_method_breakpoints() {
    let fx = Fixture::new();
    let session = fx.session_with(DebuggerConfig {
        breakpoints: BreakpointsConfig {
            method_overloads: MethodOverloadPolicy::RequireSignature,
            ..BreakpointsConfig::default()
        },
        ..DebuggerConfig::default()
    });

    let err = session
        .add_method_breakpoint("com.example.Main", "f", None)
        .unwrap_err();
    assert!(matches!(err, DebugError::MissingSignature { .. }), "{err:?}");

    let target = MethodTarget::new("com.example.Main", "f").with_signature(["int"]);
    assert!(session.add_breakpoint(BreakpointSpec::method(target)).is_ok());
}

#[test]
fn pending_method_breakpoint_resolves_when_its_type_loads() {
    let fx = Fixture::new();
    let session = fx.session();
    let late = late_type(&fx);

    let bp = session
        .add_method_breakpoint("com.example.Late", "work", None)
        .unwrap();
    assert_eq!(bp.state, ResolutionState::Pending);

    fx.vm.load_type(late);
    assert_eq!(session.on_type_loaded(late), vec![bp.id]);
    let resolved = session.registry().get(bp.id).unwrap();
    assert_eq!(resolved.state, ResolutionState::Resolved);
    assert_eq!(resolved.requests.len(), 1);
}

#[test]
fn disabling_toggles_requests_and_survives_resolution() {
    let fx = Fixture::new();
    let session = fx.session();

    let bp = session
        .add_line_breakpoint("com/example/Main.java", 12, None)
        .unwrap();
    session.set_breakpoint_enabled(bp.id, false).unwrap();
    assert!(!fx.vm.request(bp.requests[0]).unwrap().enabled);
    session.set_breakpoint_enabled(bp.id, true).unwrap();
    assert!(fx.vm.request(bp.requests[0]).unwrap().enabled);

    let late = late_type(&fx);
    let pending = session
        .add_breakpoint(BreakpointSpec::line("Late.kt", 3).disabled())
        .unwrap();
    fx.vm.load_type(late);
    session.on_type_loaded(late);
    let resolved = session.registry().get(pending.id).unwrap();
    assert!(!resolved.enabled);
    assert!(!fx.vm.request(resolved.requests[0]).unwrap().enabled);

    assert!(matches!(
        session.set_breakpoint_enabled(999, true),
        Err(DebugError::UnknownBreakpoint(999))
    ));
}

#[test]
fn invalid_definitions_are_rejected() {
    let fx = Fixture::new();
    let session = fx.session();

    assert!(matches!(
        session.add_line_breakpoint("Main.java", 0, None),
        Err(DebugError::InvalidLine)
    ));
    assert!(matches!(
        session.add_breakpoint(BreakpointSpec::line("Main.java", 3).hit_condition("% 0")),
        Err(DebugError::InvalidHitCondition(_))
    ));
    assert!(session.breakpoints().is_empty());
}

#[test]
fn one_type_load_subscription_per_session() {
    let fx = Fixture::new();
    let session = fx.session();
    assert_eq!(fx.vm.type_load_subscriptions(), 0);

    session.add_line_breakpoint("Late.kt", 1, None).unwrap();
    session.add_line_breakpoint("Other.kt", 2, None).unwrap();
    session
        .add_method_breakpoint("com.example.Late", "work", None)
        .unwrap();
    assert_eq!(fx.vm.type_load_subscriptions(), 1);
}

#[test]
fn breakpoints_are_listed_in_id_order_and_serialize() {
    let fx = Fixture::new();
    let session = fx.session();
    let a = session
        .add_line_breakpoint("com/example/Main.java", 12, Some("x > 5"))
        .unwrap();
    let b = session
        .add_method_breakpoint("com.example.Main", "run", None)
        .unwrap();

    let ids: Vec<_> = session.breakpoints().iter().map(|bp| bp.id).collect();
    assert_eq!(ids, vec![a.id, b.id]);
    assert!(matches!(a.kind, BreakpointKind::Line { line: 12, .. }));

    let json = serde_json::to_value(&a).unwrap();
    assert_eq!(json["kind"]["kind"], "line");
    assert_eq!(json["condition"], "x > 5");
    assert_eq!(json["state"], "resolved");
}

#[test]
fn rescan_catches_types_whose_notification_was_missed() {
    let fx = Fixture::new();
    let session = fx.session();
    let late = late_type(&fx);
    let bp = session.add_line_breakpoint("Late.kt", 4, None).unwrap();

    // Loaded without anyone handling the notification.
    fx.vm.load_type(late);
    assert_eq!(fx.vm.list_loaded_types(Some("com.example.Late")).unwrap(), vec![late]);
    assert_eq!(session.registry().rescan(), vec![bp.id]);
    assert_eq!(
        session.registry().get(bp.id).unwrap().state,
        ResolutionState::Resolved
    );
}
