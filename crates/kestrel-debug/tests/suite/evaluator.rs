use kestrel_config::EvaluationConfig;
use kestrel_debug::{EvalError, Evaluator, ExpressionError, FrameContext, RangeValue, Value};
use kestrel_expr::SyntaxError;
use kestrel_remote::{MockFrame, MockMethod, MockType, RemoteError, RemoteValue};
use pretty_assertions::assert_eq;

use super::support::Fixture;

fn eval(fx: &Fixture, text: &str) -> Result<Value, ExpressionError> {
    eval_with(fx, &EvaluationConfig::default(), text)
}

fn eval_with(fx: &Fixture, config: &EvaluationConfig, text: &str) -> Result<Value, ExpressionError> {
    Evaluator::new(fx.vm.as_ref(), fx.ctx(), config).evaluate_text(text)
}

fn eval_err(fx: &Fixture, text: &str) -> EvalError {
    match eval(fx, text) {
        Err(ExpressionError::Eval(err)) => err,
        other => panic!("expected an evaluation error for {text:?}, got {other:?}"),
    }
}

/// `com.example.Holder` with static overload sets; each overload returns its
/// own parameter kind so the test can see which one was taken.
fn overload_holder(fx: &Fixture) {
    let overload = |name: &str, param: &str, picked: &str| {
        MockMethod::new(name, &[param], "java.lang.String")
            .make_static()
            .returns(fx.vm.new_string(picked))
    };
    fx.vm.add_type(
        MockType::new("com.example.Holder")
            .method(
                MockMethod::new("g", &["int"], "int")
                    .make_static()
                    .computes(|args| match args {
                        [RemoteValue::Int(v)] => RemoteValue::Int(v + 1),
                        _ => RemoteValue::Void,
                    }),
            )
            .method(overload("unbox", "long", "long"))
            .method(overload("unbox", "int", "int"))
            .method(overload("pick", "java.lang.Object", "object"))
            .method(overload("pick", "java.lang.Number", "number"))
            .method(overload("seq", "java.lang.Object", "object"))
            .method(overload("seq", "java.lang.CharSequence", "chars"))
            .method(overload("wide", "java.lang.Integer", "boxed"))
            .method(overload("wide", "long", "widened"))
            .method(overload("boxpick", "java.lang.Object", "object"))
            .method(overload("boxpick", "java.lang.Integer", "integer")),
    );
}

fn text(value: Value) -> String {
    match value {
        Value::Str(s) => s.text,
        other => panic!("expected a string, got {other:?}"),
    }
}

#[test]
fn arithmetic_follows_precedence_and_promotion() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "1 + 2 * 3").unwrap(), Value::Int(7));
    assert_eq!(eval(&fx, "(1 + 2) * 3").unwrap(), Value::Int(9));
    assert_eq!(eval(&fx, "7 / 2").unwrap(), Value::Int(3));
    assert_eq!(eval(&fx, "7 % 3").unwrap(), Value::Int(1));
    assert_eq!(eval(&fx, "1 + 2L").unwrap(), Value::Long(3));
    assert_eq!(eval(&fx, "1 + 0.5f").unwrap(), Value::Float(1.5));
    assert_eq!(eval(&fx, "2L * 1.5").unwrap(), Value::Double(3.0));
    assert_eq!(eval(&fx, "-x").unwrap(), Value::Int(-10));
    assert_eq!(eval(&fx, "2147483647 + 1").unwrap(), Value::Int(i32::MIN));
}

#[test]
fn integral_division_by_zero_fails_but_floating_does_not() {
    let fx = Fixture::new();
    assert_eq!(eval_err(&fx, "5 / 0"), EvalError::DivisionByZero);
    assert_eq!(eval_err(&fx, "5L % 0"), EvalError::DivisionByZero);
    assert_eq!(eval(&fx, "5.0 / 0").unwrap(), Value::Double(f64::INFINITY));
}

#[test]
fn bit_operations_and_shifts() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "6 and 3").unwrap(), Value::Int(2));
    assert_eq!(eval(&fx, "6 or 3").unwrap(), Value::Int(7));
    assert_eq!(eval(&fx, "6 xor 3").unwrap(), Value::Int(5));
    assert_eq!(eval(&fx, "1 shl 4").unwrap(), Value::Int(16));
    assert_eq!(eval(&fx, "-16 shr 2").unwrap(), Value::Int(-4));
    assert_eq!(eval(&fx, "-1 ushr 28").unwrap(), Value::Int(15));
    assert_eq!(eval(&fx, "~0").unwrap(), Value::Int(-1));
}

#[test]
fn logical_operators_short_circuit() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "false && explode()").unwrap(), Value::Boolean(false));
    assert_eq!(eval(&fx, "true || explode()").unwrap(), Value::Boolean(true));
    assert_eq!(fx.vm.invocation_count("explode"), 0);

    assert!(matches!(
        eval_err(&fx, "true && explode()"),
        EvalError::RemoteInvocationFailed(ty) if ty == "java.lang.IllegalStateException"
    ));
    assert_eq!(fx.vm.invocation_count("explode"), 1);
}

#[test]
fn elvis_only_evaluates_right_side_for_null() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "null ?: 5").unwrap(), Value::Int(5));
    assert_eq!(eval(&fx, "3 ?: 5").unwrap(), Value::Int(3));
    assert_eq!(eval(&fx, "x ?: explode()").unwrap(), Value::Int(10));
    assert_eq!(fx.vm.invocation_count("explode"), 0);
}

#[test]
fn safe_calls_short_circuit_and_plain_access_on_null_fails() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "null?.length").unwrap(), Value::Null);
    assert_eq!(eval(&fx, "nothing?.hashCode()").unwrap(), Value::Null);
    assert_eq!(eval_err(&fx, "null.length"), EvalError::NullReceiver("length".into()));
    assert_eq!(fx.vm.invocations().len(), 0);
}

#[test]
fn identifiers_resolve_locals_then_fields_then_statics() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "x").unwrap(), Value::Int(10));
    assert_eq!(eval(&fx, "count").unwrap(), Value::Int(7));
    assert_eq!(eval(&fx, "name").unwrap(), Value::Null);
    assert_eq!(eval(&fx, "LIMIT").unwrap(), Value::Int(100));
    assert_eq!(eval(&fx, "this").unwrap(), Value::Object(fx.this));
    assert_eq!(eval(&fx, "this.count + x").unwrap(), Value::Int(17));
    assert_eq!(eval_err(&fx, "missing"), EvalError::NameNotFound("missing".into()));
}

#[test]
fn locals_shadow_fields() {
    let fx = Fixture::new();
    let thread = fx.vm.add_thread();
    let frame = fx.vm.push_frame(
        thread,
        MockFrame::new(fx.main)
            .this(fx.this)
            .local("count", "int", RemoteValue::Int(1)),
    );
    let config = EvaluationConfig::default();
    let evaluator = Evaluator::new(
        fx.vm.as_ref(),
        FrameContext { thread, frame },
        &config,
    );
    assert_eq!(evaluator.evaluate_text("count").unwrap(), Value::Int(1));
    assert_eq!(evaluator.evaluate_text("this.count").unwrap(), Value::Int(7));
}

#[test]
fn overload_resolution_prefers_exact_match() {
    let fx = Fixture::new();
    assert_eq!(text(eval(&fx, "f(5)").unwrap()), "int");
    assert_eq!(text(eval(&fx, "f(5L)").unwrap()), "long");

    // Equal widening cost: the first declared overload wins.
    assert_eq!(text(eval(&fx, "f(x.toShort())").unwrap()), "int");
    assert!(matches!(eval_err(&fx, "f(\"five\")"), EvalError::MethodNotFound(_)));
}

#[test]
fn boxed_locals_behave_like_their_primitive() {
    let fx = Fixture::new();
    let ctx = fx.push_boxed_frame();
    let config = EvaluationConfig::default();
    let evaluator = Evaluator::new(fx.vm.as_ref(), ctx, &config);
    let run = |source: &str| evaluator.evaluate_text(source).unwrap();

    assert_eq!(run("boxed > 3"), Value::Boolean(true));
    assert_eq!(run("boxed + 1"), Value::Int(6));
    assert_eq!(run("boxed * 2L"), Value::Long(10));
    assert_eq!(run("boxed == 5"), Value::Boolean(true));
    assert_eq!(run("-boxed"), Value::Int(-5));
    assert_eq!(run("boxed in 1..10"), Value::Boolean(true));
    assert_eq!(run("!flag"), Value::Boolean(true));
    assert_eq!(text(run("\"n=$boxed\"")), "n=5");
}

#[test]
fn boxed_arguments_unbox_into_primitive_parameters() {
    let fx = Fixture::new();
    let ctx = fx.push_boxed_frame();
    overload_holder(&fx);
    let config = EvaluationConfig::default();
    let evaluator = Evaluator::new(fx.vm.as_ref(), ctx, &config);
    let run = |source: &str| evaluator.evaluate_text(source).unwrap();

    assert_eq!(run("Holder.g(boxed)"), Value::Int(6));
    // Plain unboxing ranks above unboxing followed by widening.
    assert_eq!(text(run("Holder.unbox(boxed)")), "int");
}

#[test]
fn closer_supertypes_win_over_object() {
    let fx = Fixture::new();
    let ctx = fx.push_boxed_frame();
    overload_holder(&fx);
    let config = EvaluationConfig::default();
    let evaluator = Evaluator::new(fx.vm.as_ref(), ctx, &config);
    let run = |source: &str| evaluator.evaluate_text(source).unwrap();

    // The Object overloads are declared first and still lose.
    assert_eq!(text(run("Holder.pick(boxed)")), "number");
    assert_eq!(text(run("Holder.seq(\"abc\")")), "chars");
}

#[test]
fn widening_beats_boxing_and_boxing_prefers_the_box_type() {
    let fx = Fixture::new();
    fx.push_boxed_frame();
    overload_holder(&fx);

    assert_eq!(text(eval(&fx, "Holder.wide(5)").unwrap()), "widened");
    assert_eq!(text(eval(&fx, "Holder.boxpick(5)").unwrap()), "integer");

    let call = fx.vm.invocations().pop().unwrap();
    assert_eq!(call.method_name, "boxpick");
    assert!(matches!(call.args.as_slice(), [RemoteValue::Object(_)]), "{call:?}");
    assert_eq!(fx.vm.invocation_count("valueOf"), 1);
}

#[test]
fn ambiguous_simple_type_names_are_reported() {
    let fx = Fixture::new();
    fx.vm.add_type(MockType::new("com.other.Main"));
    assert!(matches!(
        eval_err(&fx, "Main.twice(1)"),
        EvalError::AmbiguousType { name, candidates }
            if name == "Main" && candidates.contains("com.other.Main")
    ));
}

#[test]
fn static_calls_on_type_names() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "Main.twice(21)").unwrap(), Value::Int(42));
    assert_eq!(eval(&fx, "com.example.Main.twice(2)").unwrap(), Value::Int(4));
    assert_eq!(eval(&fx, "Main.LIMIT").unwrap(), Value::Int(100));
    assert_eq!(eval(&fx, "twice(4)").unwrap(), Value::Int(8));
}

#[test]
fn kotlin_style_getters() {
    let fx = Fixture::new();
    assert_eq!(text(eval(&fx, "this.label").unwrap()), "main");
    assert_eq!(eval(&fx, "this.ready").unwrap(), Value::Boolean(true));
    assert_eq!(eval_err(&fx, "this.nope"), EvalError::NameNotFound("nope".into()));
}

#[test]
fn string_operations() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "s.length").unwrap(), Value::Int(5));
    assert_eq!(text(eval(&fx, "s + 1").unwrap()), "hello1");
    assert_eq!(text(eval(&fx, "1.5 + \"!\"").unwrap()), "1.5!");
    assert_eq!(eval(&fx, "s == \"hello\"").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "\"abc\" < \"abd\"").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "s[1]").unwrap(), Value::Char('e'));
    assert_eq!(eval(&fx, "'e' in s").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "\"ell\" !in s").unwrap(), Value::Boolean(false));
    assert_eq!(eval(&fx, "s.isEmpty()").unwrap(), Value::Boolean(false));
}

#[test]
fn templates_interpolate_variables_and_expressions() {
    let fx = Fixture::new();
    assert_eq!(text(eval(&fx, "\"Sum: ${1+2}\"").unwrap()), "Sum: 3");
    assert_eq!(text(eval(&fx, "\"x=$x, s=$s\"").unwrap()), "x=10, s=hello");
    assert_eq!(text(eval(&fx, "\"cost: \\$5\"").unwrap()), "cost: $5");

    let this = text(eval(&fx, "\"$this\"").unwrap());
    assert!(this.starts_with("Main@"), "{this}");
    assert_eq!(text(eval(&fx, "\"${this}\"").unwrap()), this);
    assert!(matches!(
        eval_err(&fx, "\"bad ${1 +}\""),
        EvalError::Syntax(SyntaxError::Parse { .. })
    ));
}

#[test]
fn arrays_are_indexed_with_bounds_checks() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "arr[1]").unwrap(), Value::Int(20));
    assert_eq!(eval(&fx, "arr.size").unwrap(), Value::Int(3));
    assert_eq!(eval(&fx, "arr.length").unwrap(), Value::Int(3));
    assert_eq!(
        eval_err(&fx, "arr[5]"),
        EvalError::IndexOutOfBounds {
            index: 5,
            length: 3
        }
    );
    assert_eq!(eval(&fx, "20 in arr").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "21 in arr").unwrap(), Value::Boolean(false));
}

#[test]
fn type_checks_walk_the_hierarchy() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "s is String").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "s is CharSequence").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "x is Int").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "x is Number").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "x !is String").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "this is Main").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "this is Any").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "nothing is String").unwrap(), Value::Boolean(false));
    assert_eq!(eval(&fx, "nothing is String?").unwrap(), Value::Boolean(true));
}

#[test]
fn casts_convert_primitives_and_check_references() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "x as Long").unwrap(), Value::Long(10));
    assert_eq!(eval(&fx, "3.9 as Int").unwrap(), Value::Int(3));
    assert_eq!(eval(&fx, "s as? Int").unwrap(), Value::Null);
    assert!(matches!(eval_err(&fx, "s as Int"), EvalError::TypeMismatch(_)));
    assert_eq!(eval(&fx, "this as Main").unwrap(), Value::Object(fx.this));
}

#[test]
fn ranges_and_membership() {
    let fx = Fixture::new();
    assert_eq!(
        eval(&fx, "1..9 step 2").unwrap(),
        Value::Range(RangeValue {
            first: 1,
            last: 9,
            step: 2,
            long: false
        })
    );
    assert_eq!(eval(&fx, "5 in 1..10").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "10 in 1 until 10").unwrap(), Value::Boolean(false));
    assert_eq!(eval(&fx, "3 in 10 downTo 1").unwrap(), Value::Boolean(true));
    assert_eq!(eval(&fx, "4 in 1..9 step 2").unwrap(), Value::Boolean(false));
    assert!(matches!(eval_err(&fx, "1..5 step 0"), EvalError::TypeMismatch(_)));

    let full = "(-9223372036854775807L - 1)..9223372036854775807L";
    assert_eq!(eval(&fx, &format!("5 in {full}")).unwrap(), Value::Boolean(true));
    assert_eq!(
        eval(&fx, &format!("9223372036854775807L in {full}")).unwrap(),
        Value::Boolean(true)
    );
}

#[test]
fn conditionals_and_lambdas() {
    let fx = Fixture::new();
    assert_eq!(eval(&fx, "if (x > 5) 1 else 2").unwrap(), Value::Int(1));
    assert_eq!(eval(&fx, "x > 5 ? 1 : 2").unwrap(), Value::Int(1));
    assert!(matches!(eval_err(&fx, "if (x) 1 else 2"), EvalError::TypeMismatch(_)));
    assert_eq!(
        eval(&fx, "{ a -> a + 1 }").unwrap(),
        Value::Placeholder("<lambda>".into())
    );
}

#[test]
fn constructors_create_objects() {
    let fx = Fixture::new();
    let point = eval(&fx, "Point(1, 2)").unwrap();
    assert!(matches!(point, Value::Object(_)));
    assert_eq!(fx.vm.invocation_count("<init>"), 1);
    assert!(matches!(eval_err(&fx, "Point(1)"), EvalError::MethodNotFound(_)));
}

#[test]
fn invocation_can_be_disabled() {
    let fx = Fixture::new();
    let config = EvaluationConfig {
        allow_method_invocation: false,
        ..EvaluationConfig::default()
    };
    assert!(matches!(
        eval_with(&fx, &config, "f(1)"),
        Err(ExpressionError::Eval(EvalError::Unsupported(_)))
    ));
    assert_eq!(eval_with(&fx, &config, "x + 1").unwrap(), Value::Int(11));
    assert!(fx.vm.invocations().is_empty());
}

#[test]
fn syntax_errors_surface_as_expression_errors() {
    let fx = Fixture::new();
    assert!(matches!(
        eval(&fx, "x = 5"),
        Err(ExpressionError::Syntax(SyntaxError::Parse { .. }))
    ));
    assert!(matches!(
        eval(&fx, "\"open"),
        Err(ExpressionError::Syntax(SyntaxError::Lex { .. }))
    ));
    assert!(matches!(
        eval(&fx, "x >>> 5"),
        Err(ExpressionError::Syntax(_))
    ));
}

#[test]
fn stale_handles_degrade_to_errors() {
    let fx = Fixture::new();
    fx.vm.collect(fx.this);
    assert_eq!(
        eval_err(&fx, "count"),
        EvalError::Remote(RemoteError::InvalidObject(fx.this))
    );

    fx.vm.disconnect();
    assert_eq!(eval_err(&fx, "x"), EvalError::Remote(RemoteError::Disconnected));
}
