//! Tree-walking evaluator over a suspended frame of the target process.
//!
//! Identifiers resolve in this order: `this`, visible locals, fields of
//! `this`, static fields of the declaring type (and its superclasses). Names
//! that fail to resolve and look like types (`Math`, `java.util.List`) are
//! retried as static receivers.

mod display;
pub(crate) mod types;
mod value;

use std::cell::OnceCell;
use std::cmp::Ordering;
use std::collections::{HashSet, VecDeque};

use kestrel_config::EvaluationConfig;
use kestrel_expr::{
    parse_expression, BinaryOp, Expr, Literal, RangeKind, TemplatePart, TypeRef, UnaryOp,
};
use kestrel_remote::{
    FrameId, InvokeTarget, MethodInfo, ObjectId, RemoteValue, RemoteVm, ThreadId, TypeId,
};

pub use display::{array_display, format_double, format_float, identity_display, truncate_display};
pub use value::{RangeValue, StringValue, Value};

use crate::error::{EvalError, ExpressionError};
use types::{OBJECT, STRING, STRING_SUPERTYPES};
use value::NumKind;

type Result<T> = std::result::Result<T, EvalError>;

const LAMBDA_PLACEHOLDER: &str = "<lambda>";

/// The frame an expression is evaluated against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameContext {
    pub thread: ThreadId,
    pub frame: FrameId,
}

impl FrameContext {
    /// Topmost frame of a suspended thread, `None` when it has no frames.
    pub fn top_of(
        vm: &dyn RemoteVm,
        thread: ThreadId,
    ) -> std::result::Result<Option<Self>, kestrel_remote::RemoteError> {
        Ok(vm.frames(thread)?.first().map(|frame| Self {
            thread,
            frame: frame.id,
        }))
    }
}

enum Receiver {
    Value(Value),
    Type(TypeId),
}

pub struct Evaluator<'a> {
    vm: &'a dyn RemoteVm,
    frame: FrameContext,
    config: &'a EvaluationConfig,
    this: OnceCell<Option<ObjectId>>,
}

impl<'a> Evaluator<'a> {
    pub fn new(vm: &'a dyn RemoteVm, frame: FrameContext, config: &'a EvaluationConfig) -> Self {
        Self {
            vm,
            frame,
            config,
            this: OnceCell::new(),
        }
    }

    /// Parse and evaluate `text` in one go.
    pub fn evaluate_text(&self, text: &str) -> std::result::Result<Value, ExpressionError> {
        let expr = parse_expression(text)?;
        Ok(self.evaluate(&expr)?)
    }

    pub fn evaluate(&self, expr: &Expr) -> Result<Value> {
        match expr {
            Expr::Literal(lit) => Ok(literal_value(lit)),
            Expr::Identifier(name) => self.resolve_identifier(name),
            Expr::This => self.this_value(),
            Expr::Unary { op, operand } => {
                let operand = self.evaluate(operand)?;
                unary(*op, self.unboxed(operand)?)
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
            } => {
                let value = self.eval_bool(left, "&&")? && self.eval_bool(right, "&&")?;
                Ok(Value::Boolean(value))
            }
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
            } => {
                let value = self.eval_bool(left, "||")? || self.eval_bool(right, "||")?;
                Ok(Value::Boolean(value))
            }
            Expr::Binary { op, left, right } => {
                let left = self.evaluate(left)?;
                let right = self.evaluate(right)?;
                self.binary(*op, left, right)
            }
            Expr::MemberAccess { target, name, safe } => self.member_access(target, name, *safe),
            Expr::ArrayAccess { target, index } => self.index(target, index),
            Expr::MethodCall {
                receiver,
                name,
                args,
                safe,
            } => self.call(receiver.as_deref(), name, args, *safe),
            Expr::TypeCheck { expr, ty, negated } => {
                let value = self.evaluate(expr)?;
                Ok(Value::Boolean(self.is_instance(&value, ty)? != *negated))
            }
            Expr::TypeCast { expr, ty, safe } => {
                let value = self.evaluate(expr)?;
                self.cast(value, ty, *safe)
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
            } => {
                if self.eval_bool(cond, "if")? {
                    self.evaluate(then_expr)
                } else {
                    self.evaluate(else_expr)
                }
            }
            Expr::Construct { ty, args } => self.construct(ty, args),
            Expr::Elvis { left, right } => {
                let left = self.evaluate(left)?;
                if left.is_null() {
                    self.evaluate(right)
                } else {
                    Ok(left)
                }
            }
            Expr::StringTemplate(parts) => self.template(parts).map(Value::str),
            Expr::Range {
                start,
                end,
                kind,
                step,
            } => self.range(start, end, *kind, step.as_deref()),
            Expr::Contains {
                element,
                collection,
                negated,
            } => {
                let element = self.evaluate(element)?;
                let collection = self.evaluate(collection)?;
                Ok(Value::Boolean(self.contains(&collection, &element)? != *negated))
            }
            Expr::Lambda { .. } => Ok(Value::Placeholder(LAMBDA_PLACEHOLDER.to_string())),
            Expr::Spread(_) => Err(EvalError::Unsupported(
                "spread operator outside of call arguments".to_string(),
            )),
        }
    }

    fn eval_bool(&self, expr: &Expr, context: &str) -> Result<bool> {
        let value = self.evaluate(expr)?;
        match self.unboxed(value)? {
            Value::Boolean(b) => Ok(b),
            other => Err(EvalError::TypeMismatch(format!(
                "`{context}` expects a boolean, found {}",
                self.type_name_of(&other)
            ))),
        }
    }

    fn this_object(&self) -> Result<Option<ObjectId>> {
        if let Some(this) = self.this.get() {
            return Ok(*this);
        }
        let this = self.vm.frame_this(self.frame.thread, self.frame.frame)?;
        let _ = self.this.set(this);
        Ok(this)
    }

    fn this_value(&self) -> Result<Value> {
        self.this_object()?
            .map(Value::Object)
            .ok_or_else(|| EvalError::NameNotFound("this".to_string()))
    }

    fn resolve_identifier(&self, name: &str) -> Result<Value> {
        if name == "this" {
            return self.this_value();
        }
        let FrameContext { thread, frame } = self.frame;

        let locals = self.vm.visible_variables(thread, frame)?;
        if locals.iter().any(|local| local.name == name) {
            let value = self.vm.variable_value(thread, frame, name)?;
            return self.from_remote(value);
        }

        if let Some(this) = self.this_object()? {
            if let Some(value) = self.vm.get_field(this, name)? {
                return self.from_remote(value);
            }
        }

        let declaring = self.vm.frame_declaring_type(thread, frame)?;
        if let Some(value) = self.static_field(declaring, name)? {
            return self.from_remote(value);
        }

        Err(EvalError::NameNotFound(name.to_string()))
    }

    fn static_field(&self, type_id: TypeId, name: &str) -> Result<Option<RemoteValue>> {
        let mut current = Some(type_id);
        while let Some(ty) = current {
            if let Some(value) = self.vm.get_static_field(ty, name)? {
                return Ok(Some(value));
            }
            current = self.vm.superclass(ty)?;
        }
        Ok(None)
    }

    /// Find a loaded type by the name a user typed.
    fn find_type(&self, name: &str) -> Result<Option<TypeId>> {
        let canonical = types::canonical_type_name(name);
        if types::is_primitive(canonical) {
            return Ok(None);
        }

        let mut candidates = vec![canonical.to_string()];
        if canonical.contains('.') {
            // `Outer.Inner` is `Outer$Inner` in the target.
            if let Some((outer, inner)) = canonical.rsplit_once('.') {
                candidates.push(format!("{outer}${inner}"));
            }
        } else {
            candidates.push(format!("java.lang.{canonical}"));
        }
        for candidate in &candidates {
            if let Some(id) = self.vm.list_loaded_types(Some(candidate.as_str()))?.first() {
                return Ok(Some(*id));
            }
        }

        if canonical.contains('.') {
            return Ok(None);
        }

        let mut matches = Vec::new();
        for id in self.vm.list_loaded_types(None)? {
            let Ok(type_name) = self.vm.type_name(id) else {
                continue;
            };
            if types::simple_type_name(&type_name) == canonical {
                matches.push((id, type_name));
            }
        }
        match matches.len() {
            0 => Ok(None),
            1 => Ok(Some(matches[0].0)),
            _ => Err(EvalError::AmbiguousType {
                name: name.to_string(),
                candidates: matches
                    .into_iter()
                    .map(|(_, name)| name)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Evaluate a receiver, falling back to a static type reference.
    fn eval_receiver(&self, expr: &Expr) -> Result<Receiver> {
        match self.evaluate(expr) {
            Ok(value) => Ok(Receiver::Value(value)),
            Err(EvalError::NameNotFound(missing)) => {
                if let Some(name) = expr.as_qualified_name().filter(|n| looks_like_type(n)) {
                    if let Some(ty) = self.find_type(&name)? {
                        return Ok(Receiver::Type(ty));
                    }
                }
                Err(EvalError::NameNotFound(missing))
            }
            Err(err) => Err(err),
        }
    }

    fn from_remote(&self, value: RemoteValue) -> Result<Value> {
        Ok(match value {
            RemoteValue::Null => Value::Null,
            RemoteValue::Void => Value::Void,
            RemoteValue::Boolean(v) => Value::Boolean(v),
            RemoteValue::Byte(v) => Value::Byte(v),
            RemoteValue::Short(v) => Value::Short(v),
            RemoteValue::Int(v) => Value::Int(v),
            RemoteValue::Long(v) => Value::Long(v),
            RemoteValue::Float(v) => Value::Float(v),
            RemoteValue::Double(v) => Value::Double(v),
            RemoteValue::Char(v) => Value::Char(v),
            RemoteValue::String(id) => Value::Str(StringValue {
                text: self.vm.string_value(id)?,
                handle: Some(id),
            }),
            RemoteValue::Array(id) => Value::Array(id),
            RemoteValue::Object(id) => Value::Object(id),
        })
    }

    /// Primitive inside a `java.lang.Integer`-style box, `None` for any other
    /// value. Reads the box's `value` field and falls back to `intValue()`
    /// and friends.
    fn unbox(&self, value: &Value) -> Result<Option<Value>> {
        let Value::Object(id) = value else {
            return Ok(None);
        };
        let ty = self.vm.object_type(*id)?;
        let Some(primitive) = types::unboxed_name(&self.vm.type_name(ty)?) else {
            return Ok(None);
        };
        if let Some(raw) = self.vm.get_field(*id, "value")? {
            let inner = self.from_remote(raw)?;
            if inner.primitive_name() == Some(primitive) {
                return Ok(Some(inner));
            }
        }
        let accessor = format!("{primitive}Value");
        let method = self
            .vm
            .methods_by_name(ty, &accessor)?
            .into_iter()
            .find(|m| m.param_types.is_empty() && !m.is_static)
            .ok_or_else(|| EvalError::MethodNotFound(accessor.clone()))?;
        self.invoke(InvokeTarget::Instance(*id), &method, Vec::new())
            .map(Some)
    }

    /// `value` with a boxed primitive replaced by the primitive itself.
    pub fn unboxed(&self, value: Value) -> Result<Value> {
        Ok(self.unbox(&value)?.unwrap_or(value))
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value> {
        let left = self.unboxed(left)?;
        let right = self.unboxed(right)?;
        match op {
            BinaryOp::Add
                if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) =>
            {
                let mut text = self.display_text(&left);
                text.push_str(&self.display_text(&right));
                Ok(Value::str(text))
            }
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => {
                self.arithmetic(op, &left, &right)
            }
            BinaryOp::Eq => Ok(Value::Boolean(self.values_equal(&left, &right)?)),
            BinaryOp::Ne => Ok(Value::Boolean(!self.values_equal(&left, &right)?)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let ordering = self.compare(op, &left, &right)?;
                Ok(Value::Boolean(match op {
                    BinaryOp::Lt => ordering == Some(Ordering::Less),
                    BinaryOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    BinaryOp::Gt => ordering == Some(Ordering::Greater),
                    _ => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
                }))
            }
            BinaryOp::And | BinaryOp::Or | BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor => {
                self.bitwise(op, &left, &right)
            }
            BinaryOp::Shl | BinaryOp::Shr | BinaryOp::Ushr => self.shift(op, &left, &right),
        }
    }

    fn operand_mismatch(&self, op: BinaryOp, left: &Value, right: &Value) -> EvalError {
        EvalError::TypeMismatch(format!(
            "cannot apply `{}` to {} and {}",
            op.symbol(),
            self.type_name_of(left),
            self.type_name_of(right)
        ))
    }

    fn arithmetic(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        let (Some(l), Some(r)) = (left.num_kind(), right.num_kind()) else {
            return Err(self.operand_mismatch(op, left, right));
        };
        match l.max(r) {
            NumKind::Int => {
                let (a, b) = (int_operand(left), int_operand(right));
                Ok(Value::Int(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div if b == 0 => return Err(EvalError::DivisionByZero),
                    BinaryOp::Div => a.wrapping_div(b),
                    BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
                    _ => a.wrapping_rem(b),
                }))
            }
            NumKind::Long => {
                let (a, b) = (left.as_i64().unwrap_or(0), right.as_i64().unwrap_or(0));
                Ok(Value::Long(match op {
                    BinaryOp::Add => a.wrapping_add(b),
                    BinaryOp::Sub => a.wrapping_sub(b),
                    BinaryOp::Mul => a.wrapping_mul(b),
                    BinaryOp::Div if b == 0 => return Err(EvalError::DivisionByZero),
                    BinaryOp::Div => a.wrapping_div(b),
                    BinaryOp::Rem if b == 0 => return Err(EvalError::DivisionByZero),
                    _ => a.wrapping_rem(b),
                }))
            }
            NumKind::Float => {
                let a = left.as_f64().unwrap_or(0.0) as f32;
                let b = right.as_f64().unwrap_or(0.0) as f32;
                Ok(Value::Float(float_op(op, a, b)))
            }
            NumKind::Double => {
                let a = left.as_f64().unwrap_or(0.0);
                let b = right.as_f64().unwrap_or(0.0);
                Ok(Value::Double(float_op(op, a, b)))
            }
        }
    }

    fn compare(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Option<Ordering>> {
        if let (Value::Str(a), Value::Str(b)) = (left, right) {
            return Ok(Some(a.text.cmp(&b.text)));
        }
        match (left.num_kind(), right.num_kind()) {
            (Some(l), Some(r)) if l.max(r) >= NumKind::Float => {
                Ok(left.as_f64().partial_cmp(&right.as_f64()))
            }
            (Some(_), Some(_)) => Ok(left.as_i64().zip(right.as_i64()).map(|(a, b)| a.cmp(&b))),
            _ => Err(self.operand_mismatch(op, left, right)),
        }
    }

    fn bitwise(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        if let (Value::Boolean(a), Value::Boolean(b)) = (left, right) {
            return Ok(Value::Boolean(match op {
                BinaryOp::And | BinaryOp::BitAnd => a & b,
                BinaryOp::Or | BinaryOp::BitOr => a | b,
                _ => a ^ b,
            }));
        }
        let kind = match (left.num_kind(), right.num_kind()) {
            (Some(l), Some(r)) if l.max(r) <= NumKind::Long => l.max(r),
            _ => return Err(self.operand_mismatch(op, left, right)),
        };
        let (a, b) = (left.as_i64().unwrap_or(0), right.as_i64().unwrap_or(0));
        let result = match op {
            BinaryOp::BitAnd | BinaryOp::And => a & b,
            BinaryOp::BitOr | BinaryOp::Or => a | b,
            _ => a ^ b,
        };
        Ok(if kind == NumKind::Long {
            Value::Long(result)
        } else {
            Value::Int(result as i32)
        })
    }

    fn shift(&self, op: BinaryOp, left: &Value, right: &Value) -> Result<Value> {
        let (Some(kind), Some(amount)) = (left.num_kind(), right.as_i64()) else {
            return Err(self.operand_mismatch(op, left, right));
        };
        match kind {
            NumKind::Int => {
                let value = int_operand(left);
                let amount = (amount & 31) as u32;
                Ok(Value::Int(match op {
                    BinaryOp::Shl => value.wrapping_shl(amount),
                    BinaryOp::Shr => value >> amount,
                    _ => ((value as u32) >> amount) as i32,
                }))
            }
            NumKind::Long => {
                let value = left.as_i64().unwrap_or(0);
                let amount = (amount & 63) as u32;
                Ok(Value::Long(match op {
                    BinaryOp::Shl => value.wrapping_shl(amount),
                    BinaryOp::Shr => value >> amount,
                    _ => ((value as u64) >> amount) as i64,
                }))
            }
            _ => Err(self.operand_mismatch(op, left, right)),
        }
    }

    /// `==` semantics: numeric by value, strings by content, objects by
    /// identity and then by a remote `equals` when invocation is allowed.
    fn values_equal(&self, left: &Value, right: &Value) -> Result<bool> {
        Ok(match (left, right) {
            (Value::Null, Value::Null) => true,
            (Value::Null, _) | (_, Value::Null) => false,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a.text == b.text,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Object(a), Value::Object(b)) if a == b => true,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Object(_), Value::Object(_)) => {
                if !self.config.allow_method_invocation {
                    return Ok(false);
                }
                matches!(
                    self.invoke_on_value(left.clone(), "equals", vec![right.clone()])?,
                    Value::Boolean(true)
                )
            }
            _ => match (left.num_kind(), right.num_kind()) {
                (Some(l), Some(r)) if l.max(r) >= NumKind::Float => left.as_f64() == right.as_f64(),
                (Some(_), Some(_)) => left.as_i64() == right.as_i64(),
                _ => false,
            },
        })
    }

    fn member_access(&self, target: &Expr, name: &str, safe: bool) -> Result<Value> {
        match self.eval_receiver(target)? {
            Receiver::Type(ty) => match self.static_field(ty, name)? {
                Some(value) => self.from_remote(value),
                None => Err(EvalError::NameNotFound(format!(
                    "{}.{name}",
                    self.vm.type_name(ty)?
                ))),
            },
            Receiver::Value(Value::Null) if safe => Ok(Value::Null),
            Receiver::Value(Value::Null) => Err(EvalError::NullReceiver(name.to_string())),
            Receiver::Value(value) => self.instance_member(value, name),
        }
    }

    fn instance_member(&self, value: Value, name: &str) -> Result<Value> {
        match (&value, name) {
            (Value::Str(s), "length") => Ok(Value::Int(s.text.encode_utf16().count() as i32)),
            (Value::Array(id), "length" | "size") => {
                Ok(Value::Int(self.vm.array_length(*id)? as i32))
            }
            (Value::Range(r), "first") => Ok(range_bound(r, r.first)),
            (Value::Range(r), "last") => Ok(range_bound(r, r.last)),
            (Value::Range(r), "step") => Ok(range_bound(r, r.step)),
            (Value::Object(id), _) => {
                if let Some(field) = self.vm.get_field(*id, name)? {
                    return self.from_remote(field);
                }
                self.property_getter(&value, name)?
                    .ok_or_else(|| EvalError::NameNotFound(name.to_string()))
            }
            (Value::Str(_), _) => self
                .property_getter(&value, name)?
                .ok_or_else(|| EvalError::NameNotFound(name.to_string())),
            (Value::Placeholder(_), _) => Err(EvalError::Unsupported(format!(
                "`{name}` on a lambda"
            ))),
            _ => Err(EvalError::TypeMismatch(format!(
                "{} has no member `{name}`",
                self.type_name_of(&value)
            ))),
        }
    }

    /// Kotlin-style property access through `getX()` / `isX()` / `x()`.
    fn property_getter(&self, value: &Value, name: &str) -> Result<Option<Value>> {
        let (target, type_id) = self.invocation_target(value)?;
        let capitalized = capitalize(name);
        for candidate in [
            format!("get{capitalized}"),
            format!("is{capitalized}"),
            name.to_string(),
        ] {
            let methods = self.vm.methods_by_name(type_id, &candidate)?;
            if let Some(getter) = methods
                .iter()
                .find(|m| m.param_types.is_empty() && !m.is_static)
            {
                return self
                    .invoke(InvokeTarget::Instance(target), getter, Vec::new())
                    .map(Some);
            }
        }
        Ok(None)
    }

    fn index(&self, target: &Expr, index: &Expr) -> Result<Value> {
        let target = self.evaluate(target)?;
        let index = self.evaluate(index)?;
        let index = self.unboxed(index)?;
        match &target {
            Value::Null => Err(EvalError::NullReceiver("[]".to_string())),
            Value::Array(id) => {
                let i = integral_index(&index)?;
                let length = self.vm.array_length(*id)?;
                if i < 0 || i as u64 >= length as u64 {
                    return Err(EvalError::IndexOutOfBounds { index: i, length });
                }
                let element = self.vm.get_array_element(*id, i as usize)?;
                self.from_remote(element)
            }
            Value::Str(s) => {
                let i = integral_index(&index)?;
                let chars: Vec<char> = s.text.chars().collect();
                usize::try_from(i)
                    .ok()
                    .and_then(|i| chars.get(i).copied())
                    .map(Value::Char)
                    .ok_or(EvalError::IndexOutOfBounds {
                        index: i,
                        length: chars.len(),
                    })
            }
            Value::Object(_) => self.invoke_on_value(target.clone(), "get", vec![index]),
            _ => Err(EvalError::TypeMismatch(format!(
                "cannot index into {}",
                self.type_name_of(&target)
            ))),
        }
    }

    fn eval_args(&self, args: &[Expr]) -> Result<Vec<Value>> {
        args.iter()
            .map(|arg| match arg {
                // The array itself goes to the vararg parameter.
                Expr::Spread(inner) => match self.evaluate(inner)? {
                    array @ Value::Array(_) => Ok(array),
                    other => Err(EvalError::TypeMismatch(format!(
                        "spread operator expects an array, found {}",
                        self.type_name_of(&other)
                    ))),
                },
                other => self.evaluate(other),
            })
            .collect()
    }

    fn call(&self, receiver: Option<&Expr>, name: &str, args: &[Expr], safe: bool) -> Result<Value> {
        let Some(receiver) = receiver else {
            let args = self.eval_args(args)?;
            return self.call_unqualified(name, args);
        };

        match self.eval_receiver(receiver)? {
            Receiver::Value(Value::Null) if safe => Ok(Value::Null),
            Receiver::Value(Value::Null) => Err(EvalError::NullReceiver(name.to_string())),
            Receiver::Type(ty) => {
                let args = self.eval_args(args)?;
                let methods = self.vm.methods_by_name(ty, name)?;
                let statics: Vec<MethodInfo> = methods.into_iter().filter(|m| m.is_static).collect();
                let method = self
                    .select_overload(&statics, &args)?
                    .ok_or_else(|| EvalError::MethodNotFound(name.to_string()))?;
                self.invoke(InvokeTarget::Static(ty), &method, args)
            }
            Receiver::Value(value) => {
                let args = self.eval_args(args)?;
                if let Some(result) = self.local_method(&value, name, &args)? {
                    return Ok(result);
                }
                self.invoke_on_value(value, name, args)
            }
        }
    }

    /// `foo()` with no receiver: a method of `this`, else a static method of
    /// the declaring type.
    fn call_unqualified(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        if let Some(this) = self.this_object()? {
            let ty = self.vm.object_type(this)?;
            let methods = self.vm.methods_by_name(ty, name)?;
            if let Some(method) = self.select_overload(&methods, &args)? {
                let target = if method.is_static {
                    InvokeTarget::Static(ty)
                } else {
                    InvokeTarget::Instance(this)
                };
                return self.invoke(target, &method, args);
            }
        }

        let declaring = self
            .vm
            .frame_declaring_type(self.frame.thread, self.frame.frame)?;
        let statics: Vec<MethodInfo> = self
            .vm
            .methods_by_name(declaring, name)?
            .into_iter()
            .filter(|m| m.is_static)
            .collect();
        let method = self
            .select_overload(&statics, &args)?
            .ok_or_else(|| EvalError::MethodNotFound(name.to_string()))?;
        self.invoke(InvokeTarget::Static(declaring), &method, args)
    }

    /// Methods answered without a round trip to the target.
    fn local_method(&self, value: &Value, name: &str, args: &[Value]) -> Result<Option<Value>> {
        let primitive = value.primitive_name();
        let converted = match name {
            "toInt" => Some("int"),
            "toLong" => Some("long"),
            "toShort" => Some("short"),
            "toByte" => Some("byte"),
            "toFloat" => Some("float"),
            "toDouble" => Some("double"),
            "toChar" => Some("char"),
            _ => None,
        };

        Ok(Some(match (value, name, args) {
            (_, _, []) if primitive.is_some() && converted.is_some() => converted
                .and_then(|target| value.convert_to(target))
                .ok_or_else(|| {
                    EvalError::TypeMismatch(format!("cannot convert boolean with `{name}`"))
                })?,
            (Value::Str(s), "toString", []) => Value::Str(s.clone()),
            (Value::Str(s), "length", []) => Value::Int(s.text.encode_utf16().count() as i32),
            (Value::Str(s), "isEmpty", []) => Value::Boolean(s.text.is_empty()),
            (Value::Range(r), "isEmpty", []) => Value::Boolean(r.is_empty()),
            (Value::Range(_), "contains", [element]) => {
                Value::Boolean(self.contains(value, element)?)
            }
            (_, "toString", []) if primitive.is_some() || matches!(value, Value::Range(_)) => {
                Value::str(self.display_text(value))
            }
            (_, "equals", [other])
                if primitive.is_some() || matches!(value, Value::Str(_) | Value::Range(_)) =>
            {
                Value::Boolean(self.values_equal(value, other)?)
            }
            (Value::Placeholder(_), _, _) => {
                return Err(EvalError::Unsupported("lambdas cannot be invoked".to_string()))
            }
            _ if primitive.is_some() || matches!(value, Value::Range(_)) => {
                return Err(EvalError::MethodNotFound(format!(
                    "{}.{name}",
                    self.type_name_of(value)
                )))
            }
            _ => return Ok(None),
        }))
    }

    /// Remote handle and runtime type for a value that methods can be invoked on.
    fn invocation_target(&self, value: &Value) -> Result<(ObjectId, TypeId)> {
        match value {
            Value::Str(s) => {
                let handle = self.remote_string(s)?;
                Ok((handle, self.vm.object_type(handle)?))
            }
            Value::Object(id) | Value::Array(id) => Ok((*id, self.vm.object_type(*id)?)),
            other => Err(EvalError::TypeMismatch(format!(
                "{} has no remote methods",
                self.type_name_of(other)
            ))),
        }
    }

    fn invoke_on_value(&self, value: Value, name: &str, args: Vec<Value>) -> Result<Value> {
        let (target, type_id) = self.invocation_target(&value)?;
        let methods = self.vm.methods_by_name(type_id, name)?;
        let method = self
            .select_overload(&methods, &args)?
            .ok_or_else(|| EvalError::MethodNotFound(name.to_string()))?;
        let target = if method.is_static {
            InvokeTarget::Static(type_id)
        } else {
            InvokeTarget::Instance(target)
        };
        self.invoke(target, &method, args)
    }

    fn ensure_invocation_allowed(&self) -> Result<()> {
        if !self.config.allow_method_invocation {
            return Err(EvalError::Unsupported(
                "method invocation is disabled".to_string(),
            ));
        }
        if !self.vm.thread_is_suspended(self.frame.thread)? {
            return Err(EvalError::NotSuspended(self.frame.thread));
        }
        Ok(())
    }

    fn prepare_args(&self, method: &MethodInfo, args: &[Value]) -> Result<Vec<RemoteValue>> {
        args.iter()
            .zip(&method.param_types)
            .map(|(arg, param)| self.to_remote_arg(arg, param))
            .collect()
    }

    fn invoke(&self, target: InvokeTarget, method: &MethodInfo, args: Vec<Value>) -> Result<Value> {
        self.ensure_invocation_allowed()?;
        let remote_args = self.prepare_args(method, &args)?;
        tracing::debug!(
            target: "kestrel.eval",
            thread = self.frame.thread,
            method = %method.name,
            args = remote_args.len(),
            "invoking remote method"
        );
        let result = self
            .vm
            .invoke_method(self.frame.thread, target, method.id, &remote_args)?;
        self.from_remote(result)
    }

    fn construct(&self, ty: &TypeRef, args: &[Expr]) -> Result<Value> {
        let type_id = self
            .find_type(&ty.name)?
            .ok_or_else(|| EvalError::NameNotFound(ty.name.clone()))?;
        let args = self.eval_args(args)?;
        let constructors = self.vm.methods_by_name(type_id, "<init>")?;
        let constructor = self
            .select_overload(&constructors, &args)?
            .ok_or_else(|| EvalError::MethodNotFound(format!("{}.<init>", ty.name)))?;
        self.ensure_invocation_allowed()?;
        let remote_args = self.prepare_args(&constructor, &args)?;
        let created =
            self.vm
                .new_instance(self.frame.thread, type_id, constructor.id, &remote_args)?;
        self.from_remote(created)
    }

    fn remote_string(&self, s: &StringValue) -> Result<ObjectId> {
        match s.handle {
            Some(handle) => Ok(handle),
            None => Ok(self.vm.wrap_local_string(&s.text)?),
        }
    }

    fn to_remote_arg(&self, value: &Value, param: &str) -> Result<RemoteValue> {
        match value {
            Value::Str(s) => Ok(RemoteValue::String(self.remote_string(s)?)),
            Value::Range(_) | Value::Placeholder(_) | Value::Void => Err(EvalError::Unsupported(
                format!("cannot pass {} to remote code", self.display_text(value)),
            )),
            _ if value.primitive_name().is_some() => {
                if types::is_primitive(param) {
                    value
                        .convert_to(param)
                        .and_then(|v| v.to_remote_primitive())
                        .ok_or_else(|| {
                            EvalError::TypeMismatch(format!(
                                "cannot pass {} as {param}",
                                self.type_name_of(value)
                            ))
                        })
                } else {
                    self.box_primitive(value)
                }
            }
            Value::Object(_) if types::is_primitive(param) => {
                let primitive = self.unbox(value)?.ok_or_else(|| {
                    EvalError::TypeMismatch(format!(
                        "cannot pass {} as {param}",
                        self.type_name_of(value)
                    ))
                })?;
                self.to_remote_arg(&primitive, param)
            }
            _ => value.to_remote_primitive().ok_or_else(|| {
                EvalError::Unsupported(format!("cannot pass {} to remote code", self.display_text(value)))
            }),
        }
    }

    /// Box through the wrapper's static `valueOf`.
    fn box_primitive(&self, value: &Value) -> Result<RemoteValue> {
        let primitive = value.primitive_name().unwrap_or("int");
        let boxed = types::boxed_name(primitive).unwrap_or(OBJECT);
        let Some(type_id) = self.vm.list_loaded_types(Some(boxed))?.first().copied() else {
            return Err(EvalError::Unsupported(format!(
                "cannot box {primitive}: {boxed} is not loaded"
            )));
        };
        let value_of = self
            .vm
            .methods_by_name(type_id, "valueOf")?
            .into_iter()
            .find(|m| m.is_static && m.param_types.len() == 1 && m.param_types[0] == primitive)
            .ok_or_else(|| EvalError::MethodNotFound(format!("{boxed}.valueOf")))?;
        let raw = value
            .to_remote_primitive()
            .ok_or_else(|| EvalError::TypeMismatch(format!("cannot box {primitive}")))?;
        Ok(self.vm.invoke_method(
            self.frame.thread,
            InvokeTarget::Static(type_id),
            value_of.id,
            &[raw],
        )?)
    }

    /// Pick the applicable overload with the lowest total conversion cost.
    /// Ties go to the first candidate in discovery order.
    fn select_overload(&self, methods: &[MethodInfo], args: &[Value]) -> Result<Option<MethodInfo>> {
        let mut best: Option<(Cost, &MethodInfo)> = None;
        'candidates: for method in methods.iter().filter(|m| m.param_types.len() == args.len()) {
            let mut total = Cost::default();
            for (arg, param) in args.iter().zip(&method.param_types) {
                match self.conversion_cost(arg, param)? {
                    Some(cost) => total = total + cost,
                    None => continue 'candidates,
                }
            }
            if best.is_none_or(|(cost, _)| total < cost) {
                best = Some((total, method));
            }
        }
        Ok(best.map(|(_, method)| method.clone()))
    }

    /// Rank 0 exact, 1 supertype or interface, 2 primitive widening, 3 boxing
    /// or unboxing, 4 unboxing then widening.
    fn conversion_cost(&self, arg: &Value, param: &str) -> Result<Option<Cost>> {
        Ok(match arg {
            Value::Null => (!types::is_primitive(param)).then_some(Cost::rank(1)),
            Value::Str(_) if param == STRING => Some(Cost::EXACT),
            Value::Str(_) => STRING_SUPERTYPES
                .contains(&param)
                .then(|| Cost::supertype(param, 1)),
            Value::Object(id) | Value::Array(id) => {
                let ty = self.vm.object_type(*id)?;
                let hierarchy = self.hierarchy(ty)?;
                match hierarchy.iter().find(|(name, _)| name == param) {
                    Some((_, 0)) => Some(Cost::EXACT),
                    Some((name, depth)) => Some(Cost::supertype(name, *depth)),
                    None => hierarchy
                        .first()
                        .and_then(|(name, _)| types::unboxed_name(name))
                        .and_then(|primitive| {
                            if primitive == param {
                                Some(Cost::rank(3))
                            } else if types::primitive_widens(primitive, param) {
                                Some(Cost::rank(4))
                            } else {
                                None
                            }
                        }),
                }
            }
            Value::Range(_) | Value::Placeholder(_) | Value::Void => None,
            primitive => {
                let name = primitive.primitive_name().unwrap_or_default();
                if name == param {
                    Some(Cost::EXACT)
                } else if types::primitive_widens(name, param) {
                    Some(Cost::rank(2))
                } else {
                    types::boxing_targets(name)
                        .into_iter()
                        .find(|(target, _)| *target == param)
                        .map(|(_, distance)| Cost {
                            rank: 3,
                            distance,
                        })
                }
            }
        })
    }

    /// `ty` and every supertype and interface with its distance from `ty`,
    /// `ty` first.
    fn hierarchy(&self, ty: TypeId) -> Result<Vec<(String, u32)>> {
        let mut names = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([(ty, 0)]);
        while let Some((current, depth)) = queue.pop_front() {
            if !seen.insert(current) {
                continue;
            }
            names.push((self.vm.type_name(current)?, depth));
            if let Some(superclass) = self.vm.superclass(current)? {
                queue.push_back((superclass, depth + 1));
            }
            queue.extend(
                self.vm
                    .interfaces(current)?
                    .into_iter()
                    .map(|interface| (interface, depth + 1)),
            );
        }
        Ok(names)
    }

    fn is_instance(&self, value: &Value, ty: &TypeRef) -> Result<bool> {
        Ok(match value {
            Value::Null => ty.nullable,
            Value::Str(_) => std::iter::once(STRING)
                .chain(STRING_SUPERTYPES.iter().copied())
                .any(|name| types::names_match(name, &ty.name)),
            Value::Object(id) | Value::Array(id) => {
                let runtime = self.vm.object_type(*id)?;
                self.hierarchy(runtime)?
                    .iter()
                    .any(|(name, _)| types::names_match(name, &ty.name))
            }
            Value::Range(r) => types::names_match(r.type_name(), &ty.name),
            Value::Placeholder(_) | Value::Void => false,
            primitive => {
                let name = primitive.primitive_name().unwrap_or_default();
                types::canonical_type_name(&ty.name) == name
                    || types::boxing_targets(name)
                        .iter()
                        .any(|(boxed, _)| types::names_match(boxed, &ty.name))
            }
        })
    }

    fn cast(&self, value: Value, ty: &TypeRef, safe: bool) -> Result<Value> {
        if value.is_null() {
            return if ty.nullable || safe {
                Ok(Value::Null)
            } else {
                Err(EvalError::TypeMismatch(format!(
                    "null cannot be cast to non-null type {}",
                    ty.name
                )))
            };
        }

        let target = types::canonical_type_name(&ty.name);
        if value.is_numeric() || matches!(value, Value::Char(_)) {
            if let Some(converted) = value.convert_to(target) {
                return Ok(converted);
            }
        }

        if self.is_instance(&value, ty)? {
            return Ok(value);
        }
        if safe {
            return Ok(Value::Null);
        }
        Err(EvalError::TypeMismatch(format!(
            "{} cannot be cast to {}",
            self.type_name_of(&value),
            ty.name
        )))
    }

    fn template(&self, parts: &[TemplatePart]) -> Result<String> {
        let mut out = String::new();
        for part in parts {
            match part {
                TemplatePart::Literal(text) => out.push_str(text),
                TemplatePart::VariableRef(name) => {
                    let value = self.resolve_identifier(name)?;
                    out.push_str(&self.display_text(&value));
                }
                TemplatePart::EmbeddedExpr(source) => {
                    let expr = parse_expression(source).map_err(EvalError::Syntax)?;
                    let value = self.evaluate(&expr)?;
                    out.push_str(&self.display_text(&value));
                }
            }
        }
        Ok(out)
    }

    fn range(&self, start: &Expr, end: &Expr, kind: RangeKind, step: Option<&Expr>) -> Result<Value> {
        let start = self.evaluate(start)?;
        let start = self.unboxed(start)?;
        let end = self.evaluate(end)?;
        let end = self.unboxed(end)?;
        let long = matches!(start, Value::Long(_)) || matches!(end, Value::Long(_));
        let (Some(first), Some(bound)) = (start.as_i64(), end.as_i64()) else {
            return Err(EvalError::TypeMismatch(format!(
                "range bounds must be integral, found {} and {}",
                self.type_name_of(&start),
                self.type_name_of(&end)
            )));
        };
        let step = match step {
            Some(step) => {
                let value = self.evaluate(step)?;
                let value = self.unboxed(value)?;
                value.as_i64().ok_or_else(|| {
                    EvalError::TypeMismatch(format!(
                        "range step must be integral, found {}",
                        self.type_name_of(&value)
                    ))
                })?
            }
            None => 1,
        };
        if step <= 0 {
            return Err(EvalError::TypeMismatch(format!(
                "range step must be positive, was {step}"
            )));
        }

        Ok(Value::Range(match kind {
            RangeKind::Inclusive => RangeValue {
                first,
                last: bound,
                step,
                long,
            },
            RangeKind::Until => RangeValue {
                first,
                last: bound.saturating_sub(1),
                step,
                long,
            },
            RangeKind::DownTo => RangeValue {
                first,
                last: bound,
                step: -step,
                long,
            },
        }))
    }

    fn contains(&self, collection: &Value, element: &Value) -> Result<bool> {
        match collection {
            Value::Range(range) => {
                let element = self.unboxed(element.clone())?;
                Ok(element.as_i64().is_some_and(|v| range.contains(v)))
            }
            Value::Str(s) => match element {
                Value::Str(needle) => Ok(s.text.contains(needle.text.as_str())),
                Value::Char(c) => Ok(s.text.contains(*c)),
                other => Err(EvalError::TypeMismatch(format!(
                    "cannot search a string for {}",
                    self.type_name_of(other)
                ))),
            },
            Value::Array(id) => {
                let length = self.vm.array_length(*id)?;
                for i in 0..length {
                    let item = self.from_remote(self.vm.get_array_element(*id, i)?)?;
                    if self.values_equal(&item, element)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Value::Object(_) => Ok(matches!(
                self.invoke_on_value(collection.clone(), "contains", vec![element.clone()])?,
                Value::Boolean(true)
            )),
            Value::Null => Err(EvalError::NullReceiver("contains".to_string())),
            other => Err(EvalError::TypeMismatch(format!(
                "`in` is not supported on {}",
                self.type_name_of(other)
            ))),
        }
    }

    /// Text used inside concatenation and templates; strings are not truncated.
    pub fn display_text(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Void => "void".to_string(),
            Value::Boolean(v) => v.to_string(),
            Value::Byte(v) => v.to_string(),
            Value::Short(v) => v.to_string(),
            Value::Int(v) => v.to_string(),
            Value::Long(v) => v.to_string(),
            Value::Float(v) => format_float(*v),
            Value::Double(v) => format_double(*v),
            Value::Char(c) => c.to_string(),
            Value::Str(s) => s.text.clone(),
            Value::Array(id) => {
                let type_name = self.runtime_type_name(*id);
                match self.vm.array_length(*id) {
                    Ok(length) => array_display(&type_name, length),
                    Err(_) => identity_display(&type_name, *id),
                }
            }
            Value::Object(id) => self.object_display(*id),
            Value::Range(r) => r.to_string(),
            Value::Placeholder(text) => text.clone(),
        }
    }

    /// Text shown as the result of an evaluation.
    pub fn display(&self, value: &Value) -> String {
        match value {
            Value::Str(s) => truncate_display(&s.text, self.config.max_string_display),
            other => self.display_text(other),
        }
    }

    fn object_display(&self, id: ObjectId) -> String {
        if let Ok(Some(primitive)) = self.unbox(&Value::Object(id)) {
            return self.display_text(&primitive);
        }
        if self.config.allow_method_invocation {
            if let Ok(Value::Str(s)) = self.invoke_on_value(Value::Object(id), "toString", Vec::new()) {
                return s.text;
            }
        }
        identity_display(&self.runtime_type_name(id), id)
    }

    fn runtime_type_name(&self, id: ObjectId) -> String {
        self.vm
            .object_type(id)
            .and_then(|ty| self.vm.type_name(ty))
            .unwrap_or_else(|_| OBJECT.to_string())
    }

    /// Static or runtime type name reported alongside a result.
    pub fn type_name_of(&self, value: &Value) -> String {
        match value {
            Value::Null => "null".to_string(),
            Value::Void => "void".to_string(),
            Value::Str(_) => STRING.to_string(),
            Value::Array(id) | Value::Object(id) => self.runtime_type_name(*id),
            Value::Range(r) => r.type_name().to_string(),
            Value::Placeholder(_) => "kotlin.Function".to_string(),
            primitive => primitive.primitive_name().unwrap_or("?").to_string(),
        }
    }
}

/// Conversion cost of passing arguments to one overload. The rank decides;
/// distance breaks ties between supertypes of the same rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
struct Cost {
    rank: u32,
    distance: u32,
}

impl Cost {
    const EXACT: Cost = Cost {
        rank: 0,
        distance: 0,
    };

    fn rank(rank: u32) -> Self {
        Self { rank, distance: 0 }
    }

    fn supertype(name: &str, depth: u32) -> Self {
        Self {
            rank: 1,
            distance: types::supertype_distance(name, depth),
        }
    }
}

impl std::ops::Add for Cost {
    type Output = Cost;

    fn add(self, other: Cost) -> Cost {
        Cost {
            rank: self.rank + other.rank,
            distance: self.distance + other.distance,
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Int(v) => Value::Int(*v),
        Literal::Long(v) => Value::Long(*v),
        Literal::Float(v) => Value::Float(*v),
        Literal::Double(v) => Value::Double(*v),
        Literal::Char(c) => Value::Char(*c),
        Literal::Bool(b) => Value::Boolean(*b),
        Literal::Str(s) => Value::str(s.clone()),
        Literal::Null => Value::Null,
    }
}

fn unary(op: UnaryOp, value: Value) -> Result<Value> {
    let mismatch = |value: &Value| {
        EvalError::TypeMismatch(format!(
            "cannot apply unary operator to {}",
            value.primitive_name().unwrap_or("a non-primitive value")
        ))
    };
    match op {
        UnaryOp::Not => match value {
            Value::Boolean(b) => Ok(Value::Boolean(!b)),
            other => Err(mismatch(&other)),
        },
        UnaryOp::Neg => match value {
            Value::Long(v) => Ok(Value::Long(v.wrapping_neg())),
            Value::Float(v) => Ok(Value::Float(-v)),
            Value::Double(v) => Ok(Value::Double(-v)),
            ref other if other.num_kind() == Some(NumKind::Int) => {
                Ok(Value::Int(int_operand(other).wrapping_neg()))
            }
            other => Err(mismatch(&other)),
        },
        UnaryOp::Plus => match value {
            Value::Long(_) | Value::Float(_) | Value::Double(_) => Ok(value),
            ref other if other.num_kind() == Some(NumKind::Int) => Ok(Value::Int(int_operand(other))),
            other => Err(mismatch(&other)),
        },
        UnaryOp::BitNot => match value {
            Value::Long(v) => Ok(Value::Long(!v)),
            ref other if other.num_kind() == Some(NumKind::Int) => Ok(Value::Int(!int_operand(other))),
            other => Err(mismatch(&other)),
        },
    }
}

/// Int-promoted view of byte, short, char and int operands.
fn int_operand(value: &Value) -> i32 {
    value.as_i64().unwrap_or(0) as i32
}

fn float_op<F>(op: BinaryOp, a: F, b: F) -> F
where
    F: std::ops::Add<Output = F>
        + std::ops::Sub<Output = F>
        + std::ops::Mul<Output = F>
        + std::ops::Div<Output = F>
        + std::ops::Rem<Output = F>,
{
    match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => a / b,
        _ => a % b,
    }
}

fn integral_index(index: &Value) -> Result<i64> {
    match index {
        Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Long(_) | Value::Char(_) => {
            Ok(index.as_i64().unwrap_or(0))
        }
        other => Err(EvalError::TypeMismatch(format!(
            "array index must be integral, found {}",
            other.primitive_name().unwrap_or("a reference")
        ))),
    }
}

fn range_bound(range: &RangeValue, value: i64) -> Value {
    if range.long {
        Value::Long(value)
    } else {
        Value::Int(value as i32)
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `Math`, `java.util.Collections`: last segment starts upper-case.
fn looks_like_type(name: &str) -> bool {
    name.rsplit('.')
        .next()
        .and_then(|segment| segment.chars().next())
        .is_some_and(char::is_uppercase)
}
