use kestrel_remote::{ObjectId, RemoteValue};

/// Text of a string value, fetched eagerly, plus the remote handle when the
/// string already lives in the target.
#[derive(Debug, Clone, PartialEq)]
pub struct StringValue {
    pub text: String,
    pub handle: Option<ObjectId>,
}

impl StringValue {
    pub fn local(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            handle: None,
        }
    }
}

/// An integral progression built by `..`, `until` or `downTo`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub first: i64,
    /// Inclusive bound in the direction of `step`.
    pub last: i64,
    /// Never zero; negative for `downTo`.
    pub step: i64,
    pub long: bool,
}

impl RangeValue {
    pub fn contains(&self, value: i64) -> bool {
        let in_bounds = if self.step > 0 {
            value >= self.first && value <= self.last
        } else {
            value <= self.first && value >= self.last
        };
        // Widened so full-width long ranges cannot overflow.
        let offset = i128::from(value) - i128::from(self.first);
        in_bounds && offset % i128::from(self.step) == 0
    }

    pub fn is_empty(&self) -> bool {
        if self.step > 0 {
            self.first > self.last
        } else {
            self.first < self.last
        }
    }

    pub fn type_name(&self) -> &'static str {
        if self.long {
            "kotlin.ranges.LongProgression"
        } else {
            "kotlin.ranges.IntProgression"
        }
    }
}

impl std::fmt::Display for RangeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.step > 0 {
            write!(f, "{}..{}", self.first, self.last)?;
            if self.step != 1 {
                write!(f, " step {}", self.step)?;
            }
        } else {
            write!(f, "{} downTo {}", self.first, self.last)?;
            if self.step != -1 {
                write!(f, " step {}", -self.step)?;
            }
        }
        Ok(())
    }
}

/// Result of evaluating an expression node.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Void,
    Boolean(bool),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    Str(StringValue),
    Array(ObjectId),
    Object(ObjectId),
    Range(RangeValue),
    /// Display-only stand-in for values that cannot be materialized (lambdas).
    Placeholder(String),
}

/// Width class used for binary numeric promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum NumKind {
    Int,
    Long,
    Float,
    Double,
}

impl Value {
    pub fn str(text: impl Into<String>) -> Value {
        Value::Str(StringValue::local(text))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Stop-worthy for a breakpoint condition: anything but `null` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Null | Value::Boolean(false))
    }

    /// Remote handle for reference values that live in the target.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            Value::Array(id) | Value::Object(id) => Some(*id),
            Value::Str(s) => s.handle,
            _ => None,
        }
    }

    /// Name of the primitive kind, `None` for references and local-only values.
    pub fn primitive_name(&self) -> Option<&'static str> {
        Some(match self {
            Value::Boolean(_) => "boolean",
            Value::Byte(_) => "byte",
            Value::Short(_) => "short",
            Value::Int(_) => "int",
            Value::Long(_) => "long",
            Value::Float(_) => "float",
            Value::Double(_) => "double",
            Value::Char(_) => "char",
            _ => return None,
        })
    }

    pub(crate) fn num_kind(&self) -> Option<NumKind> {
        Some(match self {
            Value::Byte(_) | Value::Short(_) | Value::Int(_) | Value::Char(_) => NumKind::Int,
            Value::Long(_) => NumKind::Long,
            Value::Float(_) => NumKind::Float,
            Value::Double(_) => NumKind::Double,
            _ => return None,
        })
    }

    pub(crate) fn is_numeric(&self) -> bool {
        matches!(
            self,
            Value::Byte(_)
                | Value::Short(_)
                | Value::Int(_)
                | Value::Long(_)
                | Value::Float(_)
                | Value::Double(_)
        )
    }

    /// Integral view, chars included.
    pub(crate) fn as_i64(&self) -> Option<i64> {
        Some(match self {
            Value::Byte(v) => i64::from(*v),
            Value::Short(v) => i64::from(*v),
            Value::Int(v) => i64::from(*v),
            Value::Long(v) => *v,
            Value::Char(c) => i64::from(u32::from(*c)),
            _ => return None,
        })
    }

    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(f64::from(*v)),
            Value::Double(v) => Some(*v),
            other => other.as_i64().map(|v| v as f64),
        }
    }

    /// Primitive conversion with JVM narrowing semantics (truncation, saturating
    /// float-to-integer casts).
    pub(crate) fn convert_to(&self, primitive: &str) -> Option<Value> {
        if let Value::Boolean(b) = self {
            return (primitive == "boolean").then_some(Value::Boolean(*b));
        }
        let wide = self.as_i64();
        let float = self.as_f64()?;
        Some(match primitive {
            "byte" => Value::Byte(wide.map_or(float as i32 as i8, |v| v as i8)),
            "short" => Value::Short(wide.map_or(float as i32 as i16, |v| v as i16)),
            "int" => Value::Int(wide.map_or(float as i32, |v| v as i32)),
            "long" => Value::Long(wide.unwrap_or(float as i64)),
            "float" => Value::Float(wide.map_or(float as f32, |v| v as f32)),
            "double" => Value::Double(wide.map_or(float, |v| v as f64)),
            "char" => Value::Char(
                char::from_u32(wide.unwrap_or(float as i64) as u16 as u32).unwrap_or('\u{fffd}'),
            ),
            _ => return None,
        })
    }

    /// Values that map onto a remote value without touching the target.
    pub(crate) fn to_remote_primitive(&self) -> Option<RemoteValue> {
        Some(match self {
            Value::Null => RemoteValue::Null,
            Value::Void => RemoteValue::Void,
            Value::Boolean(v) => RemoteValue::Boolean(*v),
            Value::Byte(v) => RemoteValue::Byte(*v),
            Value::Short(v) => RemoteValue::Short(*v),
            Value::Int(v) => RemoteValue::Int(*v),
            Value::Long(v) => RemoteValue::Long(*v),
            Value::Float(v) => RemoteValue::Float(*v),
            Value::Double(v) => RemoteValue::Double(*v),
            Value::Char(v) => RemoteValue::Char(*v),
            Value::Array(id) => RemoteValue::Array(*id),
            Value::Object(id) => RemoteValue::Object(*id),
            Value::Str(StringValue {
                handle: Some(id), ..
            }) => RemoteValue::String(*id),
            _ => return None,
        })
    }
}
