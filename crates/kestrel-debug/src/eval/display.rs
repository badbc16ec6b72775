//! Text forms of evaluated values.

use crate::eval::types::simple_type_name;

macro_rules! jvm_float_string {
    ($value:expr) => {{
        let value = $value;
        if value.is_nan() {
            "NaN".to_string()
        } else if value.is_infinite() {
            let text = if value > 0.0 { "Infinity" } else { "-Infinity" };
            text.to_string()
        } else {
            let magnitude = value.abs();
            if magnitude != 0.0 && !(1e-3..1e7).contains(&magnitude) {
                let sci = format!("{:e}", value);
                let (mantissa, exponent) = sci.split_once('e').unwrap_or((&sci, "0"));
                if mantissa.contains('.') {
                    format!("{mantissa}E{exponent}")
                } else {
                    format!("{mantissa}.0E{exponent}")
                }
            } else {
                let plain = value.to_string();
                if plain.contains('.') {
                    plain
                } else {
                    format!("{plain}.0")
                }
            }
        }
    }};
}

/// `Double.toString`-style rendering: `3.0`, `0.1`, `1.0E10`, `NaN`, `Infinity`.
pub fn format_double(value: f64) -> String {
    jvm_float_string!(value)
}

pub fn format_float(value: f32) -> String {
    jvm_float_string!(value)
}

/// Cut `text` to at most `max_chars` characters, marking the cut with `…`.
pub fn truncate_display(text: &str, max_chars: usize) -> String {
    let mut out = String::new();
    for (used, ch) in text.chars().enumerate() {
        if used >= max_chars {
            out.push('…');
            break;
        }
        out.push(ch);
    }
    out
}

/// `int[3]` for an `int[]` of length 3.
pub fn array_display(type_name: &str, length: usize) -> String {
    let simple = simple_type_name(type_name);
    match simple.strip_suffix("[]") {
        Some(element) => format!("{element}[{length}]"),
        None => format!("{simple}[{length}]"),
    }
}

/// Fallback for objects whose `toString()` cannot be run.
pub fn identity_display(type_name: &str, object: u64) -> String {
    format!("{}@{object:x}", simple_type_name(type_name))
}
