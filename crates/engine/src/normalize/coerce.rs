//! Lenient scalar coercions for loosely-typed JSON fields.
//!
//! Each helper returns `None` when the value cannot be interpreted, so
//! callers can fall through to the next alias or the default.

use std::str::FromStr;

use cart_sync_core::{ProductId, Quantity};
use rust_decimal::Decimal;
use serde_json::Value;

/// First candidate that coerces successfully.
pub(super) fn first_of<T>(
    candidates: &[Option<&Value>],
    coerce: impl Fn(&Value) -> Option<T>,
) -> Option<T> {
    candidates.iter().copied().flatten().find_map(coerce)
}

/// Non-empty text from a string or number.
pub(super) fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Product id from a scalar, or from the `_id`/`id` of a nested object.
pub(super) fn product_id(value: &Value) -> Option<ProductId> {
    match value {
        Value::Object(map) => first_of(&[map.get("_id"), map.get("id")], product_id),
        other => text(other).map(ProductId::new),
    }
}

/// Decimal from a number or a numeric string (a leading `$` is tolerated).
pub(super) fn decimal(value: &Value) -> Option<Decimal> {
    let raw = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().trim_start_matches('$').to_string(),
        _ => return None,
    };
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

/// Quantity of at least one from an integer, integral float, or numeric string.
pub(super) fn quantity(value: &Value) -> Option<Quantity> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(f64_to_i64))
            .and_then(Quantity::from_i64),
        Value::String(s) => s.trim().parse::<i64>().ok().and_then(Quantity::from_i64),
        _ => None,
    }
}

/// First string entry of an array.
pub(super) fn first_text(value: &Value) -> Option<String> {
    value.as_array()?.iter().find_map(text)
}

#[allow(clippy::cast_possible_truncation)] // integral floats only; saturates on overflow
const fn f64_to_i64(f: f64) -> i64 {
    f as i64
}
