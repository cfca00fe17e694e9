//! Grammar of the relative and absolute values found on modifier scopes.
//!
//! | Form              | Example          | Variant                     |
//! |-------------------|------------------|-----------------------------|
//! | percentage delta  | `+20%`, `-7.5%`  | [`Value::PercentDelta`]     |
//! | semitones delta   | `+2st`, `-0.5st` | [`Value::SemitonesDelta`]   |
//! | number delta      | `+15`, `-27.3`   | [`Value::NumberDelta`]      |
//! | unsigned semitones| `12st`           | [`Value::Semitones`]        |
//! | unsigned number   | `180`, `50.4`    | [`Value::Number`]           |
//!
//! Integer variants are rounded half-up, fractional semitones are kept.
//! Every integer is held within [`VALUE_LIMIT`], and so is every quantity
//! derived from one through [`percent_of`] and [`bounded`].

/// A classified attribute value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    PercentDelta(i32),
    SemitonesDelta(f64),
    NumberDelta(i32),
    Semitones(f64),
    Number(i32),
}

/// Multiplicative frequency factor for one semitone (2^(1/12), as tabulated).
pub const SEMITONE_FACTOR: f64 = 1.0595;

/// Largest magnitude of an attribute value or of a setting, duration or
/// frequency derived from one.
pub const VALUE_LIMIT: i32 = 1_000_000;

/// Classify `raw`, returning `None` for anything outside the grammar.
pub fn parse_value(raw: &str) -> Option<Value> {
    let s = raw.trim();
    if let Some(num) = s.strip_suffix('%') {
        return signed_number(num).map(|v| Value::PercentDelta(round(v)));
    }
    if let Some(num) = s.strip_suffix("st") {
        if let Some(v) = signed_number(num) {
            return Some(Value::SemitonesDelta(v));
        }
        return unsigned_number(num).map(Value::Semitones);
    }
    if let Some(v) = signed_number(s) {
        return Some(Value::NumberDelta(round(v)));
    }
    unsigned_number(s).map(|v| Value::Number(round(v)))
}

/// The percentage delta carried by `raw`, or 0 when it is not one.
pub fn percentage_delta(raw: &str) -> i32 {
    match parse_value(raw) {
        Some(Value::PercentDelta(p)) => p,
        _ => {
            if !raw.trim().is_empty() {
                log::debug!("Ignoring `{raw}': not a percentage delta");
            }
            0
        }
    }
}

/// Parse a plain (signed or unsigned) number, rounded half-up.
pub fn number(raw: &str) -> Option<i32> {
    finite(raw.trim()).map(round)
}

/// Frequency factor for a change of `semitones`.
pub fn semitone_factor(semitones: f64) -> f64 {
    SEMITONE_FACTOR.powf(semitones)
}

fn signed_number(s: &str) -> Option<f64> {
    let rest = s.strip_prefix('+').or_else(|| s.strip_prefix('-'))?;
    let magnitude = unsigned_number(rest)?;
    Some(if s.starts_with('-') { -magnitude } else { magnitude })
}

fn unsigned_number(s: &str) -> Option<f64> {
    if s.is_empty() || s.starts_with('+') || s.starts_with('-') {
        return None;
    }
    finite(s)
}

fn finite(s: &str) -> Option<f64> {
    s.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `value * percent / 100`, truncated toward zero and held within
/// [`VALUE_LIMIT`].
pub fn percent_of(value: i32, percent: i32) -> i32 {
    bounded(i64::from(value) * i64::from(percent) / 100)
}

/// Clamp a widened intermediate result into `±VALUE_LIMIT`.
pub fn bounded(v: i64) -> i32 {
    v.clamp(-i64::from(VALUE_LIMIT), i64::from(VALUE_LIMIT)) as i32
}

/// Truncate a scaled value toward zero, held within [`VALUE_LIMIT`].
/// NaN maps to 0.
pub fn bounded_f64(v: f64) -> i32 {
    bounded(v as i64)
}

fn round(v: f64) -> i32 {
    bounded_f64((v + 0.5).floor())
}
