//! Numeric field modification policy.
//!
//! Increments and decrements read the current cell text leniently: the
//! longest leading decimal number is used, and anything else (empty cells,
//! words, currency prefixes) counts as zero. Accumulated totals depend on
//! this, so it must not become stricter.

use std::sync::OnceLock;

use regex::Regex;

/// What to do to a numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Modification {
    /// Replace the value
    Set(f64),
    /// Add to the current value
    Increase(f64),
    /// Subtract from the current value
    Decrease(f64),
}

impl Modification {
    /// Pick the modification from the spoken parameters.
    /// A literal value beats an increment, which beats a decrement.
    pub fn from_params(
        value: Option<f64>,
        increment: Option<f64>,
        decrement: Option<f64>,
    ) -> Option<Self> {
        value
            .map(Modification::Set)
            .or(increment.map(Modification::Increase))
            .or(decrement.map(Modification::Decrease))
    }

    /// New value given the current cell text.
    pub fn apply(&self, current: &str) -> f64 {
        match *self {
            Modification::Set(n) => n,
            Modification::Increase(delta) => parse_cell_number(current) + delta,
            Modification::Decrease(delta) => parse_cell_number(current) - delta,
        }
    }

    /// Verb for "... has been {verb} from A to B".
    pub fn past_tense(&self) -> &'static str {
        match self {
            Modification::Set(_) => "changed",
            Modification::Increase(_) => "increased",
            Modification::Decrease(_) => "decreased",
        }
    }
}

static NUMBER_PREFIX: OnceLock<Regex> = OnceLock::new();

/// Lenient number parse of cell text. Never fails; non-numbers are `0.0`.
pub fn parse_cell_number(text: &str) -> f64 {
    let re = NUMBER_PREFIX.get_or_init(|| {
        Regex::new(r"^[ \t\n\r\x0B\x0C]*([+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?)").unwrap()
    });
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|n| n.is_finite())
        .unwrap_or(0.0)
}

/// JSON number for a computed value. Integral values become JSON integers
/// so the backend sees `13`, not `13.0`.
pub fn number_value(n: f64) -> serde_json::Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0; // 2^53
    if n.is_finite() && n.fract() == 0.0 && n.abs() <= MAX_EXACT {
        serde_json::Value::from(n as i64)
    } else {
        serde_json::Value::from(n)
    }
}

/// Human-readable number for spoken responses: 14 significant digits,
/// no trailing `.0`.
pub fn format_number(n: f64) -> String {
    if !n.is_finite() {
        return n.to_string();
    }
    let rounded: f64 = format!("{:.13e}", n).parse().unwrap_or(n);
    rounded.to_string()
}
