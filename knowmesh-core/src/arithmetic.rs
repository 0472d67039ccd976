//! Arithmetic fallback: `<int> <op> <int>` with `+ - * /`, anchored on both ends.

use regex::Regex;

use crate::config::EngineConfig;
use crate::error::KnowMeshError;

const EXPRESSION: &str = r"^([0-9]+)\s*([-+*/])\s*([0-9]+)$";

/// Largest magnitude printed in plain positional notation; beyond it the
/// result switches to exponent form (`1e+21`).
const POSITIONAL_LIMIT: f64 = 1e21;
const EXPONENT_BELOW: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct ArithmeticEvaluator {
    expression: Regex,
    label: String,
    divide_by_zero: String,
}

impl ArithmeticEvaluator {
    pub fn new(
        label: impl Into<String>,
        divide_by_zero: impl Into<String>,
    ) -> Result<Self, KnowMeshError> {
        Ok(Self {
            expression: Regex::new(EXPRESSION)?,
            label: label.into(),
            divide_by_zero: divide_by_zero.into(),
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self, KnowMeshError> {
        Self::new(config.math_label.clone(), config.divide_by_zero.clone())
    }

    /// `Some("<label>: <result>")`, the divide-by-zero sentinel, or `None` when
    /// the input is not a single binary expression.
    pub fn try_evaluate(&self, input: &str) -> Option<String> {
        let caps = self.expression.captures(input)?;
        let lhs: f64 = caps[1].parse().ok()?;
        let rhs: f64 = caps[3].parse().ok()?;

        let result = match &caps[2] {
            "+" => lhs + rhs,
            "-" => lhs - rhs,
            "*" => lhs * rhs,
            "/" => {
                if rhs == 0.0 {
                    return Some(self.divide_by_zero.clone());
                }
                lhs / rhs
            }
            _ => return None,
        };

        Some(format!("{}: {}", self.label, format_number(result)))
    }
}

/// Shortest round-trip rendering in ECMAScript `Number#toString` form:
/// integral values without a fraction, magnitudes of 1e21 and above or below
/// 1e-6 in exponent form (`1e+21`, `1e-7`).
pub fn format_number(value: f64) -> String {
    if !value.is_finite() {
        return if value.is_nan() {
            "NaN".to_string()
        } else if value > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    if value.abs() >= POSITIONAL_LIMIT {
        let formatted = format!("{value:e}");
        return match formatted.split_once('e') {
            Some((mantissa, exp)) if !exp.starts_with('-') => format!("{mantissa}e+{exp}"),
            _ => formatted,
        };
    }
    if value == 0.0 {
        // Covers -0.
        return "0".to_string();
    }
    if value.abs() < EXPONENT_BELOW {
        return format!("{value:e}");
    }
    format!("{value}")
}
