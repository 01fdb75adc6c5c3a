//! `<dotPath> <op> <value>` conditions, parsed once at catalog load.

use serde_json::Value;
use sim_core::path::StateView;
use std::fmt;
use std::str::FromStr;

use crate::EventError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
}

impl CompareOp {
    fn symbol(self) -> &'static str {
        match self {
            CompareOp::Gt => ">",
            CompareOp::Lt => "<",
            CompareOp::Ge => ">=",
            CompareOp::Le => "<=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        }
    }

    fn compare_f64(self, a: f64, b: f64) -> bool {
        match self {
            CompareOp::Gt => a > b,
            CompareOp::Lt => a < b,
            CompareOp::Ge => a >= b,
            CompareOp::Le => a <= b,
            CompareOp::Eq => (a - b).abs() < 1e-9,
            CompareOp::Ne => (a - b).abs() >= 1e-9,
        }
    }
}

impl FromStr for CompareOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            ">" => CompareOp::Gt,
            "<" => CompareOp::Lt,
            ">=" => CompareOp::Ge,
            "<=" => CompareOp::Le,
            "==" => CompareOp::Eq,
            "!=" => CompareOp::Ne,
            other => return Err(format!("unknown operator '{other}'")),
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Threshold {
    Number(f64),
    Text(String),
}

/// A compiled comparison against a state path.
#[derive(Clone, Debug, PartialEq)]
pub struct Condition {
    pub path: String,
    pub op: CompareOp,
    pub threshold: Threshold,
}

impl Condition {
    pub fn parse(text: &str) -> Result<Self, EventError> {
        let invalid = |reason: String| EventError::InvalidCondition {
            text: text.to_string(),
            reason,
        };
        let parts: Vec<&str> = text.split_whitespace().collect();
        let [path, op, value] = parts.as_slice() else {
            return Err(invalid("expected '<path> <op> <value>'".into()));
        };
        let op = op.parse::<CompareOp>().map_err(invalid)?;
        let threshold = match value.parse::<f64>() {
            Ok(n) if n.is_finite() => Threshold::Number(n),
            _ => {
                if !matches!(op, CompareOp::Eq | CompareOp::Ne) {
                    return Err(invalid("text values only support == and !=".into()));
                }
                Threshold::Text(value.to_string())
            }
        };
        Ok(Self { path: path.to_string(), op, threshold })
    }

    /// Evaluate against a captured view. Missing numeric paths read as 0.
    pub fn evaluate(&self, view: &StateView) -> bool {
        match &self.threshold {
            Threshold::Number(t) => {
                let current = match view.get(&self.path) {
                    Some(Value::String(s)) => s.parse::<f64>().unwrap_or(0.0),
                    _ => view.number_or_zero(&self.path),
                };
                self.op.compare_f64(current, *t)
            }
            Threshold::Text(t) => {
                let current = match view.get(&self.path) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                };
                match self.op {
                    CompareOp::Eq => current == *t,
                    CompareOp::Ne => current != *t,
                    _ => false,
                }
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.threshold {
            Threshold::Number(n) => write!(f, "{} {} {}", self.path, self.op.symbol(), n),
            Threshold::Text(t) => write!(f, "{} {} {}", self.path, self.op.symbol(), t),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_core::testing::sample_country;

    fn view() -> StateView {
        StateView::capture(&sample_country()).unwrap()
    }

    #[test]
    fn parses_numeric_and_text_conditions() {
        let c = Condition::parse("economy.debt.debt_to_gdp_percent > 80").unwrap();
        assert_eq!(c.op, CompareOp::Gt);
        assert_eq!(c.threshold, Threshold::Number(80.0));
        let t = Condition::parse("economy.debt.credit_rating == AAA").unwrap();
        assert_eq!(t.threshold, Threshold::Text("AAA".into()));
        assert_eq!(t.to_string(), "economy.debt.credit_rating == AAA");
    }

    #[test]
    fn rejects_malformed_conditions() {
        assert!(Condition::parse("economy.gdp_billions_usd >").is_err());
        assert!(Condition::parse("a =~ 3").is_err());
        assert!(Condition::parse("economy.debt.credit_rating > AAA").is_err());
    }

    #[test]
    fn evaluates_against_state() {
        let v = view();
        assert!(Condition::parse("economy.gdp_billions_usd >= 1200").unwrap().evaluate(&v));
        assert!(Condition::parse("indices.happiness < 61").unwrap().evaluate(&v));
        assert!(Condition::parse("economy.debt.credit_rating == AA").unwrap().evaluate(&v));
        assert!(Condition::parse("economy.debt.credit_rating != AAA").unwrap().evaluate(&v));
        assert!(!Condition::parse("indices.happiness == 10").unwrap().evaluate(&v));
    }

    #[test]
    fn missing_path_reads_as_zero() {
        let v = view();
        assert!(Condition::parse("indices.unknown_index == 0").unwrap().evaluate(&v));
        assert!(!Condition::parse("indices.unknown_index > 0").unwrap().evaluate(&v));
    }
}
