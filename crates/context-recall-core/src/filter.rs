//! Metadata filter expressions.
//!
//! A small tagged union (equality, membership, numeric range, and/or)
//! that retrievers build and each backend translates into its own native
//! filter syntax at the boundary. [`Filter::matches`] evaluates an
//! expression directly against a metadata map for in-memory backends.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::Metadata;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Filter {
    /// `field == value`
    Eq { field: String, value: Value },
    /// `field` equals any of `values`.
    In { field: String, values: Vec<Value> },
    /// Inclusive numeric range; an open bound is `None`.
    Range {
        field: String,
        gte: Option<f64>,
        lte: Option<f64>,
    },
    And(Vec<Filter>),
    Or(Vec<Filter>),
}

impl Filter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::Eq {
            field: field.into(),
            value: value.into(),
        }
    }

    /// Membership filter; a single value collapses to [`Filter::Eq`].
    pub fn any_of<V: Into<Value>>(
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let field = field.into();
        let mut values: Vec<Value> = values.into_iter().map(Into::into).collect();
        if values.len() == 1 {
            if let Some(value) = values.pop() {
                return Self::Eq { field, value };
            }
        }
        Self::In { field, values }
    }

    /// Range filter, or `None` when both bounds are open.
    pub fn range(field: impl Into<String>, gte: Option<f64>, lte: Option<f64>) -> Option<Self> {
        if gte.is_none() && lte.is_none() {
            return None;
        }
        Some(Self::Range {
            field: field.into(),
            gte,
            lte,
        })
    }

    /// Conjunction that flattens nested `And`s and unwraps a single clause.
    ///
    /// Returns `None` for an empty clause list.
    pub fn all(clauses: impl IntoIterator<Item = Filter>) -> Option<Self> {
        let mut flat = Vec::new();
        for clause in clauses {
            match clause {
                Filter::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => None,
            1 => flat.pop(),
            _ => Some(Filter::And(flat)),
        }
    }

    /// Evaluate against a metadata map. Missing fields never match.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Filter::Eq { field, value } => metadata
                .get(field)
                .is_some_and(|v| values_equal(v, value)),
            Filter::In { field, values } => metadata
                .get(field)
                .is_some_and(|v| values.iter().any(|candidate| values_equal(v, candidate))),
            Filter::Range { field, gte, lte } => {
                let Some(n) = metadata.get(field).and_then(Value::as_f64) else {
                    return false;
                };
                gte.map_or(true, |lo| n >= lo) && lte.map_or(true, |hi| n <= hi)
            }
            Filter::And(clauses) => clauses.iter().all(|c| c.matches(metadata)),
            Filter::Or(clauses) => clauses.iter().any(|c| c.matches(metadata)),
        }
    }
}

/// Numbers compare by value so `1` matches `1.0`.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => (x - y).abs() < f64::EPSILON,
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(v: Value) -> Metadata {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_eq_and_missing_field() {
        let m = meta(json!({ "app_id": "a1" }));
        assert!(Filter::eq("app_id", "a1").matches(&m));
        assert!(!Filter::eq("app_id", "a2").matches(&m));
        assert!(!Filter::eq("user_id", "u").matches(&m));
    }

    #[test]
    fn test_any_of_collapses_single_value() {
        assert_eq!(
            Filter::any_of("source_type", ["memory"]),
            Filter::eq("source_type", "memory")
        );
        let f = Filter::any_of("source_type", ["twitter", "notion"]);
        assert!(f.matches(&meta(json!({ "source_type": "notion" }))));
        assert!(!f.matches(&meta(json!({ "source_type": "gmail" }))));
    }

    #[test]
    fn test_range_bounds_inclusive() {
        let f = Filter::range("created_at", Some(10.0), Some(20.0)).unwrap();
        assert!(f.matches(&meta(json!({ "created_at": 10 }))));
        assert!(f.matches(&meta(json!({ "created_at": 20 }))));
        assert!(!f.matches(&meta(json!({ "created_at": 21 }))));
        assert!(!f.matches(&meta(json!({ "created_at": "15" }))));
        assert!(Filter::range("created_at", None, None).is_none());
    }

    #[test]
    fn test_all_flattens() {
        let inner = Filter::all([Filter::eq("a", 1), Filter::eq("b", 2)]).unwrap();
        let outer = Filter::all([inner, Filter::eq("c", 3)]).unwrap();
        match outer {
            Filter::And(clauses) => assert_eq!(clauses.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
        assert_eq!(Filter::all([Filter::eq("a", 1)]), Some(Filter::eq("a", 1)));
        assert_eq!(Filter::all(Vec::new()), None);
    }

    #[test]
    fn test_or() {
        let f = Filter::Or(vec![Filter::eq("a", 1), Filter::eq("b", 2)]);
        assert!(f.matches(&meta(json!({ "b": 2.0 }))));
        assert!(!f.matches(&meta(json!({ "a": 2 }))));
    }
}
