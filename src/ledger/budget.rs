use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Budget for one `(profile, month)` pair: an overall ceiling plus optional
/// per-category limits. Created lazily on first write; absent months read as
/// the zero/empty default.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MonthlyBudget {
    #[serde(default)]
    pub overall: f64,
    #[serde(default)]
    pub per_category: BTreeMap<String, f64>,
}

impl MonthlyBudget {
    pub fn is_empty(&self) -> bool {
        self.overall == 0.0 && self.per_category.is_empty()
    }

    /// Per-category limit, zero when unset.
    pub fn category_limit(&self, category_id: &str) -> f64 {
        self.per_category.get(category_id).copied().unwrap_or(0.0)
    }

    /// Remote document shape: `{"budget": n, "categoryBudgets": {...}}`.
    pub fn to_document(&self) -> Value {
        json!({
            "budget": self.overall,
            "categoryBudgets": self.per_category,
        })
    }

    /// Reads the remote document shape; missing docs or fields read as the
    /// empty default rather than an error.
    pub fn from_document(doc: Option<&Value>) -> Self {
        let Some(doc) = doc else {
            return Self::default();
        };
        let overall = doc.get("budget").and_then(Value::as_f64).unwrap_or(0.0);
        let per_category = doc
            .get("categoryBudgets")
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or_default();
        Self {
            overall,
            per_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_document_reads_as_empty_default() {
        let budget = MonthlyBudget::from_document(None);
        assert!(budget.is_empty());
        assert_eq!(budget.category_limit("1"), 0.0);
    }

    #[test]
    fn document_round_trip() {
        let mut budget = MonthlyBudget {
            overall: 100_000.0,
            ..Default::default()
        };
        budget.per_category.insert("1".into(), 30_000.0);

        let doc = budget.to_document();
        assert_eq!(MonthlyBudget::from_document(Some(&doc)), budget);
    }

    #[test]
    fn malformed_fields_fall_back_to_defaults() {
        let doc = json!({"budget": "not a number", "categoryBudgets": 42});
        let budget = MonthlyBudget::from_document(Some(&doc));
        assert!(budget.is_empty());
    }
}
