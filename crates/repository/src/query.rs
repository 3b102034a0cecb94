//! Storage-neutral query description.
//!
//! Criteria transform a `Query`; a `RecordStore` executes it. Queries are
//! plain data so they can be logged and compared.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored row, keyed by column name.
pub type Record = serde_json::Map<String, Value>;

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    /// SQL `LIKE` with `%` and `_` wildcards, case-insensitive.
    Like,
    /// Membership in a JSON array value.
    In,
}

impl Operator {
    /// Parse the SQL spelling of an operator (`=`, `!=`, `<>`, `>=`, `like`, ...).
    pub fn parse(op: &str) -> Option<Self> {
        match op.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Some(Operator::Eq),
            "!=" | "<>" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            "like" => Some(Operator::Like),
            "in" => Some(Operator::In),
            _ => None,
        }
    }
}

/// How a filter combines with the filters before it.
///
/// `And` binds tighter than `Or`, as in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Joiner {
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: Operator,
    pub value: Value,
    pub joiner: Joiner,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Asc,
    Desc,
}

/// A query against one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub entity: String,
    pub filters: Vec<Filter>,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<usize>,
    /// Projected columns; `None` selects every column.
    pub columns: Option<Vec<String>>,
}

impl Query {
    pub fn new(entity: impl Into<String>) -> Self {
        Self { entity: entity.into(), filters: Vec::new(), order: Vec::new(), limit: None, columns: None }
    }

    pub fn filter(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.filters.push(Filter { field: field.into(), op, value: value.into(), joiner: Joiner::And });
        self
    }

    pub fn or_filter(mut self, field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        self.filters.push(Filter { field: field.into(), op, value: value.into(), joiner: Joiner::Or });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order.push((field.into(), direction));
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Restrict the returned columns. `["*"]` or an empty list selects everything.
    pub fn select(mut self, columns: &[&str]) -> Self {
        self.columns = if columns.is_empty() || columns == ["*"] {
            None
        } else {
            Some(columns.iter().map(|c| (*c).to_string()).collect())
        };
        self
    }

    /// Append a condition produced by `find_where`.
    pub fn condition(self, condition: &Condition, joiner: Joiner) -> Self {
        let (field, op, value) = match condition {
            Condition::Eq { field, value } => (field.clone(), Operator::Eq, value.clone()),
            Condition::Compare { field, op, value } => (field.clone(), *op, value.clone()),
        };
        match joiner {
            Joiner::And => self.filter(field, op, value),
            Joiner::Or => self.or_filter(field, op, value),
        }
    }
}

/// One `find_where` condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Condition {
    /// `field = value`
    Eq { field: String, value: Value },
    /// `field <op> value`
    Compare { field: String, op: Operator, value: Value },
}

impl Condition {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Condition::Eq { field: field.into(), value: value.into() }
    }

    pub fn compare(field: impl Into<String>, op: Operator, value: impl Into<Value>) -> Self {
        Condition::Compare { field: field.into(), op, value: value.into() }
    }
}

/// Full pagination counts every match; simple pagination only looks one row ahead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageMode {
    #[default]
    Full,
    Simple,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    pub data: Vec<Record>,
    pub per_page: usize,
    /// 1-based.
    pub current_page: usize,
    /// Total matches; `None` in simple mode.
    pub total: Option<usize>,
    pub has_more: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_parse() {
        assert_eq!(Operator::parse("="), Some(Operator::Eq));
        assert_eq!(Operator::parse("<>"), Some(Operator::Ne));
        assert_eq!(Operator::parse(" LIKE "), Some(Operator::Like));
        assert_eq!(Operator::parse(">="), Some(Operator::Gte));
        assert_eq!(Operator::parse("between"), None);
    }

    #[test]
    fn test_select_star_means_all_columns() {
        assert_eq!(Query::new("users").select(&["*"]).columns, None);
        assert_eq!(Query::new("users").select(&[]).columns, None);
        assert_eq!(Query::new("users").select(&["id", "name"]).columns, Some(vec!["id".into(), "name".into()]));
    }

    #[test]
    fn test_condition_appends_filter() {
        let query = Query::new("users")
            .condition(&Condition::eq("status", "active"), Joiner::And)
            .condition(&Condition::compare("age", Operator::Gt, 30), Joiner::Or);

        assert_eq!(query.filters.len(), 2);
        assert_eq!(query.filters[0].op, Operator::Eq);
        assert_eq!(query.filters[1].joiner, Joiner::Or);
        assert_eq!(query.filters[1].value, json!(30));
    }

    #[test]
    fn test_condition_serialization_is_tagged() {
        let value = serde_json::to_value(Condition::eq("status", "active")).unwrap();
        assert_eq!(value, json!({ "kind": "eq", "field": "status", "value": "active" }));
    }
}
