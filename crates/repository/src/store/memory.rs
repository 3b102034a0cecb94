//! In-process record store.
//!
//! Evaluates `Query` values over JSON records held in memory. Used by the
//! test suites and by hosts that want a repository without a database.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use repocache_core::Error;
use serde_json::Value;
use tokio::sync::Mutex;

use super::RecordStore;
use crate::query::{Direction, Filter, Joiner, Operator, Page, PageMode, Query, Record};

#[derive(Debug, Default)]
struct Table {
    rows: Vec<Record>,
    next_id: i64,
}

impl Table {
    fn assign_id(&mut self, record: &mut Record) {
        match record.get("id").and_then(Value::as_i64) {
            Some(id) => self.next_id = self.next_id.max(id),
            None if !record.contains_key("id") => {
                self.next_id += 1;
                record.insert("id".into(), Value::from(self.next_id));
            }
            None => {}
        }
    }

    fn select(&self, query: &Query) -> Vec<&Record> {
        let mut rows: Vec<&Record> = self.rows.iter().filter(|r| matches(r, &query.filters)).collect();
        if !query.order.is_empty() {
            rows.sort_by(|a, b| order_records(a, b, &query.order));
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Records grouped by entity name, behind an async mutex.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert fixture rows. Rows without an `id` get the next integer.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidInput` if a row is not a JSON object.
    pub async fn seed(&self, entity: &str, rows: impl IntoIterator<Item = Value>) -> Result<(), Error> {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(entity.to_string()).or_default();
        for row in rows {
            let Value::Object(mut record) = row else {
                return Err(Error::InvalidInput(format!("seed rows for {entity} must be JSON objects")));
            };
            table.assign_id(&mut record);
            table.rows.push(record);
        }
        Ok(())
    }

    /// Number of rows stored for `entity`.
    pub async fn count(&self, entity: &str) -> usize {
        self.tables.lock().await.get(entity).map_or(0, |t| t.rows.len())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn fetch_one(&self, query: &Query) -> Result<Option<Record>, Error> {
        let tables = self.tables.lock().await;
        let Some(table) = tables.get(&query.entity) else {
            return Ok(None);
        };
        Ok(table.select(query).first().map(|r| project(r, query.columns.as_deref())))
    }

    async fn fetch_many(&self, query: &Query) -> Result<Vec<Record>, Error> {
        let tables = self.tables.lock().await;
        let Some(table) = tables.get(&query.entity) else {
            return Ok(Vec::new());
        };
        Ok(table.select(query).into_iter().map(|r| project(r, query.columns.as_deref())).collect())
    }

    async fn fetch_page(&self, query: &Query, per_page: usize, page: usize, mode: PageMode) -> Result<Page, Error> {
        if per_page == 0 {
            return Err(Error::InvalidInput("per_page must be greater than 0".into()));
        }
        let current_page = page.max(1);
        let offset = (current_page - 1).saturating_mul(per_page);

        let tables = self.tables.lock().await;
        let rows = tables.get(&query.entity).map(|t| t.select(query)).unwrap_or_default();

        let data: Vec<Record> = rows
            .iter()
            .skip(offset)
            .take(per_page)
            .map(|r| project(r, query.columns.as_deref()))
            .collect();
        let has_more = rows.len() > offset.saturating_add(per_page);
        let total = match mode {
            PageMode::Full => Some(rows.len()),
            PageMode::Simple => None,
        };

        Ok(Page { data, per_page, current_page, total, has_more })
    }

    async fn insert(&self, entity: &str, mut data: Record) -> Result<Record, Error> {
        let mut tables = self.tables.lock().await;
        let table = tables.entry(entity.to_string()).or_default();
        table.assign_id(&mut data);
        table.rows.push(data.clone());
        Ok(data)
    }

    async fn update_where(&self, query: &Query, data: &Record) -> Result<u64, Error> {
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(&query.entity) else {
            return Ok(0);
        };
        let mut updated = 0;
        for row in table.rows.iter_mut().filter(|r| matches(r, &query.filters)) {
            for (column, value) in data {
                row.insert(column.clone(), value.clone());
            }
            updated += 1;
        }
        Ok(updated)
    }

    async fn delete_where(&self, query: &Query) -> Result<u64, Error> {
        let mut tables = self.tables.lock().await;
        let Some(table) = tables.get_mut(&query.entity) else {
            return Ok(0);
        };
        let before = table.rows.len();
        table.rows.retain(|r| !matches(r, &query.filters));
        Ok((before - table.rows.len()) as u64)
    }
}

fn project(record: &Record, columns: Option<&[String]>) -> Record {
    match columns {
        None => record.clone(),
        Some(columns) => columns
            .iter()
            .filter_map(|c| record.get(c).map(|v| (c.clone(), v.clone())))
            .collect(),
    }
}

/// OR-separated groups of AND-ed filters.
fn matches(record: &Record, filters: &[Filter]) -> bool {
    let mut any_group = false;
    let mut group = true;
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 && filter.joiner == Joiner::Or {
            any_group |= group;
            group = true;
        }
        group = group && matches_filter(record, filter);
    }
    any_group || group
}

fn matches_filter(record: &Record, filter: &Filter) -> bool {
    let actual = record.get(&filter.field).unwrap_or(&Value::Null);
    let expected = &filter.value;
    match filter.op {
        Operator::Eq => values_equal(actual, expected),
        Operator::Ne => !values_equal(actual, expected),
        Operator::Gt => compare(actual, expected) == Some(Ordering::Greater),
        Operator::Gte => matches!(compare(actual, expected), Some(Ordering::Greater | Ordering::Equal)),
        Operator::Lt => compare(actual, expected) == Some(Ordering::Less),
        Operator::Lte => matches!(compare(actual, expected), Some(Ordering::Less | Ordering::Equal)),
        Operator::Like => match (actual.as_str(), expected.as_str()) {
            (Some(text), Some(pattern)) => like(text, pattern),
            _ => false,
        },
        Operator::In => expected
            .as_array()
            .is_some_and(|items| items.iter().any(|item| values_equal(actual, item))),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn order_records(a: &Record, b: &Record, order: &[(String, Direction)]) -> Ordering {
    for (field, direction) in order {
        let left = a.get(field).unwrap_or(&Value::Null);
        let right = b.get(field).unwrap_or(&Value::Null);
        let ordering = match (left.is_null(), right.is_null()) {
            (true, true) => Ordering::Equal,
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            (false, false) => compare(left, right).unwrap_or(Ordering::Equal),
        };
        let ordering = match direction {
            Direction::Asc => ordering,
            Direction::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

/// Case-insensitive SQL `LIKE`.
fn like(text: &str, pattern: &str) -> bool {
    let text: Vec<char> = text.to_lowercase().chars().collect();
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();

    // matched[j]: pattern prefix so far matches text[..j]
    let mut matched = vec![false; text.len() + 1];
    matched[0] = true;
    for &p in &pattern {
        let mut next = vec![false; text.len() + 1];
        if p == '%' {
            next[0] = matched[0];
        }
        for j in 1..=text.len() {
            next[j] = match p {
                '%' => matched[j] || next[j - 1],
                '_' => matched[j - 1],
                c => matched[j - 1] && c == text[j - 1],
            };
        }
        matched = next;
    }
    matched[text.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn users() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .seed(
                "users",
                vec![
                    json!({ "name": "Ada", "status": "active", "age": 36 }),
                    json!({ "name": "Grace", "status": "inactive", "age": 45 }),
                    json!({ "name": "Linus", "status": "active", "age": 28 }),
                ],
            )
            .await
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_seed_assigns_ids() {
        let store = users().await;
        let all = store.fetch_many(&Query::new("users")).await.unwrap();
        let ids: Vec<_> = all.iter().map(|r| r["id"].clone()).collect();
        assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);
    }

    #[tokio::test]
    async fn test_seed_rejects_non_objects() {
        let store = MemoryStore::new();
        let result = store.seed("users", vec![json!([1, 2])]).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_filters_and_or_precedence() {
        let store = users().await;
        // status = active AND age > 30 OR name = Grace
        let query = Query::new("users")
            .filter("status", Operator::Eq, "active")
            .filter("age", Operator::Gt, 30)
            .or_filter("name", Operator::Eq, "Grace");

        let names: Vec<_> = store
            .fetch_many(&query)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r["name"].clone())
            .collect();
        assert_eq!(names, vec![json!("Ada"), json!("Grace")]);
    }

    #[tokio::test]
    async fn test_order_limit_and_projection() {
        let store = users().await;
        let query = Query::new("users").order_by("age", Direction::Desc).limit(2).select(&["name"]);

        let rows = store.fetch_many(&query).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], json!({ "name": "Grace" }).as_object().unwrap().clone());
        assert_eq!(rows[1]["name"], json!("Ada"));
    }

    #[tokio::test]
    async fn test_like_and_in() {
        let store = users().await;
        let like = store
            .fetch_many(&Query::new("users").filter("name", Operator::Like, "%a%"))
            .await
            .unwrap();
        assert_eq!(like.len(), 2);

        let within = store
            .fetch_many(&Query::new("users").filter("id", Operator::In, json!([1, 3])))
            .await
            .unwrap();
        assert_eq!(within.len(), 2);
    }

    #[test]
    fn test_like_wildcards() {
        assert!(like("Grace Hopper", "grace%"));
        assert!(like("Ada", "_da"));
        assert!(like("Ada", "%"));
        assert!(!like("Ada", "_d"));
        assert!(!like("Linus", "%x%"));
    }

    #[tokio::test]
    async fn test_fetch_page_full_and_simple() {
        let store = users().await;
        let query = Query::new("users").order_by("id", Direction::Asc);

        let full = store.fetch_page(&query, 2, 1, PageMode::Full).await.unwrap();
        assert_eq!(full.data.len(), 2);
        assert_eq!(full.total, Some(3));
        assert!(full.has_more);

        let last = store.fetch_page(&query, 2, 2, PageMode::Simple).await.unwrap();
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.total, None);
        assert!(!last.has_more);

        let result = store.fetch_page(&query, 0, 1, PageMode::Full).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_insert_update_delete() {
        let store = users().await;
        let inserted = store
            .insert("users", json!({ "name": "Barbara" }).as_object().unwrap().clone())
            .await
            .unwrap();
        assert_eq!(inserted["id"], json!(4));

        let by_id = Query::new("users").filter("id", Operator::Eq, 4);
        let patch = json!({ "status": "active" }).as_object().unwrap().clone();
        assert_eq!(store.update_where(&by_id, &patch).await.unwrap(), 1);
        assert_eq!(store.fetch_one(&by_id).await.unwrap().unwrap()["status"], json!("active"));

        assert_eq!(store.delete_where(&by_id).await.unwrap(), 1);
        assert_eq!(store.count("users").await, 3);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_empty() {
        let store = MemoryStore::new();
        assert!(store.fetch_many(&Query::new("ghosts")).await.unwrap().is_empty());
        assert!(store.fetch_one(&Query::new("ghosts")).await.unwrap().is_none());
    }
}
