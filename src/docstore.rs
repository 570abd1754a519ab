//! Document-style access over relational tables.
//!
//! Callers speak camelCase documents (`collection("atestados").filter(...)`),
//! the tables underneath use snake_case columns. Keys are translated on
//! every call; values pass through untouched.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::store::{Direction, Filter, Operator, Row, RowQuery, RowRange, RowStore, StoreError};

pub fn to_snake_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len() + 4);
    for c in key.chars() {
        if c.is_ascii_uppercase() {
            out.push('_');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn to_camel_case(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    let mut upper_next = false;
    for c in key.chars() {
        if c == '_' && !out.is_empty() {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

fn keys_to_snake(map: Map<String, Value>) -> Row {
    map.into_iter().map(|(k, v)| (to_snake_case(&k), v)).collect()
}

fn keys_to_camel(row: Row) -> Map<String, Value> {
    row.into_iter().map(|(k, v)| (to_camel_case(&k), v)).collect()
}

fn into_object<T: Serialize>(payload: &T) -> Result<Map<String, Value>, StoreError> {
    match serde_json::to_value(payload)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(format!(
            "expected an object payload, got {}",
            other
        ))),
    }
}

/// Shared handle to the table store. Cloning is cheap.
#[derive(Clone)]
pub struct DocumentStore {
    rows: Arc<dyn RowStore>,
}

impl DocumentStore {
    pub fn new(rows: Arc<dyn RowStore>) -> Self {
        Self { rows }
    }

    pub fn collection(&self, name: &str) -> Query {
        Query {
            rows: self.rows.clone(),
            table: name.to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
            offset: None,
        }
    }

    pub async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.rows.count(collection).await
    }
}

pub struct Query {
    rows: Arc<dyn RowStore>,
    table: String,
    filters: Vec<Filter>,
    order: Option<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl Query {
    pub fn filter<V: Into<Value>>(mut self, field: &str, op: Operator, value: V) -> Self {
        self.filters.push(Filter {
            column: to_snake_case(field),
            op,
            value: value.into(),
        });
        self
    }

    /// Same as [`Query::filter`] with the operator given as text (`"=="`,
    /// `"in"`, `">"`, `"<"`). Anything else is an error, never a guess.
    pub fn where_op<V: Into<Value>>(self, field: &str, op: &str, value: V) -> Result<Self, StoreError> {
        let op = op.parse::<Operator>()?;
        Ok(self.filter(field, op, value))
    }

    pub fn order_by(mut self, field: &str, direction: Direction) -> Self {
        self.order = Some((to_snake_case(field), direction));
        self
    }

    pub fn limit(mut self, n: u64) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(mut self, n: u64) -> Self {
        self.offset = Some(n);
        self
    }

    pub fn doc(&self, id: &str) -> DocumentRef {
        DocumentRef {
            rows: self.rows.clone(),
            table: self.table.clone(),
            id: id.to_string(),
        }
    }

    fn range(&self) -> Option<RowRange> {
        match (self.limit, self.offset) {
            (None, None) => None,
            (Some(limit), offset) => {
                let from = offset.unwrap_or(0);
                Some(RowRange {
                    from,
                    to: Some((from + limit).saturating_sub(1)),
                })
            }
            (None, Some(from)) => Some(RowRange { from, to: None }),
        }
    }

    fn row_query(&self) -> RowQuery {
        RowQuery {
            table: self.table.clone(),
            filters: self.filters.clone(),
            order: self.order.clone(),
            range: self.range(),
        }
    }

    pub async fn get(&self) -> Result<QuerySnapshot, StoreError> {
        if self.limit == Some(0) {
            return Ok(QuerySnapshot { docs: Vec::new() });
        }
        let rows = self.rows.select(&self.row_query()).await?;
        let docs = rows.into_iter().map(DocumentSnapshot::from_row).collect();
        Ok(QuerySnapshot { docs })
    }

    /// Inserts one document, assigning a fresh id when the payload has none.
    pub async fn add<T: Serialize>(&self, payload: &T) -> Result<String, StoreError> {
        let mut row = keys_to_snake(into_object(payload)?);
        if !matches!(row.get("id"), Some(Value::String(_))) {
            row.insert("id".to_string(), Value::String(Uuid::new_v4().to_string()));
        }
        self.rows.insert(&self.table, row).await
    }
}

pub struct DocumentRef {
    rows: Arc<dyn RowStore>,
    table: String,
    id: String,
}

impl DocumentRef {
    pub async fn get(&self) -> Result<DocumentSnapshot, StoreError> {
        let mut rows = self.rows.select(&RowQuery::by_id(&self.table, &self.id)).await?;
        Ok(match rows.pop() {
            Some(row) => DocumentSnapshot::from_row(row),
            None => DocumentSnapshot {
                id: self.id.clone(),
                data: None,
            },
        })
    }

    /// Returns `false` when no document has this id.
    pub async fn update<T: Serialize>(&self, payload: &T) -> Result<bool, StoreError> {
        let mut changes = keys_to_snake(into_object(payload)?);
        changes.remove("id");
        self.rows.update(&self.table, &self.id, changes).await
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    data: Option<Map<String, Value>>,
}

impl DocumentSnapshot {
    fn from_row(row: Row) -> Self {
        let data = keys_to_camel(row);
        let id = match data.get("id") {
            Some(Value::String(id)) => id.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        Self {
            id,
            data: Some(data),
        }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }

    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.data.as_ref()
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.as_ref()?.get(field)
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Option<T>, StoreError> {
        match &self.data {
            Some(data) => Ok(Some(serde_json::from_value(Value::Object(data.clone()))?)),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QuerySnapshot {
    pub docs: Vec<DocumentSnapshot>,
}

impl QuerySnapshot {
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn first(&self) -> Option<&DocumentSnapshot> {
        self.docs.first()
    }

    pub fn decode<T: DeserializeOwned>(&self) -> Result<Vec<T>, StoreError> {
        self.docs
            .iter()
            .filter_map(|doc| doc.decode().transpose())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRowStore;
    use serde_json::json;

    fn store() -> DocumentStore {
        DocumentStore::new(Arc::new(MemoryRowStore::with_default_schema()))
    }

    #[test]
    fn case_translation_round_trips_camel_keys() {
        for key in ["id", "dataInicio", "observacoesAdmin", "imagemAtestado", "userID", "ra2"] {
            assert_eq!(to_camel_case(&to_snake_case(key)), key);
        }
        assert_eq!(to_snake_case("observacoesAdmin"), "observacoes_admin");
        assert_eq!(to_camel_case("created_at"), "createdAt");
        assert_eq!(to_camel_case("_private"), "_private");
    }

    #[test]
    fn pagination_becomes_inclusive_window() {
        let base = store().collection("usuarios");
        assert_eq!(base.range(), None);
        assert_eq!(
            store().collection("usuarios").limit(10).offset(20).range(),
            Some(RowRange { from: 20, to: Some(29) })
        );
        assert_eq!(
            store().collection("usuarios").limit(1).range(),
            Some(RowRange { from: 0, to: Some(0) })
        );
        assert_eq!(
            store().collection("usuarios").offset(5).range(),
            Some(RowRange { from: 5, to: None })
        );
    }

    #[tokio::test]
    async fn add_then_read_keeps_camel_case_fields() {
        let db = store();
        let payload = json!({
            "idUsuario": "u-1",
            "dataInicio": "2025-03-01",
            "observacoesAdmin": "",
            "status": "pendente",
        });
        let id = db.collection("atestados").add(&payload).await.unwrap();

        let doc = db.collection("atestados").doc(&id).get().await.unwrap();
        assert!(doc.exists());
        assert_eq!(doc.id, id);
        for (key, value) in payload.as_object().unwrap() {
            assert_eq!(doc.get(key), Some(value), "field {}", key);
        }
        assert!(doc.get("data_inicio").is_none());
    }

    #[tokio::test]
    async fn filters_use_translated_field_names() {
        let db = store();
        for (ra, periodo) in [("RA001", 1), ("RA002", 3), ("RA003", 5)] {
            db.collection("usuarios")
                .add(&json!({"email": format!("{}@x.com", ra), "ra": ra, "periodoAtual": periodo}))
                .await
                .unwrap();
        }

        let found = db
            .collection("usuarios")
            .where_op("periodoAtual", ">", 2)
            .unwrap()
            .order_by("periodoAtual", Direction::Desc)
            .get()
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found.docs[0].get("ra"), Some(&json!("RA003")));

        let in_set = db
            .collection("usuarios")
            .filter("ra", Operator::In, json!(["RA001", "RA003"]))
            .get()
            .await
            .unwrap();
        assert_eq!(in_set.len(), 2);
    }

    #[test]
    fn unknown_operator_fails_loudly() {
        let result = store().collection("usuarios").where_op("email", "!=", "a@x.com");
        assert!(matches!(result, Err(StoreError::UnsupportedOperator(op)) if op == "!="));
    }

    #[tokio::test]
    async fn update_and_missing_documents() {
        let db = store();
        let id = db
            .collection("atestados")
            .add(&json!({"status": "pendente"}))
            .await
            .unwrap();
        let doc = db.collection("atestados").doc(&id);
        assert!(doc
            .update(&json!({"status": "aprovado", "observacoesAdmin": "ok"}))
            .await
            .unwrap());
        let read = doc.get().await.unwrap();
        assert_eq!(read.get("status"), Some(&json!("aprovado")));
        assert_eq!(read.get("observacoesAdmin"), Some(&json!("ok")));

        let missing = db.collection("atestados").doc("nope");
        assert!(!missing.get().await.unwrap().exists());
        assert!(!missing.update(&json!({"status": "x"})).await.unwrap());
    }
}
