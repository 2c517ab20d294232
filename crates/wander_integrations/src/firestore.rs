use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Map, Value, json};
use tracing::debug;
use url::Url;
use wander_core::WanderConfig;

const DEFAULT_BASE_URL: &str = "https://firestore.googleapis.com/v1";

// ---------------------------------------------------------------------------
// Remote document store boundary
// ---------------------------------------------------------------------------

/// A document fetched from the remote store, with plain JSON fields.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteDocument {
    pub id: String,
    pub fields: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOp {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    ArrayContains,
}

impl FilterOp {
    fn as_firestore(&self) -> &'static str {
        match self {
            Self::Equal => "EQUAL",
            Self::NotEqual => "NOT_EQUAL",
            Self::LessThan => "LESS_THAN",
            Self::GreaterThan => "GREATER_THAN",
            Self::ArrayContains => "ARRAY_CONTAINS",
        }
    }
}

/// One `field op value` condition; multiple filters are AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryFilter {
    pub field: String,
    pub op: FilterOp,
    pub value: Value,
}

impl QueryFilter {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            op: FilterOp::Equal,
            value: value.into(),
        }
    }
}

/// The remote database that holds the canonical destination documents.
/// Any error means "remote unavailable" to callers.
#[async_trait]
pub trait RemoteDocumentStore: Send + Sync {
    async fn get(&self, id: &str) -> Result<Option<RemoteDocument>>;

    async fn query(&self, filters: &[QueryFilter], limit: usize) -> Result<Vec<RemoteDocument>>;

    async fn upsert(&self, id: &str, fields: &Value) -> Result<()>;
}

// ---------------------------------------------------------------------------
// Firestore REST client
// ---------------------------------------------------------------------------

/// Client for one Firestore collection over the REST API.
pub struct FirestoreClient {
    base_url: String,
    project_id: String,
    collection: String,
    api_key: Option<String>,
    client: Client,
}

impl FirestoreClient {
    pub fn new(
        project_id: impl Into<String>,
        collection: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            base_url: DEFAULT_BASE_URL.into(),
            project_id: project_id.into(),
            collection: collection.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            client,
        })
    }

    /// `None` when no project is configured.
    pub fn from_config(config: &WanderConfig) -> Option<Result<Self>> {
        let project = config.firestore_project_id.clone()?;
        Some(Self::new(
            project,
            config.destinations_collection.clone(),
            config.firestore_api_key.clone(),
            config.remote_timeout(),
        ))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn documents_url(&self) -> String {
        format!(
            "{}/projects/{}/databases/(default)/documents",
            self.base_url, self.project_id
        )
    }

    /// Collection and id are pushed as percent-encoded path segments.
    fn document_url(&self, id: &str) -> Result<String> {
        let mut url = Url::parse(&self.documents_url()).context("invalid Firestore base URL")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Firestore base URL cannot have a path"))?
            .extend([self.collection.as_str(), id]);
        Ok(url.into())
    }

    fn with_key(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => req.query(&[("key", key.as_str())]),
            None => req,
        }
    }

    fn run_query_body(&self, filters: &[QueryFilter], limit: usize) -> Value {
        let mut query = json!({
            "from": [{ "collectionId": self.collection }],
            "limit": limit,
        });
        let field_filters: Vec<Value> = filters
            .iter()
            .map(|f| {
                json!({
                    "fieldFilter": {
                        "field": { "fieldPath": f.field },
                        "op": f.op.as_firestore(),
                        "value": to_firestore_value(&f.value),
                    }
                })
            })
            .collect();
        match field_filters.len() {
            0 => {}
            1 => {
                query["where"] = field_filters.into_iter().next().unwrap_or(Value::Null);
            }
            _ => {
                query["where"] = json!({
                    "compositeFilter": { "op": "AND", "filters": field_filters }
                });
            }
        }
        json!({ "structuredQuery": query })
    }
}

#[async_trait]
impl RemoteDocumentStore for FirestoreClient {
    async fn get(&self, id: &str) -> Result<Option<RemoteDocument>> {
        let url = self.document_url(id)?;
        debug!(url = %url, "Firestore get");

        let response = self
            .with_key(self.client.get(&url))
            .send()
            .await
            .context("Firestore get request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            anyhow::bail!("Firestore get error ({}): {}", status, body);
        }
        Ok(parse_document(&body))
    }

    async fn query(&self, filters: &[QueryFilter], limit: usize) -> Result<Vec<RemoteDocument>> {
        let url = format!("{}:runQuery", self.documents_url());
        debug!(url = %url, filters = filters.len(), limit, "Firestore query");

        let response = self
            .with_key(self.client.post(&url))
            .json(&self.run_query_body(filters, limit))
            .send()
            .await
            .context("Firestore query request failed")?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .context("failed to parse Firestore query response")?;
        if !status.is_success() {
            anyhow::bail!("Firestore query error ({}): {}", status, body);
        }
        Ok(parse_run_query(&body))
    }

    async fn upsert(&self, id: &str, fields: &Value) -> Result<()> {
        let url = self.document_url(id)?;
        debug!(url = %url, "Firestore upsert");

        let typed = match to_firestore_value(fields) {
            Value::Object(mut m) => m
                .remove("mapValue")
                .and_then(|mv| match mv {
                    Value::Object(mut inner) => inner.remove("fields"),
                    _ => None,
                })
                .unwrap_or_else(|| json!({})),
            _ => anyhow::bail!("Firestore documents must be JSON objects"),
        };

        let response = self
            .with_key(self.client.patch(&url))
            .json(&json!({ "fields": typed }))
            .send()
            .await
            .context("Firestore upsert request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Firestore upsert error ({}): {}", status, body);
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Typed value conversion
// ---------------------------------------------------------------------------

/// Plain JSON to Firestore's typed value encoding.
pub fn to_firestore_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64().unwrap_or_default() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => json!({
            "arrayValue": { "values": items.iter().map(to_firestore_value).collect::<Vec<_>>() }
        }),
        Value::Object(map) if is_geo_point(map) => json!({ "geoPointValue": map }),
        Value::Object(map) => {
            let fields: Map<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), to_firestore_value(v)))
                .collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

/// `{ latitude, longitude }` with numeric members, the plain form of a geo point.
fn is_geo_point(map: &Map<String, Value>) -> bool {
    map.len() == 2
        && map.get("latitude").is_some_and(Value::is_number)
        && map.get("longitude").is_some_and(Value::is_number)
}

/// Firestore typed value back to plain JSON. Unknown encodings become null.
pub fn from_firestore_value(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => inner.clone(),
        "integerValue" => inner
            .as_str()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Value::from)
            .unwrap_or_else(|| inner.clone()),
        "doubleValue" => inner.clone(),
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        }),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|vals| vals.iter().map(from_firestore_value).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => fields_to_json(inner.get("fields")),
        _ => Value::Null,
    }
}

fn fields_to_json(fields: Option<&Value>) -> Value {
    let map: Map<String, Value> = fields
        .and_then(Value::as_object)
        .map(|m| {
            m.iter()
                .map(|(k, v)| (k.clone(), from_firestore_value(v)))
                .collect()
        })
        .unwrap_or_default();
    Value::Object(map)
}

/// Parse a Firestore document resource (`name` + `fields`).
fn parse_document(doc: &Value) -> Option<RemoteDocument> {
    let name = doc.get("name")?.as_str()?;
    let id = name.rsplit('/').next()?.to_string();
    Some(RemoteDocument {
        id,
        fields: fields_to_json(doc.get("fields")),
    })
}

/// `runQuery` returns an array of `{ "document": ... }` entries; entries
/// without a document (read-time markers) are skipped.
fn parse_run_query(body: &Value) -> Vec<RemoteDocument> {
    body.as_array()
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("document"))
                .filter_map(parse_document)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> FirestoreClient {
        FirestoreClient::new("wander-app", "destinations", None, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn typed_values_round_trip_nested_document() {
        let plain = json!({
            "name": "Taj Mahal",
            "visitors": 7000000,
            "rating": 4.8,
            "unesco": true,
            "historicalInfo": { "keyEvents": ["1632", "1653"] },
            "imageUrl": null
        });
        let typed = to_firestore_value(&plain);
        assert_eq!(typed["mapValue"]["fields"]["visitors"]["integerValue"], "7000000");
        assert_eq!(typed["mapValue"]["fields"]["rating"]["doubleValue"], 4.8);
        assert_eq!(from_firestore_value(&typed), plain);
    }

    #[test]
    fn geo_points_and_timestamps_decode() {
        let typed = json!({ "mapValue": { "fields": {
            "coordinates": { "geoPointValue": { "latitude": 27.17, "longitude": 78.04 } },
            "updated": { "timestampValue": "2024-01-01T00:00:00Z" }
        }}});
        let plain = from_firestore_value(&typed);
        assert_eq!(plain["coordinates"]["latitude"], 27.17);
        assert_eq!(plain["updated"], "2024-01-01T00:00:00Z");
    }

    #[test]
    fn parse_document_takes_id_from_name() {
        let doc = json!({
            "name": "projects/p/databases/(default)/documents/destinations/taj_mahal_001",
            "fields": { "name": { "stringValue": "Taj Mahal" } }
        });
        let parsed = parse_document(&doc).unwrap();
        assert_eq!(parsed.id, "taj_mahal_001");
        assert_eq!(parsed.fields["name"], "Taj Mahal");
    }

    #[test]
    fn run_query_skips_entries_without_document() {
        let body = json!([
            { "readTime": "2024-01-01T00:00:00Z" },
            { "document": { "name": "a/b/red_fort", "fields": {} } }
        ]);
        let docs = parse_run_query(&body);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, "red_fort");
    }

    #[test]
    fn query_body_shapes() {
        let c = client();
        let none = c.run_query_body(&[], 10);
        assert!(none["structuredQuery"].get("where").is_none());
        assert_eq!(none["structuredQuery"]["limit"], 10);

        let one = c.run_query_body(&[QueryFilter::eq("category", "Monument")], 5);
        assert_eq!(
            one["structuredQuery"]["where"]["fieldFilter"]["op"],
            "EQUAL"
        );

        let two = c.run_query_body(
            &[
                QueryFilter::eq("category", "Monument"),
                QueryFilter::eq("state", "Rajasthan"),
            ],
            5,
        );
        assert_eq!(
            two["structuredQuery"]["where"]["compositeFilter"]["filters"]
                .as_array()
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn document_url_includes_collection() {
        let c = client().with_base_url("http://localhost:8080/v1/");
        assert_eq!(
            c.document_url("taj").unwrap(),
            "http://localhost:8080/v1/projects/wander-app/databases/(default)/documents/destinations/taj"
        );
    }

    #[test]
    fn document_url_encodes_the_id() {
        let c = client().with_base_url("http://localhost:8080/v1");
        let url = c.document_url("fort #1/east?").unwrap();
        assert!(url.ends_with("/documents/destinations/fort%20%231%2Feast%3F"), "{url}");
    }

    #[test]
    fn coordinates_encode_as_geo_point() {
        let plain = json!({
            "coordinates": { "latitude": 27.17, "longitude": 78.04 },
            "address": { "latitude": 1, "longitude": 2, "label": "not a point" }
        });
        let typed = to_firestore_value(&plain);
        let fields = &typed["mapValue"]["fields"];
        assert_eq!(fields["coordinates"]["geoPointValue"]["latitude"], 27.17);
        assert!(fields["address"].get("mapValue").is_some());
        assert_eq!(from_firestore_value(&typed), plain);
    }

    #[test]
    fn from_config_requires_project() {
        let mut config = WanderConfig::default();
        assert!(FirestoreClient::from_config(&config).is_none());
        config.firestore_project_id = Some("wander-app".into());
        let c = FirestoreClient::from_config(&config).unwrap().unwrap();
        assert_eq!(c.collection(), "destinations");
    }
}
