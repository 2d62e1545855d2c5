use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sensor_bridge::BridgeConfig;

pub const TOKEN: &str = "test-token";
pub const ORG: &str = "smartbridge";
pub const BUCKET: &str = "sensors";

/// In-process stand-in for the InfluxDB 2.x HTTP API: accepts line protocol
/// writes, answers Flux queries with annotated CSV (one table per
/// measurement+sensor pair, insertion order), and honors
/// `_measurement="…"` delete predicates.
pub struct FakeInflux {
    pub base_url: String,
    state: Shared,
}

#[derive(Clone)]
struct Shared {
    records: Arc<Mutex<Vec<StoredRecord>>>,
    delete_calls: Arc<AtomicUsize>,
}

#[derive(Debug, Clone)]
struct StoredRecord {
    measurement: String,
    tags: HashMap<String, String>,
    field: String,
    value: f64,
    time_ns: i64,
}

impl FakeInflux {
    pub fn spawn() -> Self {
        let state = Shared {
            records: Arc::new(Mutex::new(Vec::new())),
            delete_calls: Arc::new(AtomicUsize::new(0)),
        };
        let app_state = state.clone();
        let (addr_tx, addr_rx) = std::sync::mpsc::channel();

        std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("runtime");
            runtime.block_on(async move {
                let app = Router::new()
                    .route("/api/v2/write", post(handle_write))
                    .route("/api/v2/query", post(handle_query))
                    .route("/api/v2/delete", post(handle_delete))
                    .with_state(app_state);
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind");
                addr_tx
                    .send(listener.local_addr().expect("local addr"))
                    .expect("send addr");
                axum::serve(listener, app).await.ok();
            });
        });

        let addr = addr_rx.recv().expect("fake store address");
        Self {
            base_url: format!("http://{addr}"),
            state,
        }
    }

    pub fn config(&self) -> BridgeConfig {
        BridgeConfig {
            url: self.base_url.clone(),
            token: TOKEN.to_string(),
            org: ORG.to_string(),
            bucket: BUCKET.to_string(),
        }
    }

    pub fn config_yaml(&self) -> String {
        format!(
            "url: {}\ntoken: {TOKEN}\norg: {ORG}\nbucket: {BUCKET}\n",
            self.base_url
        )
    }

    pub fn record_count(&self) -> usize {
        self.state.records.lock().expect("records lock").len()
    }

    pub fn delete_calls(&self) -> usize {
        self.state.delete_calls.load(Ordering::SeqCst)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        == Some(&format!("Token {TOKEN}"))
}

async fn handle_write(
    State(state): State<Shared>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: String,
) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized".to_string());
    }
    if params.get("org").map(String::as_str) != Some(ORG)
        || params.get("bucket").map(String::as_str) != Some(BUCKET)
    {
        return (StatusCode::NOT_FOUND, "unknown org or bucket".to_string());
    }

    let mut parsed = Vec::new();
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        match parse_line(line) {
            Some(record) => parsed.push(record),
            None => return (StatusCode::BAD_REQUEST, format!("bad line: {line}")),
        }
    }
    state.records.lock().expect("records lock").extend(parsed);
    (StatusCode::NO_CONTENT, String::new())
}

async fn handle_query(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(_body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized".to_string());
    }
    let records = state.records.lock().expect("records lock").clone();
    if records.is_empty() {
        return (StatusCode::OK, "\r\n".to_string());
    }

    // One table per measurement+sensor pair, in insertion order.
    let mut group_keys: Vec<(String, String)> = Vec::new();
    let mut groups: HashMap<(String, String), Vec<StoredRecord>> = HashMap::new();
    for record in records {
        let sensor = record.tags.get("sensor").cloned().unwrap_or_default();
        let key = (record.measurement.clone(), sensor);
        if !groups.contains_key(&key) {
            group_keys.push(key.clone());
        }
        groups.entry(key).or_default().push(record);
    }

    let mut body = String::new();
    body.push_str("#datatype,string,long,dateTime:RFC3339,dateTime:RFC3339,dateTime:RFC3339,double,string,string,string,string,string\n");
    body.push_str("#group,false,false,true,true,false,false,true,true,true,true,true\n");
    body.push_str("#default,_result,,,,,,,,,,\n");
    body.push_str(
        ",result,table,_start,_stop,_time,_value,_field,_measurement,proceed to review,resolved,sensor\n",
    );
    let start = "1970-01-01T00:00:00Z";
    let stop = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
    for (table_index, key) in group_keys.iter().enumerate() {
        for record in &groups[key] {
            let time = DateTime::<Utc>::from_timestamp_nanos(record.time_ns)
                .format("%Y-%m-%dT%H:%M:%S%.9fZ");
            let review = record
                .tags
                .get("proceed to review")
                .cloned()
                .unwrap_or_default();
            let resolved = record.tags.get("resolved").cloned().unwrap_or_default();
            body.push_str(&format!(
                ",,{table_index},{start},{stop},{time},{},{},{},{review},{resolved},{}\n",
                record.value, record.field, record.measurement, key.1
            ));
        }
    }
    (StatusCode::OK, body)
}

async fn handle_delete(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<serde_json::Value>,
) -> (StatusCode, String) {
    if !authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized".to_string());
    }
    state.delete_calls.fetch_add(1, Ordering::SeqCst);

    let predicate = body
        .get("predicate")
        .and_then(|value| value.as_str())
        .unwrap_or_default();
    let Some(measurement) = predicate
        .strip_prefix("_measurement=\"")
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return (StatusCode::BAD_REQUEST, "unsupported predicate".to_string());
    };

    state
        .records
        .lock()
        .expect("records lock")
        .retain(|record| record.measurement != measurement);
    (StatusCode::NO_CONTENT, String::new())
}

// Minimal line protocol decoding: enough for the shapes this crate emits.
fn parse_line(line: &str) -> Option<StoredRecord> {
    let sections = split_unescaped(line, ' ');
    if sections.len() < 2 || sections.len() > 3 {
        return None;
    }

    let mut head = split_unescaped(&sections[0], ',').into_iter();
    let measurement = head.next()?;
    let mut tags = HashMap::new();
    for pair in head {
        let mut parts = split_unescaped(&pair, '=').into_iter();
        tags.insert(parts.next()?, parts.next()?);
    }

    // Single-field records only.
    let mut field_parts = split_unescaped(&sections[1], '=').into_iter();
    let field = field_parts.next()?;
    let raw_value = field_parts.next()?;
    let value: f64 = raw_value.strip_suffix('i').unwrap_or(&raw_value).parse().ok()?;

    let time_ns = match sections.get(2) {
        Some(raw) => raw.parse().ok()?,
        None => Utc::now().timestamp_nanos_opt().unwrap_or_default(),
    };

    Some(StoredRecord {
        measurement,
        tags,
        field,
        value,
        time_ns,
    })
}

fn split_unescaped(raw: &str, delimiter: char) -> Vec<String> {
    let mut parts = vec![String::new()];
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                parts.last_mut().expect("non-empty parts").push(next);
            }
        } else if c == delimiter {
            parts.push(String::new());
        } else {
            parts.last_mut().expect("non-empty parts").push(c);
        }
    }
    parts
}
