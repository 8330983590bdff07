#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

pub const TEST_TOKEN: &str = "test-token";

/// In-process stand-in for the digital twins REST API.
#[derive(Clone, Default)]
pub struct MockTwins {
    twins: Arc<Mutex<HashMap<String, Value>>>,
    patches: Arc<Mutex<Vec<(String, Value)>>>,
}

impl MockTwins {
    pub fn with_balances(balances: &[(&str, f64)]) -> Self {
        let mock = Self::default();
        {
            let mut twins = mock.twins.lock().unwrap();
            for (id, balance) in balances {
                twins.insert(
                    id.to_string(),
                    json!({
                        "$dtId": id,
                        "$etag": "W/\"0\"",
                        "$metadata": {"$model": "dtmi:rtgs:Participant;1"},
                        "liquidityBalance": balance,
                    }),
                );
            }
        }
        mock
    }

    pub fn balance(&self, id: &str) -> Option<f64> {
        self.twins
            .lock()
            .unwrap()
            .get(id)
            .and_then(|twin| twin["liquidityBalance"].as_f64())
    }

    pub fn etag(&self, id: &str) -> Option<String> {
        self.twins
            .lock()
            .unwrap()
            .get(id)
            .and_then(|twin| twin["$etag"].as_str().map(str::to_string))
    }

    /// Every accepted patch as (twin id, patch document).
    pub fn patches(&self) -> Vec<(String, Value)> {
        self.patches.lock().unwrap().clone()
    }

    /// Serves the mock on an ephemeral port and returns its base URL.
    pub async fn spawn(&self) -> String {
        let app = Router::new()
            .route("/digitaltwins/:id", get(get_twin).patch(patch_twin))
            .with_state(self.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }
}

fn authorized(headers: &HeaderMap) -> Result<(), StatusCode> {
    let expected = format!("Bearer {}", TEST_TOKEN);
    match headers.get(header::AUTHORIZATION) {
        Some(value) if value.as_bytes() == expected.as_bytes() => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn get_twin(
    State(mock): State<MockTwins>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, StatusCode> {
    authorized(&headers)?;
    mock.twins
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn patch_twin(
    State(mock): State<MockTwins>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if let Err(status) = authorized(&headers) {
        return status;
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    if content_type != Some("application/json-patch+json") {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }
    let Ok(patch) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };

    let mut twins = mock.twins.lock().unwrap();
    let Some(twin) = twins.get_mut(&id) else {
        return StatusCode::NOT_FOUND;
    };

    if let Some(if_match) = headers.get(header::IF_MATCH).and_then(|v| v.to_str().ok())
        && twin["$etag"].as_str() != Some(if_match)
    {
        return StatusCode::PRECONDITION_FAILED;
    }

    for op in patch.as_array().into_iter().flatten() {
        if op["op"] == "replace" && op["path"] == "/liquidityBalance" {
            twin["liquidityBalance"] = op["value"].clone();
        } else {
            return StatusCode::BAD_REQUEST;
        }
    }

    let version = twin["$etag"]
        .as_str()
        .and_then(|tag| tag.trim_start_matches("W/").trim_matches('"').parse::<u64>().ok())
        .unwrap_or(0);
    twin["$etag"] = json!(format!("W/\"{}\"", version + 1));
    mock.patches.lock().unwrap().push((id, patch));

    StatusCode::NO_CONTENT
}

/// Writes newline-delimited events to a temporary file.
pub fn events_file(lines: &[&str]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for line in lines {
        writeln!(file, "{}", line).unwrap();
    }
    file
}
