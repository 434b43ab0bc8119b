//! Purpose: Provide a small JSON document server speaking the `/cars` wire contract.
//! Exports: `ServeConfig`, `serve`.
//! Role: Local stand-in for the remote car store (json-server style) used in dev and tests.
//! Invariants: `HEAD /` answers 200 once the listener is bound.
//! Invariants: Loopback-only unless explicitly allowed.
//! Invariants: When a database file is configured it is rewritten after every mutation.

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use carpanel::api::{Error, ErrorKind, next_id};

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub db_path: Option<PathBuf>,
    pub allow_non_loopback: bool,
}

struct AppState {
    docs: Mutex<Vec<Value>>,
    db_path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Database {
    #[serde(default)]
    cars: Vec<Value>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    let docs = match &config.db_path {
        Some(path) => load_database(path)?,
        None => Vec::new(),
    };
    let state = Arc::new(AppState {
        docs: Mutex::new(docs),
        db_path: config.db_path,
    });

    let app = Router::new()
        .route("/", get(root))
        .route("/cars", get(list_cars).post(create_car))
        .route(
            "/cars/:id",
            get(get_car).put(replace_car).delete(delete_car),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    info!(bind = %config.bind, "serving car documents");

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Io)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Io)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Io).with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }
    if let Some(path) = config.db_path.as_ref().filter(|path| path.is_dir()) {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--db must be a file, not a directory")
            .with_path(path));
    }
    Ok(())
}

fn load_database(path: &Path) -> Result<Vec<Value>, Error> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let text = std::fs::read_to_string(path).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to read database file")
            .with_path(path)
            .with_source(err)
    })?;
    let database: Database = serde_json::from_str(&text).map_err(|err| {
        Error::new(ErrorKind::Corrupt)
            .with_message("database file is not a {\"cars\": [...]} document")
            .with_path(path)
            .with_source(err)
    })?;
    Ok(database.cars)
}

fn save_database(path: &Path, docs: &[Value]) -> Result<(), Error> {
    let text = serde_json::to_string_pretty(&json!({ "cars": docs })).map_err(|err| {
        Error::new(ErrorKind::Internal)
            .with_message("failed to encode database")
            .with_source(err)
    })?;
    std::fs::write(path, text).map_err(|err| {
        Error::new(ErrorKind::Io)
            .with_message("failed to write database file")
            .with_path(path)
            .with_source(err)
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

impl AppState {
    fn lock(&self) -> MutexGuard<'_, Vec<Value>> {
        self.docs.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn persist(&self, docs: &[Value]) -> Result<(), Error> {
        match &self.db_path {
            Some(path) => save_database(path, docs),
            None => Ok(()),
        }
    }
}

async fn root() -> Response {
    Json(json!({ "ok": true })).into_response()
}

async fn list_cars(
    State(state): State<Arc<AppState>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let mut docs: Vec<Value> = {
        let docs = state.lock();
        docs.iter()
            .filter(|doc| matches_filters(doc, &params))
            .cloned()
            .collect()
    };
    if let Some(field) = params.get("_sort") {
        let descending = params
            .get("_order")
            .is_some_and(|order| order.eq_ignore_ascii_case("desc"));
        docs.sort_by(|a, b| {
            let ordering = compare_values(a.get(field), b.get(field));
            if descending { ordering.reverse() } else { ordering }
        });
    }
    Json(Value::Array(docs)).into_response()
}

async fn create_car(State(state): State<Arc<AppState>>, Json(body): Json<Value>) -> Response {
    let Value::Object(mut doc) = body else {
        return error_response(
            Error::new(ErrorKind::Usage).with_message("car document must be a json object"),
        );
    };
    let mut docs = state.lock();
    let id = match doc.get("id").and_then(value_id) {
        Some(id) => {
            if docs.iter().any(|existing| doc_id(existing) == Some(id)) {
                return error_response(
                    Error::new(ErrorKind::AlreadyExists)
                        .with_message(format!("car {id} already exists")),
                );
            }
            id
        }
        None if doc.contains_key("id") => {
            return error_response(
                Error::new(ErrorKind::Usage).with_message("car id must be a positive integer"),
            );
        }
        None => next_id(docs.iter().filter_map(doc_id)),
    };
    doc.insert("id".to_string(), json!(id));
    let doc = Value::Object(doc);
    docs.push(doc.clone());
    if let Err(err) = state.persist(&docs) {
        docs.pop();
        return error_response(err);
    }
    info!(id, "created car document");
    (StatusCode::CREATED, Json(doc)).into_response()
}

async fn get_car(State(state): State<Arc<AppState>>, AxumPath(id): AxumPath<String>) -> Response {
    let docs = state.lock();
    match find_index(&docs, &id) {
        Some(index) => Json(docs[index].clone()).into_response(),
        None => not_found_response(&id),
    }
}

async fn replace_car(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
    Json(body): Json<Value>,
) -> Response {
    let Value::Object(mut doc) = body else {
        return error_response(
            Error::new(ErrorKind::Usage).with_message("car document must be a json object"),
        );
    };
    let mut docs = state.lock();
    let Some(index) = find_index(&docs, &id) else {
        return not_found_response(&id);
    };
    if let Some(existing) = docs[index].get("id").cloned() {
        doc.insert("id".to_string(), existing);
    }
    let previous = std::mem::replace(&mut docs[index], Value::Object(doc));
    if let Err(err) = state.persist(&docs) {
        docs[index] = previous;
        return error_response(err);
    }
    info!(id = %id, "replaced car document");
    Json(docs[index].clone()).into_response()
}

async fn delete_car(
    State(state): State<Arc<AppState>>,
    AxumPath(id): AxumPath<String>,
) -> Response {
    let mut docs = state.lock();
    let Some(index) = find_index(&docs, &id) else {
        return not_found_response(&id);
    };
    let removed = docs.remove(index);
    if let Err(err) = state.persist(&docs) {
        docs.insert(index, removed);
        return error_response(err);
    }
    info!(id = %id, "deleted car document");
    Json(json!({})).into_response()
}

fn value_id(value: &Value) -> Option<u32> {
    let id = match value {
        Value::Number(number) => number.as_u64().and_then(|id| u32::try_from(id).ok()),
        Value::String(text) => text.parse::<u32>().ok(),
        _ => None,
    }?;
    (id > 0).then_some(id)
}

fn doc_id(doc: &Value) -> Option<u32> {
    doc.get("id").and_then(value_id)
}

fn find_index(docs: &[Value], id: &str) -> Option<usize> {
    let id = id.parse::<u32>().ok()?;
    docs.iter().position(|doc| doc_id(doc) == Some(id))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// Query keys without a leading underscore filter by equality on the textual form.
fn matches_filters(doc: &Value, params: &HashMap<String, String>) -> bool {
    params
        .iter()
        .filter(|(key, _)| !key.starts_with('_'))
        .all(|(key, expected)| {
            doc.get(key)
                .is_some_and(|value| text_of(value).eq_ignore_ascii_case(expected))
        })
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let number = |value: Option<&Value>| -> Option<f64> {
        match value? {
            Value::Number(number) => number.as_f64(),
            Value::String(text) => text.parse::<f64>().ok(),
            _ => None,
        }
    };
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => {
            let a = a.map(text_of).unwrap_or_default();
            let b = b.map(text_of).unwrap_or_default();
            a.cmp(&b)
        }
    }
}

fn not_found_response(id: &str) -> Response {
    warn!(id, "car document not found");
    (StatusCode::NOT_FOUND, Json(Value::Object(Map::new()))).into_response()
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    kind: String,
    message: String,
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage | ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AlreadyExists => StatusCode::CONFLICT,
        ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::Corrupt | ErrorKind::Io | ErrorKind::Remote | ErrorKind::Internal => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let body = ErrorEnvelope {
        error: ErrorBody {
            kind: format!("{:?}", err.kind()),
            message: err.message().unwrap_or("error").to_string(),
        },
    };
    (status, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::{ServeConfig, compare_values, matches_filters, validate_config, value_id};
    use carpanel::api::ErrorKind;
    use serde_json::json;
    use std::cmp::Ordering;
    use std::collections::HashMap;

    #[test]
    fn non_loopback_bind_requires_opt_in() {
        let mut config = ServeConfig {
            bind: "0.0.0.0:3000".parse().expect("addr"),
            db_path: None,
            allow_non_loopback: false,
        };
        let err = validate_config(&config).expect_err("usage");
        assert_eq!(err.kind(), ErrorKind::Usage);
        config.allow_non_loopback = true;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn ids_accept_numbers_and_numeric_text() {
        assert_eq!(value_id(&json!(4)), Some(4));
        assert_eq!(value_id(&json!("4")), Some(4));
        assert_eq!(value_id(&json!(0)), None);
        assert_eq!(value_id(&json!("x")), None);
    }

    #[test]
    fn numeric_sort_does_not_compare_as_text() {
        assert_eq!(compare_values(Some(&json!("10")), Some(&json!(9))), Ordering::Greater);
        assert_eq!(compare_values(Some(&json!("abc")), Some(&json!("abd"))), Ordering::Less);
    }

    #[test]
    fn filters_match_textual_values() {
        let doc = json!({"id": 4, "brand": "Honda"});
        let mut params = HashMap::new();
        params.insert("id".to_string(), "4".to_string());
        params.insert("_sort".to_string(), "id".to_string());
        assert!(matches_filters(&doc, &params));
        params.insert("brand".to_string(), "Fiat".to_string());
        assert!(!matches_filters(&doc, &params));
    }
}
