use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    routing::{any, get, patch, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::{net::TcpListener, sync::RwLock};

#[derive(Default)]
pub struct Store {
    items: BTreeMap<u64, Value>,
    next_item: u64,
    tasks: BTreeMap<u64, Value>,
    next_task: u64,
    name: Map<String, Value>,
}

pub type Db = Arc<RwLock<Store>>;

/// What `/echo` saw of the request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Echo {
    pub method: String,
    pub headers: HashMap<String, Vec<String>>,
    pub body: String,
}

pub fn app() -> Router {
    let db: Db = Arc::default();
    Router::new()
        .route("/items", get(list_items).post(create_item))
        .route("/items/{id}", get(get_item).patch(update_item).delete(delete_item))
        .route("/tasks", put(create_task))
        .route("/tasks/{id}", axum::routing::delete(delete_task))
        .route("/name", patch(update_name))
        .route("/status/{code}", any(status))
        .route("/echo", any(echo))
        .with_state(db)
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("mock server listening on {addr}");
    }
    axum::serve(listener, app()).await
}

fn not_found(what: &str) -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": format!("{what} not found") })))
}

async fn list_items(State(db): State<Db>) -> Json<BTreeMap<u64, Value>> {
    let store = db.read().await;
    Json(store.items.clone())
}

async fn get_item(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let store = db.read().await;
    store.items.get(&id).cloned().map(Json).ok_or_else(|| not_found("Item"))
}

async fn create_item(State(db): State<Db>, Json(item): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut store = db.write().await;
    store.next_item += 1;
    let id = store.next_item;
    store.items.insert(id, item.clone());
    (StatusCode::CREATED, Json(json!({ "id": id, "item": item })))
}

async fn update_item(
    State(db): State<Db>,
    Path(id): Path<u64>,
    Json(patch): Json<Map<String, Value>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut store = db.write().await;
    let item = store.items.get_mut(&id).ok_or_else(|| not_found("Item"))?;
    match &mut *item {
        Value::Object(fields) => fields.extend(patch),
        other => *other = Value::Object(patch),
    }
    Ok(Json(item.clone()))
}

async fn delete_item(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut store = db.write().await;
    store
        .items
        .remove(&id)
        .map(|_| Json(json!({ "message": "Item deleted" })))
        .ok_or_else(|| not_found("Item"))
}

async fn create_task(State(db): State<Db>, Json(task): Json<Value>) -> Json<Value> {
    let mut store = db.write().await;
    store.next_task += 1;
    let id = store.next_task;
    store.tasks.insert(id, task.clone());
    Json(json!({ "id": id, "task": task }))
}

async fn delete_task(
    State(db): State<Db>,
    Path(id): Path<u64>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let mut store = db.write().await;
    store
        .tasks
        .remove(&id)
        .map(|_| Json(json!({ "message": "Task deleted" })))
        .ok_or_else(|| not_found("Task"))
}

async fn update_name(State(db): State<Db>, Json(patch): Json<Map<String, Value>>) -> Json<Value> {
    let mut store = db.write().await;
    store.name.extend(patch);
    Json(Value::Object(store.name.clone()))
}

/// Reply with `code` as both the status and the body.
async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, code.to_string()))
}

async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> Json<Echo> {
    let mut seen: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in &headers {
        seen.entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    Json(Echo {
        method: method.to_string(),
        headers: seen,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}
