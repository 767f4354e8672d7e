use assert_matches::assert_matches;
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use invoice_reconcile::api::UploadFile;
use invoice_reconcile::config::ApiConfig;
use invoice_reconcile::models::SyncRequest;
use invoice_reconcile::{ApiClient, Error, InvoiceBackend, Session, SessionManager, SessionState};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const TOKEN: &str = "tok-123";

/// 假服务端收到的请求
#[derive(Default)]
struct Seen {
    auth_headers: Vec<Option<String>>,
    uploads: Vec<(String, String, String, usize)>,
    po_lookups: Vec<String>,
    sync_bodies: Vec<Value>,
}

type Shared = Arc<Mutex<Seen>>;

fn invoice(id: i64) -> Value {
    json!({
        "id": id,
        "invoice_number": format!("INV-{id}"),
        "vendor_name": "Acme Tooling",
        "total_amount": 105.0,
        "po_numbers": ["PO-9"],
        "status": "pending"
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        == Some(&format!("Bearer {TOKEN}")[..])
}

async fn login(Form(form): Form<HashMap<String, String>>) -> (StatusCode, Json<Value>) {
    let ok = form.get("username").map(String::as_str) == Some("ada@example.com")
        && form.get("password").map(String::as_str) == Some("secret");
    if ok {
        (
            StatusCode::OK,
            Json(json!({"access_token": TOKEN, "token_type": "bearer"})),
        )
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Incorrect email or password"})),
        )
    }
}

async fn me(headers: HeaderMap) -> (StatusCode, Json<Value>) {
    if !authorized(&headers) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"detail": "Could not validate credentials"})),
        );
    }
    (
        StatusCode::OK,
        Json(json!({"id": 1, "email": "ada@example.com", "full_name": "Ada Lovelace", "is_active": true})),
    )
}

async fn get_invoice(
    State(seen): State<Shared>,
    Path(id): Path<i64>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    seen.lock().unwrap().auth_headers.push(auth);

    if id == 404 {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": "Vendor invoice not found"})),
        );
    }
    (StatusCode::OK, Json(invoice(id)))
}

async fn patch_invoice(Path(id): Path<i64>, Json(body): Json<Map<String, Value>>) -> (StatusCode, Json<Value>) {
    if body.get("total_amount").is_some_and(Value::is_string) {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"detail": [
                {"loc": ["body", "total_amount"], "msg": "Input should be a valid number", "type": "float_parsing"}
            ]})),
        );
    }
    let mut record = invoice(id);
    for (key, value) in body {
        record[key.as_str()] = value;
    }
    (StatusCode::OK, Json(record))
}

async fn upload(State(seen): State<Shared>, mut multipart: Multipart) -> Json<Value> {
    let mut file_name = String::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or_default().to_string();
        file_name = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.unwrap();
        seen.lock()
            .unwrap()
            .uploads
            .push((name, file_name.clone(), content_type, bytes.len()));
    }
    let mut record = invoice(77);
    record["file_path"] = json!(format!("uploads/{file_name}"));
    Json(record)
}

async fn purchase_order(State(seen): State<Shared>, Path(po): Path<String>) -> Json<Value> {
    seen.lock().unwrap().po_lookups.push(po.clone());
    Json(json!({"po_number": po, "status": "Open", "line_items": []}))
}

async fn sync(State(seen): State<Shared>, Json(body): Json<Value>) -> Json<Value> {
    seen.lock().unwrap().sync_bodies.push(body);
    Json(json!({"success": true, "message": "Synced", "sync_operation_id": 5}))
}

async fn dashboard() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"detail": "Could not validate credentials"})),
    )
}

async fn spawn_server() -> (String, Shared) {
    let seen = Shared::default();
    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/me", get(me))
        .route("/api/invoices/upload", post(upload))
        .route("/api/invoices/:id", get(get_invoice).patch(patch_invoice))
        .route("/api/sync", post(sync))
        .route("/api/sync/purchase-order/:po", get(purchase_order))
        .route("/api/analytics/dashboard", get(dashboard))
        .with_state(seen.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/"), seen)
}

fn client(base_url: &str) -> (ApiClient, Arc<SessionManager>) {
    let session = Arc::new(SessionManager::in_memory());
    let config = ApiConfig {
        base_url: base_url.to_string(),
        timeout_secs: 5,
    };
    (ApiClient::new(&config, session.clone()).unwrap(), session)
}

fn logged_in(session: &SessionManager, token: &str) {
    session.set(Session {
        access_token: token.to_string(),
        user: None,
    });
}

#[tokio::test]
async fn form_login_stores_token_and_authorizes_requests() {
    let (base, seen) = spawn_server().await;
    let (client, session) = client(&base);

    let user = client.login("ada@example.com", "secret").await.unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(session.token().as_deref(), Some(TOKEN));
    assert_eq!(session.user().map(|u| u.id), Some(1));
    assert_eq!(session.state(), SessionState::Authenticated);

    let record = client.get_invoice(42).await.unwrap();
    assert_eq!(record.id, 42);
    assert_eq!(record.first_po_number(), Some("PO-9"));
    assert_eq!(
        seen.lock().unwrap().auth_headers,
        vec![Some(format!("Bearer {TOKEN}"))]
    );
}

#[tokio::test]
async fn wrong_password_is_a_validation_error() {
    let (base, _seen) = spawn_server().await;
    let (client, session) = client(&base);

    assert_matches!(
        client.login("ada@example.com", "nope").await,
        Err(Error::Validation(msg)) if msg == "Incorrect email or password"
    );
    // 登录失败不算会话过期
    assert_eq!(session.state(), SessionState::Anonymous);
}

#[tokio::test]
async fn unauthorized_response_tears_down_session() {
    let (base, _seen) = spawn_server().await;
    let (client, session) = client(&base);
    logged_in(&session, "revoked-token");
    let mut rx = session.subscribe();

    assert_matches!(client.dashboard().await, Err(Error::Unauthorized));
    assert_eq!(session.token(), None);

    rx.changed().await.unwrap();
    assert_eq!(*rx.borrow(), SessionState::Expired);
}

#[tokio::test]
async fn missing_invoice_maps_to_not_found() {
    let (base, _seen) = spawn_server().await;
    let (client, session) = client(&base);
    logged_in(&session, TOKEN);

    assert_matches!(
        client.get_invoice(404).await,
        Err(Error::NotFound(detail)) if detail == "Vendor invoice not found"
    );
    assert!(session.is_authenticated());
}

#[tokio::test]
async fn purchase_order_number_is_path_encoded() {
    let (base, seen) = spawn_server().await;
    let (client, session) = client(&base);
    logged_in(&session, TOKEN);

    let payload = client.purchase_order("PO 9/A").await.unwrap();
    assert_eq!(payload["po_number"], "PO 9/A");
    assert_eq!(seen.lock().unwrap().po_lookups, vec!["PO 9/A".to_string()]);
}

#[tokio::test]
async fn upload_sends_multipart_file_field() {
    let (base, seen) = spawn_server().await;
    let (client, session) = client(&base);
    logged_in(&session, TOKEN);

    let file = UploadFile::new("scan.png", vec![0x89, b'P', b'N', b'G']).unwrap();
    let record = client.upload_invoice(file).await.unwrap();
    assert_eq!(record.id, 77);
    assert_eq!(record.file_name(), Some("scan.png"));

    let seen = seen.lock().unwrap();
    assert_eq!(
        seen.uploads,
        vec![(
            "file".to_string(),
            "scan.png".to_string(),
            "image/png".to_string(),
            4
        )]
    );
}

#[tokio::test]
async fn sync_posts_invoice_and_po_number() {
    let (base, seen) = spawn_server().await;
    let (client, session) = client(&base);
    logged_in(&session, TOKEN);

    let resp = client
        .sync_invoice(&SyncRequest {
            vendor_invoice_id: 42,
            po_number: "PO-9".to_string(),
        })
        .await
        .unwrap();
    assert!(resp.success);
    assert_eq!(resp.success_message(), "Synced");
    assert_eq!(
        seen.lock().unwrap().sync_bodies,
        vec![json!({"vendor_invoice_id": 42, "po_number": "PO-9"})]
    );
}

#[tokio::test]
async fn patch_validation_errors_are_flattened() {
    let (base, _seen) = spawn_server().await;
    let (client, session) = client(&base);
    logged_in(&session, TOKEN);

    let mut ok = Map::new();
    ok.insert("vendor_name".to_string(), json!("Globex"));
    let record = client.patch_invoice(42, &ok).await.unwrap();
    assert_eq!(record.vendor_name, "Globex");

    let mut bad = Map::new();
    bad.insert("total_amount".to_string(), json!("abc"));
    assert_matches!(
        client.patch_invoice(42, &bad).await,
        Err(Error::Validation(msg)) if msg == "total_amount: Input should be a valid number"
    );
}

#[tokio::test]
async fn unreachable_server_is_transient() {
    // 绑定后立即释放端口, 保证没有服务在监听
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (client, session) = client(&format!("http://{addr}"));
    logged_in(&session, TOKEN);

    let err = client.list_invoices().await.unwrap_err();
    assert!(err.is_retryable());
    assert_matches!(err, Error::Transient(_));
    assert!(session.is_authenticated());
}
