use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::backend::{InvoiceBackend, UploadFile};
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::models::{
    DashboardStats, InvoiceRecord, LoginResponse, RegisterRequest, SyncRequest, SyncResponse, User,
};
use crate::session::{Session, SessionManager};

/// 请求是否需要携带 Bearer 令牌
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Auth {
    Bearer,
    /// 注册/登录接口: 401 表示账号密码错误, 不影响全局会话
    Public,
}

/// 发票对账服务的 HTTP 客户端
///
/// 所有状态码到 [`Error`] 的映射都在这里完成; 401 会清空 [`SessionManager`]。
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: Url,
    session: Arc<SessionManager>,
}

impl ApiClient {
    pub fn new(config: &ApiConfig, session: Arc<SessionManager>) -> Result<Self> {
        let base_url = Url::parse(&normalize_base_url(&config.base_url))
            .map_err(|e| Error::Validation(format!("invalid API base url {}: {e}", config.base_url)))?;
        let http = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::Transient(format!("failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url,
            session,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Auth
    // -----------------------------------------------------------------------

    pub async fn register(&self, request: &RegisterRequest) -> Result<Value> {
        let url = self.endpoint(&["api", "auth", "register"])?;
        let req = self.http.post(url).json(request);
        let created: Value = self.send(req, Auth::Public).await?;
        info!("Registered account {}", request.email);
        Ok(created)
    }

    /// 表单登录 (`username=<email>`), 成功后写入会话
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let url = self.endpoint(&["api", "auth", "login"])?;
        let req = self
            .http
            .post(url)
            .form(&[("username", email), ("password", password)]);
        let resp: LoginResponse = self.send(req, Auth::Public).await?;

        self.session.set(Session {
            access_token: resp.access_token,
            user: resp.user.clone(),
        });

        let user = match resp.user {
            Some(user) => user,
            None => {
                let user = self.current_user().await?;
                self.session.set(Session {
                    access_token: self.session.token().unwrap_or_default(),
                    user: Some(user.clone()),
                });
                user
            }
        };
        info!("Logged in as {}", user.email);
        Ok(user)
    }

    pub fn logout(&self) {
        self.session.clear();
        info!("Logged out");
    }

    pub async fn current_user(&self) -> Result<User> {
        let url = self.endpoint(&["api", "auth", "me"])?;
        self.send(self.authorized(Method::GET, url), Auth::Bearer).await
    }

    // -----------------------------------------------------------------------
    // Request plumbing
    // -----------------------------------------------------------------------

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Validation(format!("API base url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, method: Method, url: Url) -> RequestBuilder {
        let req = self.http.request(method, url);
        match self.session.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder, auth: Auth) -> Result<T> {
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Transient(friendly_error(&self.base_url, &e)))?;
        let status = resp.status();
        let url = resp.url().clone();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::Transient(friendly_error(&self.base_url, &e)))?;

        if status.is_success() {
            debug!("{} -> {}", url.path(), status);
            let body = if body.trim().is_empty() { "null" } else { body.as_str() };
            return serde_json::from_str(body)
                .map_err(|e| Error::Transient(format!("invalid JSON from {}: {e}", url.path())));
        }

        let err = classify(status, &body);
        if matches!(err, Error::Unauthorized) {
            if auth == Auth::Bearer {
                self.session.invalidate();
            } else {
                return Err(Error::Validation(
                    error_detail(&body).unwrap_or_else(|| "incorrect email or password".to_string()),
                ));
            }
        }
        warn!("{} -> {}: {}", url.path(), status, err);
        Err(err)
    }
}

#[async_trait]
impl InvoiceBackend for ApiClient {
    async fn upload_invoice(&self, file: UploadFile) -> Result<InvoiceRecord> {
        let url = self.endpoint(&["api", "invoices", "upload"])?;
        let size = file.bytes.len();
        let part = Part::bytes(file.bytes)
            .file_name(file.file_name.clone())
            .mime_str(file.content_type)
            .map_err(|e| Error::Validation(format!("invalid content type: {e}")))?;
        let req = self
            .authorized(Method::POST, url)
            .multipart(Form::new().part("file", part));

        let record: InvoiceRecord = self.send(req, Auth::Bearer).await?;
        info!(
            "Uploaded {} ({} bytes) as invoice {} [{}]",
            file.file_name, size, record.id, record.status
        );
        Ok(record)
    }

    async fn list_invoices(&self) -> Result<Vec<InvoiceRecord>> {
        let url = self.endpoint(&["api", "invoices"])?;
        self.send(self.authorized(Method::GET, url), Auth::Bearer).await
    }

    async fn get_invoice(&self, id: i64) -> Result<InvoiceRecord> {
        let url = self.endpoint(&["api", "invoices", &id.to_string()])?;
        self.send(self.authorized(Method::GET, url), Auth::Bearer).await
    }

    async fn patch_invoice(&self, id: i64, changes: &Map<String, Value>) -> Result<InvoiceRecord> {
        let url = self.endpoint(&["api", "invoices", &id.to_string()])?;
        let req = self.authorized(Method::PATCH, url).json(changes);
        self.send(req, Auth::Bearer).await
    }

    async fn sync_invoice(&self, request: &SyncRequest) -> Result<SyncResponse> {
        let url = self.endpoint(&["api", "sync"])?;
        let req = self.authorized(Method::POST, url).json(request);
        self.send(req, Auth::Bearer).await
    }

    async fn purchase_order(&self, po_number: &str) -> Result<Value> {
        let url = self.endpoint(&["api", "sync", "purchase-order", po_number])?;
        self.send(self.authorized(Method::GET, url), Auth::Bearer).await
    }

    async fn dashboard(&self) -> Result<DashboardStats> {
        let url = self.endpoint(&["api", "analytics", "dashboard"])?;
        self.send(self.authorized(Method::GET, url), Auth::Bearer).await
    }
}

// ---------------------------------------------------------------------------
// URL / error helpers
// ---------------------------------------------------------------------------

/// 补全协议 (localhost 用 http, 其余 https) 并去掉末尾的 `/`
pub fn normalize_base_url(url: &str) -> String {
    let mut url = url.trim().to_string();

    if !url.starts_with("http://") && !url.starts_with("https://") {
        if url.starts_with("localhost") || url.starts_with("127.0.0.1") {
            url = format!("http://{url}");
        } else {
            url = format!("https://{url}");
        }
    }

    while url.ends_with('/') {
        url.pop();
    }
    url
}

fn friendly_error(base: &Url, err: &reqwest::Error) -> String {
    if err.is_connect() {
        return format!("cannot reach server at {base}");
    }
    if err.is_timeout() {
        return format!("request to {base} timed out");
    }
    format!("network error communicating with {base}: {err}")
}

/// 状态码 -> 错误分类
fn classify(status: StatusCode, body: &str) -> Error {
    let detail = || error_detail(body).unwrap_or_else(|| format!("HTTP {}", status.as_u16()));
    match status {
        StatusCode::UNAUTHORIZED => Error::Unauthorized,
        StatusCode::NOT_FOUND => Error::NotFound(detail()),
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => Error::Validation(detail()),
        s if s.is_server_error() => Error::Transient(detail()),
        _ => Error::Conflict(detail()),
    }
}

/// 从错误响应中提取说明: `detail` (字符串或校验错误列表) > `message` > `error` > 原始文本
fn error_detail(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    let Ok(json) = serde_json::from_str::<Value>(trimmed) else {
        return Some(trimmed.chars().take(200).collect());
    };

    let from_detail = json.get("detail").and_then(|d| match d {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => {
            let msgs: Vec<String> = items
                .iter()
                .map(|item| {
                    let msg = item.get("msg").and_then(Value::as_str).unwrap_or("invalid value");
                    let field = item
                        .get("loc")
                        .and_then(Value::as_array)
                        .and_then(|loc| loc.last())
                        .and_then(Value::as_str);
                    match field {
                        Some(field) => format!("{field}: {msg}"),
                        None => msg.to_string(),
                    }
                })
                .collect();
            Some(msgs.join("; ")).filter(|s| !s.is_empty())
        }
        Value::Null => None,
        other => Some(other.to_string()),
    });

    from_detail
        .or_else(|| json.get("message").and_then(Value::as_str).map(str::to_string))
        .or_else(|| json.get("error").and_then(Value::as_str).map(str::to_string))
}
