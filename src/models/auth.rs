use serde::{Deserialize, Serialize};

/// 当前登录用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub created_at: Option<String>,
}

fn default_active() -> bool {
    true
}

/// 注册请求体
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
    pub full_name: String,
}

impl RegisterRequest {
    /// 未指定用户名时使用邮箱 `@` 之前的部分
    pub fn new(email: &str, password: &str, full_name: &str, username: Option<&str>) -> Self {
        let username = username
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| email.split('@').next().unwrap_or(email).to_string());

        Self {
            email: email.trim().to_string(),
            username,
            password: password.to_string(),
            full_name: full_name.trim().to_string(),
        }
    }
}

/// 登录响应
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub user: Option<User>,
}
