use thiserror::Error;

/// 客户端错误分类
///
/// `Unauthorized` 由 API 客户端统一处理 (清空会话), 其余错误交给发起调用的组件自行展示。
#[derive(Debug, Error)]
pub enum Error {
    /// 凭证无效或已过期
    #[error("session expired or invalid, please log in again")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    /// 本地输入或服务端校验失败
    #[error("validation failed: {0}")]
    Validation(String),

    /// 网络或服务端 5xx 错误, 可重试
    #[error("temporary failure: {0}")]
    Transient(String),

    /// 服务端明确拒绝的业务操作
    #[error("rejected by server: {0}")]
    Conflict(String),

    /// 同步前未输入 PO 号, 或 PO 尚未成功解析
    #[error("please enter a PO number and wait for it to resolve before syncing")]
    MissingPoNumber,

    #[error("a sync for invoice {0} is already in progress")]
    AlreadyInProgress(i64),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// 用户是否可以直接重试同一操作
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Transient(_) | Error::Conflict(_) | Error::AlreadyInProgress(_)
        )
    }

    /// 服务端给出的说明文字 (不含网络错误)
    pub fn server_detail(&self) -> Option<&str> {
        match self {
            Error::NotFound(d) | Error::Validation(d) | Error::Conflict(d) => Some(d),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
