use serde::{Deserialize, Serialize};

use super::invoice::InvoiceRecord;

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Invoice synced successfully!";
pub const DEFAULT_FAILURE_MESSAGE: &str = "Sync failed";
/// 网络错误时使用的通用提示
pub const TRANSPORT_FAILURE_MESSAGE: &str = "Sync failed. Please try again.";

/// 同步请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncRequest {
    pub vendor_invoice_id: i64,
    pub po_number: String,
}

/// 同步接口响应
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub sync_operation_id: Option<i64>,
}

impl SyncResponse {
    pub fn success_message(&self) -> String {
        non_empty(self.message.as_deref())
            .unwrap_or(DEFAULT_SUCCESS_MESSAGE)
            .to_string()
    }

    /// 失败原因: message 优先, 其次 error
    pub fn failure_message(&self) -> String {
        non_empty(self.message.as_deref())
            .or_else(|| non_empty(self.error.as_deref()))
            .unwrap_or(DEFAULT_FAILURE_MESSAGE)
            .to_string()
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}

/// 一次同步尝试的结果
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    /// 同步成功; `record` 为同步后重新加载的发票, 重新加载失败时为 None
    Succeeded {
        message: String,
        record: Option<InvoiceRecord>,
    },
    /// 同步失败, 发票保持不变, 可以直接重试
    Failed { message: String },
}

impl SyncOutcome {
    pub fn message(&self) -> &str {
        match self {
            SyncOutcome::Succeeded { message, .. } | SyncOutcome::Failed { message } => message,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SyncOutcome::Succeeded { .. })
    }
}
