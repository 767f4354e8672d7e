use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::invoice::InvoiceRecord;

/// `/api/analytics/dashboard` 响应
///
/// 服务端出现过两种结构: 扁平计数 (`pending_sync` / `synced` / `failed`) 和按状态分组
/// (`status_counts`), 所有字段都是可选的。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashboardStats {
    #[serde(default)]
    pub total_invoices: Option<u64>,
    #[serde(default)]
    pub pending_sync: Option<u64>,
    #[serde(default)]
    pub synced: Option<u64>,
    #[serde(default)]
    pub failed: Option<u64>,
    #[serde(default)]
    pub total_amount: Option<BigDecimal>,
    #[serde(default)]
    pub recent_invoices: Vec<InvoiceRecord>,
    #[serde(default)]
    pub status_counts: IndexMap<String, u64>,
    #[serde(default)]
    pub successful_syncs: Option<u64>,
    #[serde(default)]
    pub total_syncs: Option<u64>,
    #[serde(default)]
    pub sync_success_rate: Option<f64>,
    #[serde(default)]
    pub average_confidence: Option<f64>,
}

/// 仪表盘汇总
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total: u64,
    /// 按状态计数, 保持首次出现的顺序
    pub by_status: IndexMap<String, u64>,
    pub pending_sync: u64,
    pub synced: u64,
    pub failed: u64,
    pub total_amount: BigDecimal,
    #[serde(skip)]
    pub recent: Vec<InvoiceRecord>,
    pub sync_success_rate: Option<f64>,
    pub average_confidence: Option<f64>,
}
