use bigdecimal::BigDecimal;
use indexmap::IndexMap;
use std::sync::Arc;

use crate::api::InvoiceBackend;
use crate::error::Result;
use crate::models::{
    sum_amounts, DashboardStats, DashboardSummary, InvoiceRecord, InvoiceStatus,
};

/// 最近发票列表长度
pub const RECENT_LIMIT: usize = 5;

/// 仪表盘汇总 (只读)
///
/// 汇总时缺失的金额按 0 计; 单条记录显示时缺失金额显示为 "N/A", 两者规则不同。
pub struct DashboardAggregator {
    backend: Arc<dyn InvoiceBackend>,
}

impl DashboardAggregator {
    pub fn new(backend: Arc<dyn InvoiceBackend>) -> Self {
        Self { backend }
    }

    /// 使用服务端计算好的统计
    pub async fn fetch(&self) -> Result<DashboardSummary> {
        let stats = self.backend.dashboard().await?;
        Ok(summarize_stats(stats))
    }

    /// 拉取发票列表后在本地汇总
    pub async fn from_invoices(&self) -> Result<DashboardSummary> {
        let invoices = self.backend.list_invoices().await?;
        Ok(summarize(&invoices))
    }
}

/// 从发票列表计算汇总
pub fn summarize(invoices: &[InvoiceRecord]) -> DashboardSummary {
    let mut by_status: IndexMap<String, u64> = IndexMap::new();
    for invoice in invoices {
        *by_status.entry(invoice.status.to_string()).or_insert(0) += 1;
    }

    let count = |pred: fn(&InvoiceStatus) -> bool| {
        invoices.iter().filter(|i| pred(&i.status)).count() as u64
    };

    let scores: Vec<f64> = invoices.iter().filter_map(|i| i.confidence_score).collect();
    let average_confidence =
        (!scores.is_empty()).then(|| scores.iter().sum::<f64>() / scores.len() as f64);

    let mut recent: Vec<InvoiceRecord> = invoices.to_vec();
    // 新的在前; 没有创建时间的排在最后
    recent.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    recent.truncate(RECENT_LIMIT);

    DashboardSummary {
        total: invoices.len() as u64,
        by_status,
        pending_sync: count(InvoiceStatus::is_pending_like),
        synced: count(|s| *s == InvoiceStatus::Synced),
        failed: count(|s| *s == InvoiceStatus::Failed),
        total_amount: sum_amounts(invoices.iter().map(|i| i.total_amount.as_ref())),
        recent,
        sync_success_rate: None,
        average_confidence,
    }
}

/// 规范化服务端统计 (扁平结构或按状态分组结构)
pub fn summarize_stats(stats: DashboardStats) -> DashboardSummary {
    let grouped = |pred: fn(&InvoiceStatus) -> bool| -> Option<u64> {
        if stats.status_counts.is_empty() {
            return None;
        }
        Some(
            stats
                .status_counts
                .iter()
                .filter(|(status, _)| pred(&InvoiceStatus::from((*status).clone())))
                .map(|(_, n)| *n)
                .sum(),
        )
    };

    let pending_sync = stats
        .pending_sync
        .or_else(|| grouped(InvoiceStatus::is_pending_like))
        .unwrap_or(0);
    let synced = stats
        .synced
        .or_else(|| grouped(|s| *s == InvoiceStatus::Synced))
        .unwrap_or(0);
    let failed = stats
        .failed
        .or_else(|| grouped(|s| *s == InvoiceStatus::Failed))
        .unwrap_or(0);

    let by_status = if stats.status_counts.is_empty() {
        IndexMap::from([
            ("pending".to_string(), pending_sync),
            ("synced".to_string(), synced),
            ("failed".to_string(), failed),
        ])
    } else {
        stats.status_counts.clone()
    };

    let total = stats
        .total_invoices
        .unwrap_or_else(|| by_status.values().sum());

    let sync_success_rate = stats.sync_success_rate.or_else(|| {
        match (stats.successful_syncs, stats.total_syncs) {
            (Some(ok), Some(all)) if all > 0 => Some(ok as f64 / all as f64 * 100.0),
            _ => None,
        }
    });

    DashboardSummary {
        total,
        by_status,
        pending_sync,
        synced,
        failed,
        total_amount: stats.total_amount.unwrap_or_else(|| BigDecimal::from(0)),
        recent: stats.recent_invoices,
        sync_success_rate,
        average_confidence: stats.average_confidence,
    }
}
