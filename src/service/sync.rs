use dashmap::DashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use super::resolver::PoResolver;
use super::store::InvoiceStore;
use crate::api::InvoiceBackend;
use crate::error::{Error, Result};
use crate::models::sync::TRANSPORT_FAILURE_MESSAGE;
use crate::models::{SyncOutcome, SyncRequest};

/// 同步状态机
///
/// `Idle` -> `Ready` (已输入 PO 号且解析成功) -> `Syncing` -> `Succeeded`;
/// 失败后回到 `Ready`, 失败原因通过 [`SyncOrchestrator::last_outcome`] 获取。
#[derive(Debug, Clone, PartialEq)]
pub enum SyncState {
    Idle,
    Ready,
    Syncing,
    Succeeded { message: String },
}

/// 发票与 PO 的匹配同步
pub struct SyncOrchestrator {
    backend: Arc<dyn InvoiceBackend>,
    store: Arc<InvoiceStore>,
    resolver: Arc<PoResolver>,
    /// 正在同步的发票 ID, 每张发票同时只允许一次同步
    in_flight: DashSet<i64>,
    last_outcome: Mutex<Option<SyncOutcome>>,
}

/// 同步结束 (包括提前返回) 时释放占用
struct InFlight<'a> {
    set: &'a DashSet<i64>,
    invoice_id: i64,
}

impl<'a> InFlight<'a> {
    fn acquire(set: &'a DashSet<i64>, invoice_id: i64) -> Result<Self> {
        if !set.insert(invoice_id) {
            return Err(Error::AlreadyInProgress(invoice_id));
        }
        Ok(Self { set, invoice_id })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.remove(&self.invoice_id);
    }
}

impl SyncOrchestrator {
    pub fn new(
        backend: Arc<dyn InvoiceBackend>,
        store: Arc<InvoiceStore>,
        resolver: Arc<PoResolver>,
    ) -> Self {
        Self {
            backend,
            store,
            resolver,
            in_flight: DashSet::new(),
            last_outcome: Mutex::new(None),
        }
    }

    fn outcome_slot(&self) -> MutexGuard<'_, Option<SyncOutcome>> {
        self.last_outcome.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self, invoice_id: i64) -> SyncState {
        if self.in_flight.contains(&invoice_id) {
            return SyncState::Syncing;
        }
        if let Some(SyncOutcome::Succeeded { message, .. }) = self.outcome_slot().as_ref() {
            return SyncState::Succeeded {
                message: message.clone(),
            };
        }
        let po_number = self.resolver.trimmed_input();
        if !po_number.is_empty() && self.resolver.resolved_for(&po_number).is_some() {
            SyncState::Ready
        } else {
            SyncState::Idle
        }
    }

    pub fn is_syncing(&self, invoice_id: i64) -> bool {
        self.in_flight.contains(&invoice_id)
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.outcome_slot().clone()
    }

    /// PO 号被修改或重新打开发票时清除上一次结果
    pub fn reset(&self) {
        self.outcome_slot().take();
    }

    /// 把发票与当前输入的 PO 号匹配并同步到 ERP
    ///
    /// 本地拒绝 (不发请求): PO 号为空或未解析成功返回 `MissingPoNumber`,
    /// 同一发票已有同步在进行返回 `AlreadyInProgress`。远程失败以 `SyncOutcome::Failed` 返回, 可直接重试;
    /// 会话失效 (包括同步成功后重新加载时) 返回 `Unauthorized`。
    pub async fn sync(&self, invoice_id: i64) -> Result<SyncOutcome> {
        let po_number = self.resolver.trimmed_input();
        if po_number.is_empty() || self.resolver.resolved_for(&po_number).is_none() {
            warn!("Refusing to sync invoice {}: no resolved PO number", invoice_id);
            return Err(Error::MissingPoNumber);
        }

        let _in_flight = InFlight::acquire(&self.in_flight, invoice_id).inspect_err(|_| {
            warn!("Sync for invoice {} already in progress", invoice_id);
        })?;

        info!("Syncing invoice {} against PO {}", invoice_id, po_number);
        let request = SyncRequest {
            vendor_invoice_id: invoice_id,
            po_number: po_number.clone(),
        };

        let outcome = match self.backend.sync_invoice(&request).await {
            Ok(resp) if resp.success => {
                let message = resp.success_message();
                info!("Invoice {} synced to PO {}: {}", invoice_id, po_number, message);
                // 以服务端重新加载的记录为准, 不在本地改状态
                let record = match self.store.load(invoice_id).await {
                    Ok(record) => Some(record),
                    Err(Error::Unauthorized) => return Err(Error::Unauthorized),
                    Err(e) => {
                        warn!("Invoice {} synced but reload failed: {}", invoice_id, e);
                        None
                    }
                };
                SyncOutcome::Succeeded { message, record }
            }
            Ok(resp) => {
                let message = resp.failure_message();
                warn!("Sync of invoice {} rejected: {}", invoice_id, message);
                SyncOutcome::Failed { message }
            }
            Err(Error::Unauthorized) => return Err(Error::Unauthorized),
            Err(e) => {
                warn!("Sync of invoice {} failed: {}", invoice_id, e);
                SyncOutcome::Failed {
                    message: e
                        .server_detail()
                        .unwrap_or(TRANSPORT_FAILURE_MESSAGE)
                        .to_string(),
                }
            }
        };

        *self.outcome_slot() = Some(outcome.clone());
        Ok(outcome)
    }
}
