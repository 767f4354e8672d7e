use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::patch::FieldPatchController;
use super::resolver::{LookupState, PoResolver};
use super::store::InvoiceStore;
use super::sync::{SyncOrchestrator, SyncState};
use crate::api::{InvoiceBackend, UploadFile};
use crate::config::ReviewConfig;
use crate::error::{Error, Result};
use crate::models::{InvoiceField, InvoiceRecord, SyncOutcome};

/// 单张发票的审核流程: 上传/加载 -> 编辑字段 -> 查询 PO -> 同步
pub struct ReviewSession {
    backend: Arc<dyn InvoiceBackend>,
    store: Arc<InvoiceStore>,
    resolver: Arc<PoResolver>,
    patcher: FieldPatchController,
    orchestrator: SyncOrchestrator,
}

impl ReviewSession {
    pub fn new(backend: Arc<dyn InvoiceBackend>, config: &ReviewConfig) -> Self {
        Self::with_debounce(backend, config.debounce())
    }

    pub fn with_debounce(backend: Arc<dyn InvoiceBackend>, debounce: Duration) -> Self {
        let resolver = Arc::new(PoResolver::new(backend.clone(), debounce));
        let store = Arc::new(InvoiceStore::new(backend.clone(), resolver.clone()));
        let patcher = FieldPatchController::new(backend.clone(), store.clone());
        let orchestrator = SyncOrchestrator::new(backend.clone(), store.clone(), resolver.clone());

        Self {
            backend,
            store,
            resolver,
            patcher,
            orchestrator,
        }
    }

    /// 打开 (或刷新) 一张发票
    ///
    /// 加载失败时当前发票和它的 PO 输入保持不变。
    pub async fn open(&self, invoice_id: i64) -> Result<InvoiceRecord> {
        let record = self.backend.get_invoice(invoice_id).await?;
        info!(
            "Opened invoice {} ({}) [{}]",
            record.id, record.invoice_number, record.status
        );
        Ok(self.adopt(record))
    }

    /// 上传文件并打开服务端返回的发票
    pub async fn upload(&self, path: &Path) -> Result<InvoiceRecord> {
        let file = UploadFile::from_path(path).await?;
        let record = self.backend.upload_invoice(file).await?;
        Ok(self.adopt(record))
    }

    /// 打开一条已从服务端取得的记录 (例如上传响应)
    pub fn adopt(&self, record: InvoiceRecord) -> InvoiceRecord {
        self.switch_to(record.id);
        self.store.replace(record.clone());
        record
    }

    fn switch_to(&self, invoice_id: i64) {
        if self.store.current_id().is_some_and(|id| id != invoice_id) {
            info!("Switching review to invoice {}", invoice_id);
            self.resolver.reset();
        }
        self.orchestrator.reset();
    }

    /// PO 号输入变化
    pub async fn set_po_input(&self, raw: &str) -> Result<Option<LookupState>> {
        self.orchestrator.reset();
        self.resolver.set_input(raw).await
    }

    /// 等待自动填入的 PO 号查询结束
    pub async fn wait_for_lookup(&self) -> LookupState {
        self.resolver.settled().await
    }

    pub async fn edit(&self, field: InvoiceField, raw: &str) -> Result<InvoiceRecord> {
        let invoice_id = self.require_open()?;
        self.patcher.patch(invoice_id, field, raw).await
    }

    pub async fn edit_many(&self, edits: &[(InvoiceField, String)]) -> Result<Vec<Result<InvoiceRecord>>> {
        let invoice_id = self.require_open()?;
        Ok(self.patcher.patch_many(invoice_id, edits).await)
    }

    pub async fn sync(&self) -> Result<SyncOutcome> {
        let invoice_id = self.require_open()?;
        self.orchestrator.sync(invoice_id).await
    }

    fn require_open(&self) -> Result<i64> {
        self.store
            .current_id()
            .ok_or_else(|| Error::Validation("no invoice is open for review".to_string()))
    }

    pub fn record(&self) -> Option<InvoiceRecord> {
        self.store.current()
    }

    pub fn po_input(&self) -> String {
        self.resolver.input()
    }

    pub fn lookup(&self) -> LookupState {
        self.resolver.state()
    }

    pub fn sync_state(&self) -> SyncState {
        match self.store.current_id() {
            Some(id) => self.orchestrator.state(id),
            None => SyncState::Idle,
        }
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.orchestrator.last_outcome()
    }

    pub fn store(&self) -> &Arc<InvoiceStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<PoResolver> {
        &self.resolver
    }

    pub fn orchestrator(&self) -> &SyncOrchestrator {
        &self.orchestrator
    }
}
