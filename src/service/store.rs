use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

use super::resolver::PoResolver;
use crate::api::InvoiceBackend;
use crate::error::Result;
use crate::models::InvoiceRecord;

/// 当前打开发票的客户端视图
///
/// 记录只会被服务端返回的完整数据整体替换, 从不在本地合并字段。
pub struct InvoiceStore {
    backend: Arc<dyn InvoiceBackend>,
    resolver: Arc<PoResolver>,
    current: Mutex<Option<InvoiceRecord>>,
}

impl InvoiceStore {
    pub fn new(backend: Arc<dyn InvoiceBackend>, resolver: Arc<PoResolver>) -> Self {
        Self {
            backend,
            resolver,
            current: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<InvoiceRecord>> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn current(&self) -> Option<InvoiceRecord> {
        self.lock().clone()
    }

    pub fn current_id(&self) -> Option<i64> {
        self.lock().as_ref().map(|r| r.id)
    }

    /// 从服务端加载发票; 失败时保留原记录
    pub async fn load(&self, id: i64) -> Result<InvoiceRecord> {
        let record = self.backend.get_invoice(id).await?;
        info!(
            "Loaded invoice {} ({}) [{}]",
            record.id, record.invoice_number, record.status
        );
        self.replace(record.clone());
        Ok(record)
    }

    /// 用服务端返回的记录整体替换当前记录
    ///
    /// 用户尚未输入 PO 号时填入识别出的第一个 PO 号; PO 查询在后台进行, 这里不等待。
    pub fn replace(&self, record: InvoiceRecord) {
        let detected_po = record.first_po_number().map(str::to_string);
        *self.lock() = Some(record);

        if let Some(po) = detected_po {
            self.resolver.seed(&po);
        }
    }
}
