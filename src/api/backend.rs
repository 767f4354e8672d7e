use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;

use crate::error::{Error, Result};
use crate::models::{DashboardStats, InvoiceRecord, SyncRequest, SyncResponse};

/// 发票对账核心依赖的远程接口
///
/// 生产环境由 [`crate::api::ApiClient`] 实现; 核心组件只依赖这个 trait。
#[async_trait]
pub trait InvoiceBackend: Send + Sync {
    /// 上传发票文件, 服务端同步完成字段抽取
    async fn upload_invoice(&self, file: UploadFile) -> Result<InvoiceRecord>;

    async fn list_invoices(&self) -> Result<Vec<InvoiceRecord>>;

    async fn get_invoice(&self, id: i64) -> Result<InvoiceRecord>;

    /// 部分更新, 返回服务端完整的最新记录
    async fn patch_invoice(&self, id: i64, changes: &Map<String, Value>) -> Result<InvoiceRecord>;

    async fn sync_invoice(&self, request: &SyncRequest) -> Result<SyncResponse>;

    /// 原始 PO 数据, 字段命名风格不固定
    async fn purchase_order(&self, po_number: &str) -> Result<Value>;

    async fn dashboard(&self) -> Result<DashboardStats>;
}

/// 待上传的发票文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Result<Self> {
        let content_type = content_type_for(file_name).ok_or_else(|| {
            Error::Validation(format!(
                "unsupported file type for {file_name}; expected PDF, PNG, JPG or JPEG"
            ))
        })?;
        Ok(Self {
            file_name: file_name.to_string(),
            content_type,
            bytes,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::Validation(format!("invalid file path: {}", path.display())))?
            .to_string();
        // 先校验扩展名, 避免读取不支持的文件
        content_type_for(&file_name).ok_or_else(|| {
            Error::Validation(format!(
                "unsupported file type for {file_name}; expected PDF, PNG, JPG or JPEG"
            ))
        })?;
        let bytes = tokio::fs::read(path).await?;
        Self::new(&file_name, bytes)
    }
}

fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = file_name.rsplit_once('.')?.1.to_ascii_lowercase();
    match ext.as_str() {
        "pdf" => Some("application/pdf"),
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        _ => None,
    }
}
