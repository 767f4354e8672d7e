use bigdecimal::BigDecimal;
use futures::future::join_all;
use serde_json::{Map, Value};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use super::store::InvoiceStore;
use crate::api::InvoiceBackend;
use crate::error::{Error, Result};
use crate::models::invoice::parse_calendar_date;
use crate::models::{FieldKind, InvoiceField, InvoiceRecord};

/// 字段编辑控制器
///
/// 每次编辑只提交一个字段, 成功后用服务端返回的完整记录替换本地记录。
/// 同一字段的并发编辑以最后到达的响应为准。
pub struct FieldPatchController {
    backend: Arc<dyn InvoiceBackend>,
    store: Arc<InvoiceStore>,
}

impl FieldPatchController {
    pub fn new(backend: Arc<dyn InvoiceBackend>, store: Arc<InvoiceStore>) -> Self {
        Self { backend, store }
    }

    pub async fn patch(&self, invoice_id: i64, field: InvoiceField, raw: &str) -> Result<InvoiceRecord> {
        let value = coerce_value(field, raw)?;
        let mut changes = Map::new();
        changes.insert(field.wire_name().to_string(), value);

        let record = match self.backend.patch_invoice(invoice_id, &changes).await {
            Ok(record) => record,
            Err(e) => {
                warn!("Failed to update {} on invoice {}: {}", field, invoice_id, e);
                return Err(e);
            }
        };

        info!("Updated {} on invoice {} [{}]", field, invoice_id, record.status);
        match self.store.current_id() {
            Some(open) if open != invoice_id => {
                warn!("Invoice {} is no longer open (showing {}), not replacing", invoice_id, open);
            }
            _ => self.store.replace(record.clone()),
        }
        Ok(record)
    }

    /// 并发提交多个字段, 各自独立成功或失败
    pub async fn patch_many(
        &self,
        invoice_id: i64,
        edits: &[(InvoiceField, String)],
    ) -> Vec<Result<InvoiceRecord>> {
        join_all(
            edits
                .iter()
                .map(|(field, raw)| self.patch(invoice_id, *field, raw)),
        )
        .await
    }
}

/// 把输入框文本转换为 PATCH 请求中的值
///
/// 金额无法解析时置为 null, 不报错; 日期为空时置为 null, 格式错误时报校验错误。
pub fn coerce_value(field: InvoiceField, raw: &str) -> Result<Value> {
    match field.kind() {
        FieldKind::Text => Ok(Value::String(raw.to_string())),
        FieldKind::Date => {
            if raw.trim().is_empty() {
                return Ok(Value::Null);
            }
            parse_calendar_date(raw)
                .map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                .ok_or_else(|| Error::Validation(format!("{field}: expected a date like 2024-01-31, got '{raw}'")))
        }
        FieldKind::Amount => Ok(parse_amount(raw).map(decimal_to_json).unwrap_or(Value::Null)),
    }
}

/// 解析金额文本, 允许前导 `$` 和千分位逗号
pub fn parse_amount(raw: &str) -> Option<BigDecimal> {
    let cleaned: String = raw
        .trim()
        .trim_start_matches('$')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    BigDecimal::from_str(&cleaned).ok()
}

fn decimal_to_json(amount: BigDecimal) -> Value {
    let text = amount.to_string();
    match serde_json::from_str::<Value>(&text) {
        Ok(v @ Value::Number(_)) => v,
        _ => Value::String(text),
    }
}
