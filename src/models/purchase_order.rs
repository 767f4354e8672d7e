use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::str::FromStr;

use super::money::NO_VALUE;

pub const DEFAULT_CURRENCY: &str = "USD";

/// ERP 采购订单的规范化表示
///
/// ERP 返回的字段可能是 camelCase 也可能是 snake_case, 统一在 [`PurchaseOrder::from_payload`]
/// 中转换, 下游代码不再区分命名风格。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseOrder {
    pub po_number: String,
    pub status: Option<String>,
    pub total_amount: Option<BigDecimal>,
    pub currency_code: String,
    pub vendor_name: Option<String>,
    pub line_items: Vec<PoLineItem>,
}

/// 采购订单明细行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoLineItem {
    pub line_number: u32,
    pub part_number: Option<String>,
    pub description: Option<String>,
    pub quantity: BigDecimal,
    pub unit_price: Option<BigDecimal>,
    pub line_total: Option<BigDecimal>,
}

impl PurchaseOrder {
    /// 从 ERP 原始 JSON 构建; `requested` 为查询时使用的 PO 号, 响应中没有 PO 号时使用
    pub fn from_payload(requested: &str, payload: &Value) -> Option<Self> {
        let obj = payload.as_object()?;

        let line_items = pick(obj, "lineItems", "line_items")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(idx, item)| item.as_object().map(|o| PoLineItem::from_object(idx, o)))
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            po_number: pick_string(obj, "poNumber", "po_number")
                .unwrap_or_else(|| requested.trim().to_string()),
            status: pick_string(obj, "status", "status"),
            total_amount: pick(obj, "totalAmount", "total_amount").and_then(as_decimal),
            currency_code: pick_string(obj, "currencyCode", "currency_code")
                .or_else(|| pick_string(obj, "currency", "currency"))
                .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
            vendor_name: pick_string(obj, "vendorName", "vendor_name"),
            line_items,
        })
    }

    pub fn status_label(&self) -> &str {
        self.status.as_deref().unwrap_or("Unknown")
    }

    pub fn is_open(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("open"))
    }
}

impl PoLineItem {
    fn from_object(idx: usize, obj: &Map<String, Value>) -> Self {
        Self {
            line_number: pick(obj, "lineNumber", "line_number")
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(idx as u32 + 1),
            part_number: pick_string(obj, "partNumber", "part_number"),
            description: pick_string(obj, "description", "description"),
            quantity: pick(obj, "quantity", "quantity")
                .and_then(as_decimal)
                .unwrap_or_else(BigDecimal::zero),
            unit_price: pick(obj, "unitPrice", "unit_price").and_then(as_decimal),
            line_total: pick(obj, "lineTotal", "line_total").and_then(as_decimal),
        }
    }

    pub fn part_number_label(&self) -> &str {
        self.part_number.as_deref().unwrap_or(NO_VALUE)
    }

    pub fn description_label(&self) -> &str {
        self.description.as_deref().unwrap_or(NO_VALUE)
    }
}

/// 优先 camelCase, 缺失或为 null 时回退到 snake_case
fn pick<'a>(obj: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    obj.get(camel)
        .filter(|v| !v.is_null())
        .or_else(|| obj.get(snake).filter(|v| !v.is_null()))
}

fn pick_string(obj: &Map<String, Value>, camel: &str, snake: &str) -> Option<String> {
    pick(obj, camel, snake).and_then(|v| match v {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    })
}

/// 金额可能是数字也可能是字符串
fn as_decimal(v: &Value) -> Option<BigDecimal> {
    match v {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(BigDecimal::from(i))
            } else {
                BigDecimal::from_str(&n.to_string()).ok()
            }
        }
        Value::String(s) => BigDecimal::from_str(s.trim()).ok(),
        _ => None,
    }
}
