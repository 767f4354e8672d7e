use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

/// 供应商发票 (VendorInvoice) 的规范化表示
///
/// 只能由服务端返回的数据构造; 客户端从不在本地修改字段或状态。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value")]
pub struct InvoiceRecord {
    pub id: i64,
    pub invoice_number: String,
    pub vendor_name: String,
    pub invoice_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub subtotal: Option<BigDecimal>,
    pub tax_amount: Option<BigDecimal>,
    pub total_amount: Option<BigDecimal>,
    pub po_numbers: Vec<String>,
    pub file_path: Option<String>,
    pub parsed_data: serde_json::Value,
    /// 抽取置信度 [0, 100], 已合并旧字段 `confidence`
    pub confidence_score: Option<f64>,
    pub status: InvoiceStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl InvoiceRecord {
    /// 抽取时识别出的第一个 PO 号; 第一项为空白时视为没有
    pub fn first_po_number(&self) -> Option<&str> {
        self.po_numbers
            .first()
            .map(|po| po.trim())
            .filter(|po| !po.is_empty())
    }

    pub fn is_synced(&self) -> bool {
        self.status == InvoiceStatus::Synced
    }

    pub fn confidence_band(&self) -> Option<ConfidenceBand> {
        self.confidence_score.map(ConfidenceBand::from_score)
    }

    /// 上传文件名 (存储路径的最后一段)
    pub fn file_name(&self) -> Option<&str> {
        self.file_path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|name| !name.is_empty())
    }
}

/// camelCase 写法 -> 服务端原生的 snake_case 写法
const CAMEL_CASE_KEYS: [(&str, &str); 12] = [
    ("invoiceNumber", "invoice_number"),
    ("vendorName", "vendor_name"),
    ("invoiceDate", "invoice_date"),
    ("dueDate", "due_date"),
    ("taxAmount", "tax_amount"),
    ("totalAmount", "total_amount"),
    ("poNumbers", "po_numbers"),
    ("filePath", "file_path"),
    ("parsedData", "parsed_data"),
    ("confidenceScore", "confidence_score"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
];

/// 两种写法同时出现时以 snake_case 为准, camelCase 只在 snake_case 缺失或为 null 时使用
impl TryFrom<serde_json::Value> for InvoiceRecord {
    type Error = serde_json::Error;

    fn try_from(mut value: serde_json::Value) -> Result<Self, Self::Error> {
        if let Some(obj) = value.as_object_mut() {
            for (camel, snake) in CAMEL_CASE_KEYS {
                if let Some(v) = obj.remove(camel) {
                    if obj.get(snake).map_or(true, serde_json::Value::is_null) {
                        obj.insert(snake.to_string(), v);
                    }
                }
            }
        }
        serde_json::from_value::<VendorInvoiceWire>(value).map(Self::from)
    }
}

/// 服务端 JSON 结构 (已统一为 snake_case)
#[derive(Debug, Deserialize)]
struct VendorInvoiceWire {
    id: i64,
    #[serde(default)]
    invoice_number: Option<String>,
    #[serde(default)]
    vendor_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_date")]
    invoice_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient_date")]
    due_date: Option<NaiveDate>,
    #[serde(default)]
    subtotal: Option<BigDecimal>,
    #[serde(default)]
    tax_amount: Option<BigDecimal>,
    #[serde(default)]
    total_amount: Option<BigDecimal>,
    #[serde(default)]
    po_numbers: Option<Vec<String>>,
    #[serde(default)]
    file_path: Option<String>,
    #[serde(default)]
    parsed_data: serde_json::Value,
    #[serde(default)]
    confidence_score: Option<f64>,
    /// 旧版字段
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient_timestamp")]
    updated_at: Option<DateTime<Utc>>,
}

impl From<VendorInvoiceWire> for InvoiceRecord {
    fn from(wire: VendorInvoiceWire) -> Self {
        let confidence_score = wire
            .confidence_score
            .or(wire.confidence)
            .filter(|score| score.is_finite())
            .map(|score| score.clamp(0.0, 100.0));

        Self {
            id: wire.id,
            invoice_number: wire.invoice_number.unwrap_or_default(),
            vendor_name: wire.vendor_name.unwrap_or_default(),
            invoice_date: wire.invoice_date,
            due_date: wire.due_date,
            subtotal: wire.subtotal,
            tax_amount: wire.tax_amount,
            total_amount: wire.total_amount,
            po_numbers: wire.po_numbers.unwrap_or_default(),
            file_path: wire.file_path,
            parsed_data: wire.parsed_data,
            confidence_score,
            status: wire
                .status
                .map(InvoiceStatus::from)
                .unwrap_or(InvoiceStatus::Pending),
            created_at: wire.created_at,
            updated_at: wire.updated_at,
        }
    }
}

/// 发票状态; 抽取流程定义的其他状态原样保留
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum InvoiceStatus {
    Pending,
    Synced,
    Failed,
    Other(String),
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &str {
        match self {
            InvoiceStatus::Pending => "pending",
            InvoiceStatus::Synced => "synced",
            InvoiceStatus::Failed => "failed",
            InvoiceStatus::Other(s) => s,
        }
    }

    /// 尚未同步且未失败 (上传、解析、匹配阶段)
    pub fn is_pending_like(&self) -> bool {
        match self {
            InvoiceStatus::Pending => true,
            InvoiceStatus::Other(s) => matches!(
                s.trim().to_ascii_lowercase().as_str(),
                "received" | "parsed" | "matched"
            ),
            _ => false,
        }
    }
}

impl From<String> for InvoiceStatus {
    fn from(s: String) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => InvoiceStatus::Pending,
            "synced" => InvoiceStatus::Synced,
            "failed" => InvoiceStatus::Failed,
            _ => InvoiceStatus::Other(s),
        }
    }
}

impl From<InvoiceStatus> for String {
    fn from(status: InvoiceStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceBand {
    High,
    Medium,
    Low,
}

impl ConfidenceBand {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            ConfidenceBand::High
        } else if score >= 60.0 {
            ConfidenceBand::Medium
        } else {
            ConfidenceBand::Low
        }
    }
}

/// 可编辑字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvoiceField {
    InvoiceNumber,
    VendorName,
    InvoiceDate,
    DueDate,
    Subtotal,
    TaxAmount,
    TotalAmount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Date,
    Amount,
}

impl InvoiceField {
    pub const ALL: [InvoiceField; 7] = [
        InvoiceField::InvoiceNumber,
        InvoiceField::VendorName,
        InvoiceField::InvoiceDate,
        InvoiceField::DueDate,
        InvoiceField::Subtotal,
        InvoiceField::TaxAmount,
        InvoiceField::TotalAmount,
    ];

    /// PATCH 请求体中的字段名
    pub fn wire_name(self) -> &'static str {
        match self {
            InvoiceField::InvoiceNumber => "invoice_number",
            InvoiceField::VendorName => "vendor_name",
            InvoiceField::InvoiceDate => "invoice_date",
            InvoiceField::DueDate => "due_date",
            InvoiceField::Subtotal => "subtotal",
            InvoiceField::TaxAmount => "tax_amount",
            InvoiceField::TotalAmount => "total_amount",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            InvoiceField::InvoiceNumber | InvoiceField::VendorName => FieldKind::Text,
            InvoiceField::InvoiceDate | InvoiceField::DueDate => FieldKind::Date,
            InvoiceField::Subtotal | InvoiceField::TaxAmount | InvoiceField::TotalAmount => {
                FieldKind::Amount
            }
        }
    }
}

impl FromStr for InvoiceField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        InvoiceField::ALL
            .into_iter()
            .find(|field| field.wire_name().replace('_', "") == normalized)
            .ok_or_else(|| format!("unknown invoice field: {s}"))
    }
}

impl fmt::Display for InvoiceField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// 解析日期, 服务端可能带时间部分 (`2024-01-31T00:00:00`), 只保留日期
pub fn parse_calendar_date(raw: &str) -> Option<NaiveDate> {
    let date_part = raw.trim().split('T').next()?;
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    // 服务端时间戳可能不带时区, 按 UTC 处理
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn lenient_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_calendar_date))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}
