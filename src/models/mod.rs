pub mod auth;
pub mod dashboard;
pub mod invoice;
pub mod money;
pub mod purchase_order;
pub mod sync;

pub use auth::{LoginResponse, RegisterRequest, User};
pub use dashboard::{DashboardStats, DashboardSummary};
pub use invoice::{ConfidenceBand, FieldKind, InvoiceField, InvoiceRecord, InvoiceStatus};
pub use money::{display_amount, format_currency, sum_amounts, NO_VALUE};
pub use purchase_order::{PoLineItem, PurchaseOrder, DEFAULT_CURRENCY};
pub use sync::{SyncOutcome, SyncRequest, SyncResponse};
