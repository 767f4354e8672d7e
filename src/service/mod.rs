pub mod dashboard;
pub mod patch;
pub mod resolver;
pub mod review;
pub mod store;
pub mod sync;

pub use dashboard::{summarize, summarize_stats, DashboardAggregator};
pub use patch::{coerce_value, parse_amount, FieldPatchController};
pub use resolver::{InputOrigin, LookupState, PoResolver};
pub use review::ReviewSession;
pub use store::InvoiceStore;
pub use sync::{SyncOrchestrator, SyncState};
