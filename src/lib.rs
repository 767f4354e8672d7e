pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod session;

pub use api::{ApiClient, InvoiceBackend};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use service::{DashboardAggregator, ReviewSession};
pub use session::{Session, SessionManager, SessionState};
