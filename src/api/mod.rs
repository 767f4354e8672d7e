pub mod backend;
pub mod client;

pub use backend::{InvoiceBackend, UploadFile};
pub use client::{normalize_base_url, ApiClient};
