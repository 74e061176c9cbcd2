pub mod config;
pub mod cursors;
pub mod error;
pub mod exporter;
pub mod retry;
pub mod scheduler;
pub mod status;
pub mod storage;

pub use config::{DaemonConfig, SourceConfig, resolve_state_path};
pub use cursors::CursorStore;
pub use error::{Error, Result};
pub use exporter::{Delivery, DeliveryError, Exporter, HttpDelivery};
pub use retry::{DrainReport, RetryQueue};
pub use scheduler::Daemon;
pub use status::StatusSnapshot;
