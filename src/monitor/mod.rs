//! Observation of in-flight node group updates
//!
//! A session owns its [`ProgressBoard`], polls every non-terminal update on a
//! fixed interval with a bounded fan-out, and ends when all updates are
//! terminal, the session times out, or the operator cancels it.

pub mod board;
pub mod retry;
pub mod session;
pub mod types;

pub use board::ProgressBoard;
pub use retry::{retry_with_backoff, RetryPolicy};
pub use session::{shutdown_on_ctrl_c, UpdateMonitor};
pub use types::{MonitorConfig, MonitorReport, SessionOutcome, UpdateProgress, UpdateStatus};
