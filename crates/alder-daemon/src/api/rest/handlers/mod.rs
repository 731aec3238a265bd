//! REST handlers.

mod approvals;
mod audit;
mod hardware;
mod health;
mod kernel;
mod logs;
mod missions;
mod system;

pub use approvals::{grant_all_approvals, list_approvals};
pub use audit::{audit_entries, audit_verify};
pub use hardware::allocate_hardware;
pub use health::health;
pub use kernel::invoke_kernel;
pub use logs::{recent_logs, stream_logs};
pub use missions::list_missions;
pub use system::{force_triage, run_preflight, set_autonomy_tier, shutdown};
