//! Provider adapter: command plans, prompt shimming, and the task executors
//! that run them.

pub mod approval;
pub mod command;
pub mod executor;
pub mod logging;
pub mod runner;
pub mod shim;
pub mod task;

pub use acap_process::ExecutionResult;
pub use approval::{ApprovalRequired, approval_markers, detect_approval_required};
pub use command::{CommandPlan, build_prompt_plan, build_session_plan, bypass_args};
pub use executor::{TaskExecutor, degraded_capability_warning, repair_prompt};
pub use runner::{CommandRunner, LocalRunner};
pub use shim::shim_prompt;
pub use task::{DEFAULT_ALLOWED_TOOLS, TaskSpec};
