//! Output handling for provider runs: structured JSON recovery, human-facing
//! stream rendering, and the JSONL run log.

pub mod json_extract;
pub mod run_log;
pub mod stream_clean;

pub use json_extract::{
    ExtractError, ExtractObserver, ExtractOptions, ExtractStage, extract_json_object,
    extract_json_object_observed,
};
pub use run_log::{
    RunEventType, RunLogger, SESSION_FINISHED, SESSION_STARTED, find_latest_run_log, read_last_lines,
};
pub use stream_clean::StreamCleaner;
