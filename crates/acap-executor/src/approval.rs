//! Approval-required detection from failed session output.

use acap_core::ProviderId;
use acap_process::ExecutionResult;
use serde::Serialize;

/// A failed attempt whose output asked for manual approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovalRequired {
    pub provider: ProviderId,
    pub matched_pattern: String,
}

/// Check a finished attempt for approval-required markers.
///
/// Only non-zero exits qualify. Matching is case-insensitive over stdout and
/// stderr combined.
pub fn detect_approval_required(
    provider: ProviderId,
    result: &ExecutionResult,
) -> Option<ApprovalRequired> {
    if result.exit_code == 0 {
        return None;
    }

    let combined = result.combined_output().to_lowercase();
    approval_markers(provider)
        .iter()
        .find(|marker| combined.contains(*marker))
        .map(|marker| ApprovalRequired {
            provider,
            matched_pattern: marker.to_string(),
        })
}

/// Lowercase markers per provider.
pub fn approval_markers(provider: ProviderId) -> &'static [&'static str] {
    match provider {
        ProviderId::Codex => &[
            "approval required",
            "requires approval",
            "needs approval",
            "awaiting approval",
            "approval policy",
            "sandbox denied",
            "rejected by user",
        ],
        ProviderId::Claude | ProviderId::Omp | ProviderId::Opencode => &[
            "approval required",
            "requires approval",
            "needs approval",
            "awaiting approval",
            "permission denied by policy",
        ],
    }
}
