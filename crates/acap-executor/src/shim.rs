//! Prompt shim: folds system, tool-policy, and output contracts into the task
//! text for providers lacking the native flags.

const SYSTEM_HEADER: &str = "=== SYSTEM CONTRACT ===";
const TOOL_POLICY_HEADER: &str = "=== TOOL POLICY CONTRACT ===";
const OUTPUT_HEADER: &str = "=== OUTPUT CONTRACT ===";
const TASK_HEADER: &str = "=== TASK ===";

/// Compose the shimmed prompt. Deterministic: equal inputs give equal text.
///
/// The tool policy section appears only when `allowed_tools` is given; the
/// output contract only when `require_json` is set. The task body is kept
/// verbatim.
pub fn shim_prompt(
    task_body: &str,
    system_prompt: &str,
    allowed_tools: Option<&str>,
    require_json: bool,
) -> String {
    let mut blocks: Vec<String> = vec![SYSTEM_HEADER.into(), system_prompt.trim().into()];

    if let Some(tools) = allowed_tools.filter(|tools| !tools.is_empty()) {
        blocks.extend([
            String::new(),
            TOOL_POLICY_HEADER.into(),
            format!(
                "Prefer only these tool categories when available: {tools}. \
                 If unsupported by this harness, emulate equivalent behavior conservatively."
            ),
        ]);
    }

    if require_json {
        blocks.extend([
            String::new(),
            OUTPUT_HEADER.into(),
            "Return only valid JSON with no markdown fences or explanations.".into(),
        ]);
    }

    blocks.extend([String::new(), TASK_HEADER.into(), task_body.into()]);
    blocks.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_layout() {
        let text = shim_prompt("Do the thing.", "  Be terse.\n", Some("Edit,Bash"), true);
        assert_eq!(
            text,
            "=== SYSTEM CONTRACT ===\n\
             Be terse.\n\
             \n\
             === TOOL POLICY CONTRACT ===\n\
             Prefer only these tool categories when available: Edit,Bash. \
             If unsupported by this harness, emulate equivalent behavior conservatively.\n\
             \n\
             === OUTPUT CONTRACT ===\n\
             Return only valid JSON with no markdown fences or explanations.\n\
             \n\
             === TASK ===\n\
             Do the thing."
        );
    }

    #[test]
    fn test_minimal_layout_has_only_system_and_task() {
        let text = shim_prompt("body", "sys", None, false);
        assert_eq!(text, "=== SYSTEM CONTRACT ===\nsys\n\n=== TASK ===\nbody");
        assert!(!text.contains("TOOL POLICY"));
        assert!(!text.contains("OUTPUT CONTRACT"));
    }

    #[test]
    fn test_task_body_kept_verbatim() {
        let body = "  line one\n\n  === TASK ===  \ntrailing  ";
        let text = shim_prompt(body, "sys", None, false);
        assert!(text.ends_with(body));
    }

    #[test]
    fn test_empty_tool_list_omits_policy() {
        let text = shim_prompt("body", "sys", Some(""), false);
        assert!(!text.contains("TOOL POLICY"));
    }
}
