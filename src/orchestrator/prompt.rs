//! System prompt for the agent loop.

/// Behavioral contract the model must observe.
const BASE_PROMPT: &str = r#"You are a coding agent working inside a supervised execution loop.

Rules:
- To compute anything, write Python in a fenced markdown code block (```python).
  Exactly one block per reply is executed.
- Your code runs in an isolated container with no network access and no
  package installation. Only the Python standard library is available.
- Output is captured from stdout/stderr, sanitized, and returned to you as an
  observation on the next turn.
- When you have the answer, reply with FINAL(your answer) and nothing else
  needs to run.
"#;

const CONTEXT_PROMPT: &str = r#"
A context file is mounted read-only. Access it only through the provided
handle; never try to read the file whole:

    from agentctx import ContextHandle  # already imported as `ctx`
    ctx.size                   # total bytes
    ctx.search(pattern)        # [(offset, match), ...], capped at 10
    ctx.read_window(offset)    # text around a byte offset
    ctx.snippet(offset, 400)   # smaller window
    ctx.head(n), ctx.tail(n)   # file edges

Search first, then read small windows around the offsets you found.
"#;

/// Assemble the system prompt for one run.
pub fn build_system_prompt(context_available: bool, custom_instructions: Option<&str>) -> String {
    let mut prompt = String::from(BASE_PROMPT);
    if context_available {
        prompt.push_str(CONTEXT_PROMPT);
    }
    if let Some(custom) = custom_instructions {
        prompt.push_str("\nAdditional instructions:\n");
        prompt.push_str(custom);
        prompt.push('\n');
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_section_is_conditional() {
        let without = build_system_prompt(false, None);
        let with = build_system_prompt(true, None);
        assert!(!without.contains("agentctx"));
        assert!(with.contains("agentctx"));
        assert!(with.contains("FINAL("));
    }

    #[test]
    fn custom_instructions_are_appended() {
        let prompt = build_system_prompt(false, Some("answer in French"));
        assert!(prompt.contains("answer in French"));
    }
}
