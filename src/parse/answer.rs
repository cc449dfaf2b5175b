//! Final-answer marker recognition.
//!
//! Grammar: `FINAL(x)` with outermost balanced parentheses, `FINAL: x`, or
//! `Final Answer: x` (the last two case-insensitive). Marker forms are tried
//! in that order; the first that matches anywhere wins and its payload is
//! returned trimmed.

use std::sync::OnceLock;

use regex::Regex;

fn final_colon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*FINAL\s*:\s*(.*)$").expect("final-colon regex"))
}

fn final_answer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^\s*Final\s+Answer\s*:\s*(.*)$").expect("final-answer regex"))
}

/// Scan text for a final-answer marker.
pub fn extract_final_answer(text: &str) -> Option<String> {
    if let Some(payload) = find_balanced_final(text) {
        return Some(payload);
    }

    if let Some(caps) = final_colon_re().captures(text) {
        let payload = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if !payload.is_empty() {
            return Some(payload.to_string());
        }
    }

    if let Some(caps) = final_answer_re().captures(text) {
        let payload = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        if !payload.is_empty() {
            return Some(payload.to_string());
        }
    }

    None
}

/// Find `FINAL(...)` with balanced parentheses, so payloads containing
/// parentheses of their own survive intact.
fn find_balanced_final(text: &str) -> Option<String> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find("FINAL(") {
        let open = search_from + rel + "FINAL".len();
        let mut depth = 0usize;
        for (i, c) in text[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        let payload = &text[open + 1..open + i];
                        return Some(payload.trim().to_string());
                    }
                }
                _ => {}
            }
        }
        // Unbalanced occurrence; try the next one.
        search_from = open + 1;
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paren_form() {
        assert_eq!(extract_final_answer("FINAL(42)").unwrap(), "42");
        assert_eq!(
            extract_final_answer("some text FINAL( the answer )\nmore").unwrap(),
            "the answer"
        );
    }

    #[test]
    fn nested_parens_are_balanced() {
        assert_eq!(
            extract_final_answer("FINAL(f(x) = (x + 1))").unwrap(),
            "f(x) = (x + 1)"
        );
    }

    #[test]
    fn unbalanced_paren_falls_through() {
        assert!(extract_final_answer("FINAL(oops").is_none());
    }

    #[test]
    fn colon_form() {
        assert_eq!(extract_final_answer("FINAL: 4\n").unwrap(), "4");
        assert_eq!(extract_final_answer("  final: yes").unwrap(), "yes");
    }

    #[test]
    fn final_answer_form_case_insensitive() {
        assert_eq!(
            extract_final_answer("Final Answer: Paris").unwrap(),
            "Paris"
        );
        assert_eq!(
            extract_final_answer("FINAL ANSWER:   Berlin  ").unwrap(),
            "Berlin"
        );
    }

    #[test]
    fn paren_form_takes_priority() {
        let text = "Final Answer: not this\nFINAL(this)";
        assert_eq!(extract_final_answer(text).unwrap(), "this");
    }

    #[test]
    fn no_marker() {
        assert!(extract_final_answer("still thinking about it").is_none());
        assert!(extract_final_answer("the final answer matters").is_none());
    }

    #[test]
    fn multiline_payload_survives() {
        assert_eq!(
            extract_final_answer("FINAL(line one\nline two)").unwrap(),
            "line one\nline two"
        );
    }
}
