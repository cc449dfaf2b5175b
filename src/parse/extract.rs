//! Fenced code-block extraction from markdown.

use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, TagEnd};

use crate::parse::answer::extract_final_answer;

/// Info strings accepted as runnable code.
const RUNNABLE_LANGUAGES: &[&str] = &["", "python", "py", "python3"];

/// What a model response parsed into.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// First runnable fenced code block, if any.
    pub code: Option<String>,
    /// Final-answer payload, if the marker grammar matched anywhere.
    pub final_answer: Option<String>,
}

impl Extraction {
    /// Nothing to run and nothing final: the response is not actionable.
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.final_answer.is_none()
    }
}

/// Parse a model response into code and/or a final answer.
pub fn extract(text: &str) -> Extraction {
    Extraction {
        code: extract_code(text),
        final_answer: final_answer_outside_code(text),
    }
}

/// Response-level final-answer scan.
///
/// A marker inside a fenced code block does not count: code that *prints*
/// `FINAL(...)` has to execute before the payload exists. Markers anywhere
/// in the prose (including inline code) terminate the loop.
pub fn final_answer_outside_code(text: &str) -> Option<String> {
    extract_final_answer(&strip_fenced_code(text))
}

/// Rebuild the response text with fenced code block contents removed.
fn strip_fenced_code(text: &str) -> String {
    let parser = Parser::new_ext(text, Options::empty());
    let mut out = String::new();
    let mut in_code = false;
    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(_)) => in_code = true,
            Event::End(TagEnd::CodeBlock) => in_code = false,
            Event::Text(t) if !in_code => out.push_str(&t),
            Event::Code(t) => out.push_str(&t),
            Event::SoftBreak | Event::HardBreak => out.push('\n'),
            Event::End(TagEnd::Paragraph) | Event::End(TagEnd::Heading(_)) | Event::End(TagEnd::Item) => {
                out.push('\n')
            }
            _ => {}
        }
    }
    out
}

/// First fenced block whose info string marks it runnable.
///
/// Walks the markdown AST; fence info is normalized to its first word,
/// lowercased. Indented code blocks are ignored — the system prompt asks for
/// fences, and indented text is usually prose formatting.
pub fn extract_code(text: &str) -> Option<String> {
    let parser = Parser::new_ext(text, Options::empty());

    let mut inside: Option<String> = None;
    let mut content = String::new();
    for event in parser {
        match event {
            Event::Start(Tag::CodeBlock(CodeBlockKind::Fenced(info))) => {
                let lang = info
                    .split_whitespace()
                    .next()
                    .unwrap_or("")
                    .to_lowercase();
                inside = Some(lang);
                content.clear();
            }
            Event::Text(t) if inside.is_some() => {
                content.push_str(&t);
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some(lang) = inside.take() {
                    let code = content.trim();
                    if RUNNABLE_LANGUAGES.contains(&lang.as_str()) && !code.is_empty() {
                        return Some(code.to_string());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_fence() {
        let text = "Here you go:\n\n```python\nprint('hi')\n```\n";
        assert_eq!(extract_code(text).unwrap(), "print('hi')");
    }

    #[test]
    fn bare_fence_counts() {
        let text = "```\nx = 1\n```";
        assert_eq!(extract_code(text).unwrap(), "x = 1");
    }

    #[test]
    fn first_runnable_block_wins() {
        let text = "```json\n{\"a\": 1}\n```\n\n```py\nprint(2)\n```\n\n```python\nprint(3)\n```";
        assert_eq!(extract_code(text).unwrap(), "print(2)");
    }

    #[test]
    fn non_python_blocks_are_skipped() {
        let text = "```rust\nfn main() {}\n```";
        assert!(extract_code(text).is_none());
    }

    #[test]
    fn no_code_at_all() {
        assert!(extract_code("just prose, no fences").is_none());
    }

    #[test]
    fn multi_line_block_is_preserved() {
        let text = "```python\nfor i in range(3):\n    print(i)\n```";
        assert_eq!(
            extract_code(text).unwrap(),
            "for i in range(3):\n    print(i)"
        );
    }

    #[test]
    fn empty_block_is_not_actionable() {
        let text = "```python\n```\n\n```\nreal = True\n```";
        assert_eq!(extract_code(text).unwrap(), "real = True");
    }

    #[test]
    fn extraction_emptiness() {
        assert!(extract("nothing actionable here").is_empty());
        assert!(!extract("FINAL(42)").is_empty());
        assert!(!extract("```python\nx=1\n```").is_empty());
    }

    #[test]
    fn final_marker_inside_code_does_not_count() {
        let text = "Let me compute it:\n\n```python\nprint(f\"FINAL({2+2})\")\n```\n";
        assert!(final_answer_outside_code(text).is_none());
        // The code block itself is still extracted.
        assert!(extract_code(text).is_some());
    }

    #[test]
    fn final_marker_in_prose_counts() {
        let text = "All done.\n\nFINAL(42)\n\n```python\nprint('leftover')\n```";
        assert_eq!(final_answer_outside_code(text).unwrap(), "42");
    }

    #[test]
    fn info_string_with_attributes() {
        let text = "```python title=example\nprint('x')\n```";
        assert_eq!(extract_code(text).unwrap(), "print('x')");
    }
}
