//! Parsing of model responses.
//!
//! Code comes out of fenced markdown blocks via a real block-level parser —
//! there is deliberately no regex fallback for code extraction. The
//! final-answer marker grammar is scanned over the whole response text.

mod answer;
mod extract;

pub use answer::extract_final_answer;
pub use extract::{Extraction, extract, extract_code, final_answer_outside_code};
