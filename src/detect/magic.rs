//! Binary payload detection by magic bytes.

use aho_corasick::{AhoCorasick, Input, MatchKind, StartKind};

/// Known magic-byte prefixes and what they identify.
const MAGIC: &[(&[u8], &str)] = &[
    (&[0x89, 0x50, 0x4E, 0x47], "png"),
    (&[0x50, 0x4B, 0x03, 0x04], "zip"),
    (&[0x25, 0x50, 0x44, 0x46], "pdf"),
    (&[0x7F, 0x45, 0x4C, 0x46], "elf"),
    (&[0x47, 0x49, 0x46, 0x38], "gif"),
    (&[0x4D, 0x5A], "mz"),
];

/// Anchored matcher over the magic-byte set.
///
/// Only a match at offset zero counts: a PNG header in the middle of a text
/// buffer is data about a PNG, not a PNG.
pub struct BinaryGate {
    matcher: AhoCorasick,
}

impl BinaryGate {
    pub fn new() -> Self {
        let matcher = AhoCorasick::builder()
            .start_kind(StartKind::Anchored)
            .match_kind(MatchKind::LeftmostLongest)
            .build(MAGIC.iter().map(|(bytes, _)| *bytes))
            .expect("magic byte set must compile");
        Self { matcher }
    }

    /// Returns the format name when the buffer starts with a known magic.
    pub fn detect(&self, data: &[u8]) -> Option<&'static str> {
        let input = Input::new(data).anchored(aho_corasick::Anchored::Yes);
        self.matcher
            .find(input)
            .map(|m| MAGIC[m.pattern().as_usize()].1)
    }
}

impl Default for BinaryGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_png() {
        let gate = BinaryGate::new();
        assert_eq!(gate.detect(b"\x89PNG\r\n\x1a\n....."), Some("png"));
    }

    #[test]
    fn detects_zip_pdf_elf_gif_mz() {
        let gate = BinaryGate::new();
        assert_eq!(gate.detect(b"PK\x03\x04rest"), Some("zip"));
        assert_eq!(gate.detect(b"%PDF-1.7"), Some("pdf"));
        assert_eq!(gate.detect(b"\x7fELF\x02\x01"), Some("elf"));
        assert_eq!(gate.detect(b"GIF89a"), Some("gif"));
        assert_eq!(gate.detect(b"MZ\x90\x00"), Some("mz"));
    }

    #[test]
    fn mid_buffer_magic_is_ignored() {
        let gate = BinaryGate::new();
        assert_eq!(gate.detect(b"the file starts with \x89PNG"), None);
    }

    #[test]
    fn plain_text_passes() {
        let gate = BinaryGate::new();
        assert_eq!(gate.detect(b"hello world"), None);
        assert_eq!(gate.detect(b""), None);
    }
}
