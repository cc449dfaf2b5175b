//! Memory-mapped, read-only view over a host context file.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use memmap2::Mmap;

use crate::detect::ShingleSet;
use crate::error::{Error, Result};

/// Bytes inspected at open time for the binary check.
const BINARY_SAMPLE_BYTES: usize = 8 * 1024;
/// Control-byte ratio above which a file is considered binary.
const BINARY_CONTROL_RATIO: f64 = 0.30;
/// Total bytes sampled for the echo fingerprint.
const FINGERPRINT_SAMPLE_BYTES: usize = 64 * 1024;
/// Regions the fingerprint sample is split into.
const FINGERPRINT_REGIONS: usize = 8;

/// Default hard cap on search results.
pub const MAX_SEARCH_RESULTS: usize = 10;

/// Read-only handle over a context file.
///
/// The mapped region lives exactly as long as the handle; every accessor
/// clamps its bounds and returns owned data, so no alias into the map can
/// outlive it and nothing can write through it.
pub struct ContextHandle {
    path: PathBuf,
    map: Mmap,
    /// File size; the map itself may be a 1-byte placeholder for an empty
    /// file, which cannot be mapped on most platforms.
    len: usize,
    fingerprint: OnceLock<ShingleSet>,
}

impl ContextHandle {
    /// Open and validate a context file.
    ///
    /// Rejects missing paths and directories with `ContextNotFound`, and
    /// binary content (NUL bytes, or too many control bytes in the first
    /// 8 KiB) with `ContextBinary`. The binary gate exists so the model is
    /// never asked to reason over mojibake from a PDF or an executable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let meta = std::fs::metadata(&path).map_err(|_| Error::ContextNotFound {
            path: path.clone(),
        })?;
        if !meta.is_file() {
            return Err(Error::ContextNotFound { path });
        }

        let file = File::open(&path).map_err(|_| Error::ContextNotFound {
            path: path.clone(),
        })?;
        let len = meta.len() as usize;
        let map = if len == 0 {
            // Zero-length regions cannot be mapped; back the handle with an
            // inert placeholder page instead.
            memmap2::MmapMut::map_anon(1)
                .and_then(|m| m.make_read_only())
                .map_err(|_| Error::ContextNotFound { path: path.clone() })?
        } else {
            // Safety: the map is private to this handle and opened
            // read-only; truncation by another process is outside the trust
            // model here, as the file is operator-supplied input.
            unsafe {
                Mmap::map(&file).map_err(|_| Error::ContextNotFound { path: path.clone() })?
            }
        };

        let handle = Self {
            path,
            map,
            len,
            fingerprint: OnceLock::new(),
        };
        handle.reject_binary()?;
        Ok(handle)
    }

    fn reject_binary(&self) -> Result<()> {
        let sample = &self.data()[..self.len.min(BINARY_SAMPLE_BYTES)];
        if sample.is_empty() {
            return Ok(());
        }

        if sample.contains(&0) {
            return Err(Error::ContextBinary {
                path: self.path.clone(),
                detail: "null byte in leading sample".to_string(),
            });
        }

        let control = sample
            .iter()
            .filter(|&&b| b < 0x20 && b != b'\t' && b != b'\n' && b != b'\r')
            .count();
        let ratio = control as f64 / sample.len() as f64;
        if ratio > BINARY_CONTROL_RATIO {
            return Err(Error::ContextBinary {
                path: self.path.clone(),
                detail: format!("{:.0}% control bytes in leading sample", ratio * 100.0),
            });
        }

        Ok(())
    }

    /// Host path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The mapped file contents.
    fn data(&self) -> &[u8] {
        &self.map[..self.len.min(self.map.len())]
    }

    /// Total file size in bytes.
    pub fn size(&self) -> usize {
        self.len
    }

    /// Read a byte range, clamped to the file, decoded lossily.
    pub fn read(&self, start: usize, length: usize) -> String {
        if start >= self.len {
            return String::new();
        }
        let end = start.saturating_add(length).min(self.len);
        String::from_utf8_lossy(&self.data()[start..end]).into_owned()
    }

    /// Read a window of `radius` bytes on each side of `offset`.
    pub fn read_window(&self, offset: usize, radius: usize) -> String {
        let start = offset.saturating_sub(radius);
        self.read(start, radius * 2)
    }

    /// Snippet around an offset; `window` is the total size, not the radius.
    pub fn snippet(&self, offset: usize, window: usize) -> String {
        self.read_window(offset, window / 2)
    }

    /// First `n` bytes.
    pub fn head(&self, n: usize) -> String {
        self.read(0, n)
    }

    /// Last `n` bytes.
    pub fn tail(&self, n: usize) -> String {
        let start = self.len.saturating_sub(n);
        self.read(start, n)
    }

    /// Byte-level regex search over the map.
    ///
    /// Returns `(byte_offset, matched_text)` pairs, at most `max_results`
    /// (capped at [`MAX_SEARCH_RESULTS`]). Matches that are not valid UTF-8
    /// are skipped.
    pub fn search(&self, pattern: &str, max_results: usize) -> Result<Vec<(usize, String)>> {
        let limit = max_results.min(MAX_SEARCH_RESULTS).max(1);
        let regex = regex::bytes::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Configuration {
                reason: format!("invalid search pattern: {e}"),
            })?;

        let mut out = Vec::new();
        for m in regex.find_iter(self.data()) {
            match std::str::from_utf8(m.as_bytes()) {
                Ok(text) => out.push((m.start(), text.to_string())),
                Err(_) => continue,
            }
            if out.len() >= limit {
                break;
            }
        }
        Ok(out)
    }

    /// Line-oriented search: `(line_number, line, surrounding_context)`.
    ///
    /// `context_lines` lines before each hit are included in the context
    /// field together with the hit itself.
    pub fn search_lines(
        &self,
        pattern: &str,
        max_results: usize,
        context_lines: usize,
    ) -> Result<Vec<(usize, String, String)>> {
        let limit = max_results.min(MAX_SEARCH_RESULTS).max(1);
        let regex = regex::RegexBuilder::new(pattern)
            .case_insensitive(true)
            .build()
            .map_err(|e| Error::Configuration {
                reason: format!("invalid search pattern: {e}"),
            })?;

        let mut out = Vec::new();
        let mut recent: Vec<String> = Vec::new();
        for (line_no, line) in self.iterate_lines(1) {
            recent.push(line.clone());
            if recent.len() > context_lines + 1 {
                recent.remove(0);
            }
            if regex.is_match(&line) {
                out.push((line_no, line.trim_end().to_string(), recent.join("\n")));
                if out.len() >= limit {
                    break;
                }
            }
        }
        Ok(out)
    }

    /// Iterate `(line_number, line)` starting at `start_line` (1-indexed).
    ///
    /// Lines are decoded lossily and do not include the trailing newline.
    /// The iterator is finite; re-call to restart.
    pub fn iterate_lines(&self, start_line: usize) -> impl Iterator<Item = (usize, String)> + '_ {
        let len = self.len;
        let mut offset = 0usize;
        self.data()
            .split(|&b| b == b'\n')
            .enumerate()
            .filter_map(move |(i, raw)| {
                let segment_start = offset;
                offset += raw.len() + 1;
                // A trailing newline produces one empty segment past the
                // end of the data; that is not a line.
                if segment_start >= len {
                    return None;
                }
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                Some((i + 1, String::from_utf8_lossy(raw).into_owned()))
            })
            .filter(move |(n, _)| *n >= start_line.max(1))
    }

    /// Echo-detection fingerprint, computed on first use.
    ///
    /// Samples up to eight 8 KiB regions at a uniform stride across the file
    /// and shingles each region independently, so echoes of any part of the
    /// file are detectable without reading it whole.
    pub fn fingerprint(&self) -> &ShingleSet {
        self.fingerprint.get_or_init(|| {
            let mut set = ShingleSet::default();
            let len = self.len;
            if len == 0 {
                return set;
            }

            if len <= FINGERPRINT_SAMPLE_BYTES {
                set.absorb(&String::from_utf8_lossy(self.data()));
                return set;
            }

            let region = FINGERPRINT_SAMPLE_BYTES / FINGERPRINT_REGIONS;
            let stride = len / FINGERPRINT_REGIONS;
            for i in 0..FINGERPRINT_REGIONS {
                let start = i * stride;
                let end = (start + region).min(len);
                set.absorb(&String::from_utf8_lossy(&self.data()[start..end]));
            }
            set
        })
    }
}

impl std::fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextHandle")
            .field("path", &self.path)
            .field("size", &self.len)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(content: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn open_missing_file() {
        let err = ContextHandle::open("/nonexistent/ctx.txt").unwrap_err();
        assert_eq!(err.code(), "context_not_found");
    }

    #[test]
    fn rejects_null_bytes() {
        let f = write_temp(b"looks like text\x00but is not");
        let err = ContextHandle::open(f.path()).unwrap_err();
        assert_eq!(err.code(), "context_binary");
    }

    #[test]
    fn rejects_control_heavy_content() {
        let mut data = Vec::new();
        for _ in 0..1000 {
            data.extend_from_slice(&[0x01, 0x02, b'a']);
        }
        let f = write_temp(&data);
        let err = ContextHandle::open(f.path()).unwrap_err();
        assert_eq!(err.code(), "context_binary");
    }

    #[test]
    fn accepts_plain_text_with_newlines() {
        let f = write_temp(b"line one\nline two\r\nline three\ttabbed\n");
        let ctx = ContextHandle::open(f.path()).unwrap();
        assert_eq!(ctx.size(), 37);
    }

    #[test]
    fn read_is_clamped() {
        let f = write_temp(b"0123456789");
        let ctx = ContextHandle::open(f.path()).unwrap();
        assert_eq!(ctx.read(0, 4), "0123");
        assert_eq!(ctx.read(8, 100), "89");
        assert_eq!(ctx.read(100, 4), "");
        assert_eq!(ctx.head(3), "012");
        assert_eq!(ctx.tail(3), "789");
    }

    #[test]
    fn window_and_snippet() {
        let f = write_temp(b"abcdefghijklmnopqrstuvwxyz");
        let ctx = ContextHandle::open(f.path()).unwrap();
        assert_eq!(ctx.read_window(10, 3), "hijklm");
        assert_eq!(ctx.snippet(10, 6), "hijklm");
        // Near the start the window clamps instead of failing.
        assert_eq!(ctx.read_window(1, 5), "abcdefghij");
    }

    #[test]
    fn search_returns_offsets() {
        let f = write_temp(b"alpha beta gamma beta delta");
        let ctx = ContextHandle::open(f.path()).unwrap();
        let hits = ctx.search("beta", 10).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0], (6, "beta".to_string()));
        assert_eq!(hits[1].0, 17);
    }

    #[test]
    fn search_respects_cap() {
        let f = write_temp("x ".repeat(100).as_bytes());
        let ctx = ContextHandle::open(f.path()).unwrap();
        let hits = ctx.search("x", 50).unwrap();
        assert_eq!(hits.len(), MAX_SEARCH_RESULTS);
    }

    #[test]
    fn search_invalid_pattern() {
        let f = write_temp(b"text");
        let ctx = ContextHandle::open(f.path()).unwrap();
        assert!(ctx.search("(unclosed", 10).is_err());
    }

    #[test]
    fn search_lines_with_context() {
        let f = write_temp(b"first\nsecond\nneedle here\nlast\n");
        let ctx = ContextHandle::open(f.path()).unwrap();
        let hits = ctx.search_lines("needle", 10, 1).unwrap();
        assert_eq!(hits.len(), 1);
        let (line_no, line, context) = &hits[0];
        assert_eq!(*line_no, 3);
        assert_eq!(line, "needle here");
        assert!(context.contains("second"));
    }

    #[test]
    fn iterate_lines_from_offset() {
        let f = write_temp(b"a\nb\nc\n");
        let ctx = ContextHandle::open(f.path()).unwrap();
        let lines: Vec<_> = ctx.iterate_lines(2).take(2).collect();
        assert_eq!(lines[0], (2, "b".to_string()));
        assert_eq!(lines[1], (3, "c".to_string()));
    }

    #[test]
    fn fingerprint_covers_small_files() {
        let f = write_temp(b"the root password is hunter2 for the prod cluster\n");
        let ctx = ContextHandle::open(f.path()).unwrap();
        assert!(!ctx.fingerprint().is_empty());
    }

    #[test]
    fn empty_file_is_fine() {
        let f = write_temp(b"");
        let ctx = ContextHandle::open(f.path()).unwrap();
        assert_eq!(ctx.size(), 0);
        assert!(ctx.fingerprint().is_empty());
        assert_eq!(ctx.read(0, 10), "");
    }
}
