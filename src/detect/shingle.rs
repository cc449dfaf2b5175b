//! Word-shingle fingerprints for context-echo detection.
//!
//! A fingerprint is a set of hashed 5-word windows over (a sample of) the
//! context file. Output lines whose own shingles are mostly contained in the
//! fingerprint are echoes of the context.

use std::collections::HashSet;
use std::hash::{Hash, Hasher};

/// Words per shingle. Five is wide enough that common phrases don't collide
/// and narrow enough that a single echoed sentence still produces hits.
pub const SHINGLE_SIZE: usize = 5;

/// A set of hashed word shingles.
#[derive(Debug, Clone, Default)]
pub struct ShingleSet {
    hashes: HashSet<u64>,
}

impl ShingleSet {
    /// Shingle a chunk of text into the set.
    ///
    /// Words are lowercased and split on whitespace; shingles never span the
    /// chunk boundary, so callers may feed disjoint samples safely.
    pub fn absorb(&mut self, text: &str) {
        let words: Vec<String> = text
            .split_whitespace()
            .map(|w| w.to_lowercase())
            .collect();
        if words.len() < SHINGLE_SIZE {
            return;
        }
        for window in words.windows(SHINGLE_SIZE) {
            self.hashes.insert(hash_shingle(window));
        }
    }

    pub fn contains(&self, hash: u64) -> bool {
        self.hashes.contains(&hash)
    }

    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }
}

/// Hashes of all shingles in one piece of text.
pub fn shingle_words(text: &str) -> Vec<u64> {
    let words: Vec<String> = text
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect();
    if words.len() < SHINGLE_SIZE {
        return Vec::new();
    }
    words.windows(SHINGLE_SIZE).map(hash_shingle).collect()
}

/// Jaccard containment: the fraction of `probe` shingles present in `set`.
///
/// Returns 0.0 when the probe produced no shingles (too short to judge).
pub fn containment(probe: &[u64], set: &ShingleSet) -> f64 {
    if probe.is_empty() || set.is_empty() {
        return 0.0;
    }
    let hits = probe.iter().filter(|h| set.contains(**h)).count();
    hits as f64 / probe.len() as f64
}

fn hash_shingle(words: &[String]) -> u64 {
    // DefaultHasher with default keys is deterministic for the process
    // lifetime, which is all the fingerprint needs.
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    for w in words {
        w.hash(&mut hasher);
        0xffu8.hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_echo_is_fully_contained() {
        let mut set = ShingleSet::default();
        set.absorb("the root password is hunter2 for the prod cluster");

        let probe = shingle_words("the root password is hunter2 for the prod cluster");
        assert!(!probe.is_empty());
        assert_eq!(containment(&probe, &set), 1.0);
    }

    #[test]
    fn unrelated_text_has_no_overlap() {
        let mut set = ShingleSet::default();
        set.absorb("the root password is hunter2 for the prod cluster");

        let probe = shingle_words("a completely different sentence about rust programming here");
        assert_eq!(containment(&probe, &set), 0.0);
    }

    #[test]
    fn short_probe_yields_nothing() {
        let set = ShingleSet::default();
        assert!(shingle_words("too few words").is_empty());
        assert_eq!(containment(&[], &set), 0.0);
    }

    #[test]
    fn case_insensitive() {
        let mut set = ShingleSet::default();
        set.absorb("The Root Password Is hunter2 For The Prod Cluster");
        let probe = shingle_words("the root password is hunter2");
        assert_eq!(containment(&probe, &set), 1.0);
    }

    #[test]
    fn chunks_do_not_bridge() {
        let mut set = ShingleSet::default();
        set.absorb("alpha beta gamma");
        set.absorb("delta epsilon zeta");
        // Neither chunk reaches five words, so nothing is absorbed.
        assert!(set.is_empty());
    }
}
