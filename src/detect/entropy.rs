//! Shannon entropy and the redaction allowlist.

/// Shannon entropy in bits per symbol over byte frequencies.
///
/// `H = −Σ p_i log₂ p_i`, no smoothing. Empty input has zero entropy.
pub fn shannon_entropy(data: &[u8]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }

    let mut counts = [0usize; 256];
    for &b in data {
        counts[b as usize] += 1;
    }

    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

/// Tokens that look random but are legitimate artifacts of normal tooling.
///
/// Hex digests at common hash sizes (MD5/SHA-1/SHA-256) and canonical UUIDs
/// routinely appear in honest output and must not be redacted.
pub fn is_allowlisted_token(token: &str) -> bool {
    is_hex_digest(token) || is_uuid(token)
}

fn is_hex_digest(token: &str) -> bool {
    matches!(token.len(), 32 | 40 | 64) && token.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_uuid(token: &str) -> bool {
    let bytes = token.as_bytes();
    if bytes.len() != 36 {
        return false;
    }
    for (i, &b) in bytes.iter().enumerate() {
        match i {
            8 | 13 | 18 | 23 => {
                if b != b'-' {
                    return false;
                }
            }
            _ => {
                if !b.is_ascii_hexdigit() {
                    return false;
                }
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entropy_of_uniform_bytes() {
        // 256 distinct bytes: 8 bits per symbol.
        let data: Vec<u8> = (0..=255).collect();
        let h = shannon_entropy(&data);
        assert!((h - 8.0).abs() < 1e-9);
    }

    #[test]
    fn entropy_of_repeated_byte_is_zero() {
        assert_eq!(shannon_entropy(b"aaaaaaaa"), 0.0);
    }

    #[test]
    fn entropy_of_english_is_moderate() {
        let h = shannon_entropy(b"the quick brown fox jumps over the lazy dog");
        assert!(h > 3.0 && h < 4.5, "got {h}");
    }

    #[test]
    fn entropy_empty() {
        assert_eq!(shannon_entropy(b""), 0.0);
    }

    #[test]
    fn allowlist_hex_digests() {
        assert!(is_allowlisted_token("d41d8cd98f00b204e9800998ecf8427e")); // md5
        assert!(is_allowlisted_token(
            "da39a3ee5e6b4b0d3255bfef95601890afd80709"
        )); // sha1
        assert!(is_allowlisted_token(
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        )); // sha256
        assert!(!is_allowlisted_token("d41d8cd98f00b204e9800998ecf8427")); // 31 chars
        assert!(!is_allowlisted_token(
            "z41d8cd98f00b204e9800998ecf8427e"
        )); // non-hex
    }

    #[test]
    fn allowlist_uuid() {
        assert!(is_allowlisted_token(
            "550e8400-e29b-41d4-a716-446655440000"
        ));
        assert!(!is_allowlisted_token(
            "550e8400e29b41d4a716446655440000ab"
        ));
    }
}
