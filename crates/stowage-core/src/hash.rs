//! SHA-1 content hashing.
//!
//! Maven repositories publish SHA-1 sidecars, so SHA-1 is the hash used for
//! every integrity check in stowage: upstream verification, transfer
//! verification and cache sidecars. Digests are rendered as lowercase hex.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha1::{Digest, Sha1};

/// Read buffer used when hashing files.
const BUFFER_SIZE: usize = 8 * 1024;

/// Length of a hex-encoded SHA-1 digest.
pub const SHA1_HEX_LEN: usize = 40;

/// Hash a byte slice.
#[must_use]
pub fn sha1_hex(data: &[u8]) -> String {
    hex::encode(Sha1::digest(data))
}

/// Hash a file's contents without loading it into memory.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be opened or read.
pub fn sha1_file(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = ContentHasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finish())
}

/// Whether `value` looks like a hex-encoded SHA-1 digest (either case).
#[must_use]
pub fn is_sha1_hex(value: &str) -> bool {
    value.len() == SHA1_HEX_LEN && value.bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extract the authoritative digest from the text of a `.sha1` file.
///
/// Repositories sometimes append the file name or other metadata after the
/// digest; only the first whitespace-separated token counts. The result is
/// lowercased. Returns `None` for blank input.
#[must_use]
pub fn parse_sha1_sidecar(text: &str) -> Option<String> {
    text.split_whitespace()
        .next()
        .map(str::to_ascii_lowercase)
}

/// Incremental SHA-1 hasher for streamed content.
#[derive(Clone, Default)]
pub struct ContentHasher {
    inner: Sha1,
}

impl ContentHasher {
    /// Create an empty hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of content.
    pub fn update(&mut self, chunk: &[u8]) {
        self.inner.update(chunk);
    }

    /// Consume the hasher and return the lowercase hex digest.
    #[must_use]
    pub fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}

impl std::fmt::Debug for ContentHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentHasher").finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::arithmetic_side_effects)]
mod tests {
    use super::*;

    #[test]
    fn known_digest() {
        assert_eq!(
            sha1_hex(b"hello world"),
            "2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"
        );
    }

    #[test]
    fn empty_digest() {
        assert_eq!(sha1_hex(b""), "da39a3ee5e6b4b0d3255bfef95601890afd80709");
    }

    #[test]
    fn file_digest_matches_bytes() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("data.bin");
        // Larger than one read buffer so the loop runs more than once.
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        assert_eq!(sha1_file(&path).unwrap(), sha1_hex(&data));
    }

    #[test]
    fn missing_file_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(sha1_file(&tmp.path().join("nope")).is_err());
    }

    #[test]
    fn incremental_matches_one_shot() {
        let mut hasher = ContentHasher::new();
        hasher.update(b"hello ");
        hasher.update(b"world");
        assert_eq!(hasher.finish(), sha1_hex(b"hello world"));
    }

    #[test]
    fn sidecar_first_token_wins() {
        assert_eq!(
            parse_sha1_sidecar("  2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED  foo-1.0.jar\n"),
            Some("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed".to_string())
        );
        assert_eq!(parse_sha1_sidecar("   \n"), None);
    }

    #[test]
    fn hex_shape() {
        assert!(is_sha1_hex("2aae6c35c94fcfb415dbe95f408b9ce91ee846ed"));
        assert!(is_sha1_hex("2AAE6C35C94FCFB415DBE95F408B9CE91EE846ED"));
        assert!(!is_sha1_hex("2aae6c35"));
        assert!(!is_sha1_hex("zaae6c35c94fcfb415dbe95f408b9ce91ee846ed"));
    }
}
