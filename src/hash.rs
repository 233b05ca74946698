//! Hashing and byte utilities (C1): SHA-256 digests, the binary/text
//! heuristic, and UTF-8 conversion helpers shared by the object schema, the
//! diff kernel and the delta codec.

use std::{fmt::Display, str::FromStr};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::RepoConfig;

/// A 32-byte SHA-256 object digest. `Display`/`FromStr` round-trip through
/// lower-case hex, which is also the storage key used by the object store.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectHash([u8; 32]);

impl ObjectHash {
    pub const LEN: usize = 32;
    pub const HEX_LEN: usize = 64;

    /// Compute the SHA-256 digest of `data`.
    pub fn of(data: &[u8]) -> Self {
        let digest = Sha256::digest(data);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        ObjectHash(bytes)
    }

    /// Build an `ObjectHash` from exactly 32 raw bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, String> {
        if bytes.len() != Self::LEN {
            return Err(format!(
                "invalid hash length: got {}, expected {}",
                bytes.len(),
                Self::LEN
            ));
        }
        let mut out = [0u8; 32];
        out.copy_from_slice(bytes);
        Ok(ObjectHash(out))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Display for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for ObjectHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ObjectHash({})", self.to_hex())
    }
}

impl AsRef<[u8]> for ObjectHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl FromStr for ObjectHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() != Self::HEX_LEN {
            return Err(format!(
                "invalid hash hex length: got {}, expected {}",
                s.len(),
                Self::HEX_LEN
            ));
        }
        let bytes = hex::decode(s).map_err(|e| e.to_string())?;
        Self::from_bytes(&bytes)
    }
}

/// Constant-time byte equality, used when comparing digests derived from
/// untrusted input so timing cannot leak a partial match.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// Extensions whose content is treated as text even when the sampled window
/// looks binary-ish (advisory override, per spec §9 open question — the
/// null-byte rule below always wins).
const TEXT_EXTENSION_ALLOWLIST: &[&str] = &[
    "txt", "md", "rs", "toml", "json", "yaml", "yml", "xml", "html", "css", "js", "ts", "py",
    "rb", "go", "java", "c", "h", "cpp", "hpp", "sh", "cfg", "ini", "csv",
];

/// Heuristically classify `data` as binary or text.
///
/// Scans up to the first `binary_detection_window` bytes (default 8 KiB).
/// A NUL byte anywhere in that window is authoritative: the file is binary
/// regardless of extension. Otherwise, the file is binary if more than
/// `binary_nonprintable_ratio` of the sampled bytes are non-printable and
/// outside `{\t, \n, \r}`, unless `name`'s extension is in the text
/// allow-list.
pub fn is_binary(data: &[u8], name: Option<&str>, config: &RepoConfig) -> bool {
    let window = &data[..data.len().min(config.binary_detection_window)];
    if memchr::memchr(0, window).is_some() {
        return true;
    }
    if window.is_empty() {
        return false;
    }

    let nonprintable = window
        .iter()
        .filter(|&&b| !(b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7f).contains(&b)))
        .count();
    let ratio = nonprintable as f64 / window.len() as f64;
    if ratio <= config.binary_nonprintable_ratio {
        return false;
    }

    if let Some(name) = name {
        if let Some(ext) = name.rsplit('.').next() {
            if TEXT_EXTENSION_ALLOWLIST.contains(&ext.to_ascii_lowercase().as_str()) {
                return false;
            }
        }
    }
    true
}

/// Best-effort UTF-8 decode; invalid sequences are replaced, which is what
/// callers want when rendering a diff for a file that is "mostly text".
pub fn utf8_decode_lossy(data: &[u8]) -> String {
    encoding_rs::UTF_8.decode(data).0.into_owned()
}

/// Strict UTF-8 decode, returning `None` if `data` is not valid UTF-8.
pub fn utf8_decode_strict(data: &[u8]) -> Option<String> {
    std::str::from_utf8(data).ok().map(str::to_owned)
}

pub fn utf8_encode(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}
