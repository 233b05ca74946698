//! Delta codec (C3): produce and apply a compact edit script between two byte sequences, plus
//! the write-path policy that decides whether a delta is worth keeping (spec §4.3).

pub mod decode;
pub mod encode;
pub mod errors;
pub mod policy;
mod utils;

pub use decode::delta_decode as apply;
pub use errors::DeltaError;
pub use policy::{DeltaPlan, StoreReason, plan_store};

/// Deterministically encode `new` as a delta against `old`.
///
/// `apply(old, encode(old, new)) == new` for every input; the same
/// `(old, new)` pair always produces the same bytes, so delta blob hashes
/// are stable across runs.
pub fn encode(old: &[u8], new: &[u8]) -> Vec<u8> {
    encode::DeltaDiff::new(old, new).encode()
}

/// Reconstruct `new` from `old` and a delta produced by [`encode`].
pub fn apply_delta(old: &[u8], delta: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let mut cursor = std::io::Cursor::new(delta);
    decode::delta_decode(&mut cursor, old)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_deterministic() {
        let old = b"the quick brown fox jumps over the lazy dog";
        let new = b"the quick brown cat jumps over the lazy dog and then sleeps";
        let a = encode(old, new);
        let b = encode(old, new);
        assert_eq!(a, b);
        assert_eq!(apply_delta(old, &a).unwrap(), new);
    }
}
