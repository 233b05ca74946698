//! Error variants for the delta encoder/decoder so callers can surface friendly failures
//! instead of panicking on malformed streams.

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DeltaError {
    #[error("delta encode failed: {0}")]
    Encode(String),

    #[error("delta decode failed: {0}")]
    Decode(String),
}
