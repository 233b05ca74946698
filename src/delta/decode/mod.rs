//! Decoder for delta instructions that rebuilds the target buffer from a base buffer and the
//! instruction stream produced by [`crate::delta::encode`] (base size + result size + op codes).
//!
//! Every failure mode returns `Err(DeltaError::Decode)` rather than panicking: corrupted delta
//! data and missing bases are expected inputs at the object-store layer (spec §4.4), which maps
//! them to "absent" rather than crashing the caller.

use std::io::{ErrorKind, Read};

use super::{errors::DeltaError, utils};

const COPY_INSTRUCTION_FLAG: u8 = 1 << 7; // msb set => copy from base, otherwise inline data
const COPY_OFFSET_BYTES: u8 = 4;
const COPY_SIZE_BYTES: u8 = 3;
const COPY_ZERO_SIZE: usize = 0x10000;

/// Apply a delta stream to `base`, returning the reconstructed target bytes.
pub fn delta_decode(mut stream: &mut impl Read, base: &[u8]) -> Result<Vec<u8>, DeltaError> {
    let base_size =
        utils::read_size_encoding(&mut stream).map_err(|e| DeltaError::Decode(e.to_string()))?;
    if base.len() != base_size {
        return Err(DeltaError::Decode(format!(
            "base length mismatch: stream declares {base_size}, got {}",
            base.len()
        )));
    }

    let result_size =
        utils::read_size_encoding(&mut stream).map_err(|e| DeltaError::Decode(e.to_string()))?;
    let mut buffer = Vec::with_capacity(result_size);

    loop {
        let instruction = match utils::read_bytes(stream) {
            Ok([instruction]) => instruction,
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => break,
            Err(err) => return Err(DeltaError::Decode(format!("bad instruction: {err}"))),
        };

        if instruction & COPY_INSTRUCTION_FLAG == 0 {
            if instruction == 0 {
                return Err(DeltaError::Decode("zero-length data instruction".into()));
            }
            let mut data = vec![0; instruction as usize];
            stream
                .read_exact(&mut data)
                .map_err(|e| DeltaError::Decode(e.to_string()))?;
            buffer.extend_from_slice(&data);
        } else {
            let mut nonzero_bytes = instruction;
            let offset = utils::read_partial_int(&mut stream, COPY_OFFSET_BYTES, &mut nonzero_bytes)
                .map_err(|e| DeltaError::Decode(e.to_string()))?;
            let mut size = utils::read_partial_int(&mut stream, COPY_SIZE_BYTES, &mut nonzero_bytes)
                .map_err(|e| DeltaError::Decode(e.to_string()))?;
            if size == 0 {
                size = COPY_ZERO_SIZE;
            }
            let slice = base
                .get(offset..offset + size)
                .ok_or_else(|| DeltaError::Decode("copy instruction out of range".to_string()))?;
            buffer.extend_from_slice(slice);
        }
    }

    if buffer.len() != result_size {
        return Err(DeltaError::Decode(format!(
            "reconstructed length mismatch: expected {result_size}, got {}",
            buffer.len()
        )));
    }
    Ok(buffer)
}
