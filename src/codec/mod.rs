//! LZ4 compression stage of the per-entry pipeline.
//!
//! Payloads are raw LZ4 blocks with no embedded size header — the record
//! stores `rawsize` and `compressedsize` separately, so decompression is
//! driven entirely by the record.
//!
//! Compression is best-effort: when LZ4 cannot make the payload strictly
//! smaller (already-compressed or high-entropy input), the caller is told to
//! store the plaintext verbatim and clear the compressed flag.  That makes
//! the flag on disk a statement about the bytes, never about the request.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("decompressed size mismatch: expected {expected} bytes, got {got}")]
    Decompress { expected: usize, got: usize },
    #[error("LZ4 decompression failed: {0}")]
    Corrupt(String),
}

/// Outcome of the compression stage.
pub enum Compressed {
    /// LZ4 made the payload strictly smaller.
    Shrunk(Vec<u8>),
    /// Compression was unprofitable; store the plaintext and clear the flag.
    Unprofitable,
}

/// Compress `data` as a raw LZ4 block.  Returns [`Compressed::Unprofitable`]
/// when the output is empty or not strictly smaller than the input.
pub fn compress(data: &[u8]) -> Compressed {
    let out = lz4_flex::block::compress(data);
    if out.is_empty() || out.len() >= data.len() {
        Compressed::Unprofitable
    } else {
        Compressed::Shrunk(out)
    }
}

/// Decompress a raw LZ4 block into exactly `rawsize` bytes.
pub fn decompress(data: &[u8], rawsize: usize) -> Result<Vec<u8>, CodecError> {
    let out = lz4_flex::block::decompress(data, rawsize)
        .map_err(|e| CodecError::Corrupt(e.to_string()))?;
    if out.len() != rawsize {
        return Err(CodecError::Decompress { expected: rawsize, got: out.len() });
    }
    Ok(out)
}
