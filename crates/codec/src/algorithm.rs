//! Compression algorithm registry
//!
//! Every stream is bound to one algorithm, identified on the wire by a
//! `u16` tag in both header and trailer. Decoding is the left inverse of
//! encoding for any chunk up to `MAX_CHUNK_SIZE`.

use crate::error::CodecError;
use crate::Result;
use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;
use std::io::{Read, Write};

/// Compression level handed to zstd, matches what the sync transfer layer uses.
const ZSTD_LEVEL: i32 = 3;

/// Wire identifier of a compression algorithm
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlgorithmType {
    /// Store chunks verbatim
    None,
    /// zlib (flate2)
    Zlib,
    /// zstd
    Zstd,
}

impl AlgorithmType {
    pub fn as_u16(self) -> u16 {
        match self {
            AlgorithmType::None => 0,
            AlgorithmType::Zlib => 1,
            AlgorithmType::Zstd => 2,
        }
    }

    pub fn from_u16(raw: u16) -> Result<Self> {
        match raw {
            0 => Ok(AlgorithmType::None),
            1 => Ok(AlgorithmType::Zlib),
            2 => Ok(AlgorithmType::Zstd),
            other => Err(CodecError::UnknownAlgorithm(other)),
        }
    }
}

/// A chunk-at-a-time compression algorithm
pub trait Algorithm: Send + Sync {
    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>>;
    fn decode(&self, chunk: &[u8]) -> Result<Vec<u8>>;
}

/// Look up the implementation for a wire tag
pub fn algorithm_from_type(ty: AlgorithmType) -> Box<dyn Algorithm> {
    match ty {
        AlgorithmType::None => Box::new(Passthrough),
        AlgorithmType::Zlib => Box::new(Zlib),
        AlgorithmType::Zstd => Box::new(Zstd),
    }
}

struct Passthrough;

impl Algorithm for Passthrough {
    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }

    fn decode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(chunk.to_vec())
    }
}

struct Zlib;

impl Algorithm for Zlib {
    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(chunk)?;
        Ok(encoder.finish()?)
    }

    fn decode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = ZlibDecoder::new(chunk);
        let mut decompressed = Vec::new();
        decoder.read_to_end(&mut decompressed)?;
        Ok(decompressed)
    }
}

struct Zstd;

impl Algorithm for Zstd {
    fn encode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::encode_all(chunk, ZSTD_LEVEL)?)
    }

    fn decode(&self, chunk: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::decode_all(chunk)?)
    }
}
