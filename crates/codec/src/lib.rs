//! Seekable chunked compression container
//!
//! File payloads cross the storage and network boundary in this format:
//! fixed-size input chunks compressed one at a time, a trailing index of
//! `(raw_off, zip_off)` records, and a fixed-size trailer locating the
//! index. The trailer sits at end-of-stream so the writer never seeks;
//! readers discover it from the last 14 bytes and can then serve ranged
//! reads without decompressing the whole object.

pub mod algorithm;
pub mod error;
pub mod format;
pub mod reader;
pub mod writer;

pub use algorithm::{algorithm_from_type, Algorithm, AlgorithmType};
pub use error::CodecError;
pub use format::{Record, Trailer, HEADER_SIZE, INDEX_RECORD_SIZE, MAX_CHUNK_SIZE, TRAILER_SIZE};
pub use reader::{ChunkReader, DEFAULT_CACHE_CHUNKS};
pub use writer::ChunkWriter;

/// Result type for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;
