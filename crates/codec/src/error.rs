//! Error kinds for the compression container

/// Errors that can occur while writing or reading a compressed stream
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("bad magic bytes in stream header")]
    BadMagic,

    #[error("unsupported container version {0}")]
    UnsupportedVersion(u16),

    #[error("unknown compression algorithm type {0}")]
    UnknownAlgorithm(u16),

    #[error("header algorithm {header} does not match trailer algorithm {trailer}")]
    AlgorithmMismatch { header: u16, trailer: u16 },

    #[error("stream too short to hold header and trailer: {0} bytes")]
    TooShort(u64),

    #[error("corrupt chunk index: {0}")]
    CorruptIndex(String),

    #[error("chunk at raw offset {raw_off} decoded to {actual} bytes, expected {expected}")]
    ChunkSizeMismatch {
        raw_off: u64,
        expected: u64,
        actual: u64,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<CodecError> for std::io::Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Io(io) => io,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}
