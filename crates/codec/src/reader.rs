//! Random-access reader for the compressed container

use crate::algorithm::{algorithm_from_type, Algorithm, AlgorithmType};
use crate::error::CodecError;
use crate::format::{parse_header, parse_index, Trailer, HEADER_SIZE, TRAILER_SIZE};
use crate::Result;
use ahash::AHashMap;
use std::collections::VecDeque;
use std::io::{Read, Seek, SeekFrom};
use std::sync::Arc;

/// Decoded chunks kept resident, in units of chunks. At the default chunk
/// size this is 512 KiB; tune with [`ChunkReader::with_cache_capacity`].
pub const DEFAULT_CACHE_CHUNKS: usize = 8;

/// Reader with random access into a compressed stream.
///
/// `open` parses trailer, index and header once; `read_at` then touches only
/// the chunks overlapping the requested range. Decoded chunks are cached LRU
/// by their raw offset -- chunks are immutable, so the cache never serves
/// stale data.
pub struct ChunkReader<R: Read + Seek> {
    inner: R,
    algo: Box<dyn Algorithm>,

    /// Chunk start offsets; the last record is the end-of-stream sentinel.
    index: Vec<crate::format::Record>,

    /// Chunk size recorded by the writer.
    chunk_size: u32,

    /// Current position for the `Read`/`Seek` impls.
    pos: u64,

    cache: ChunkCache,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn open(inner: R) -> Result<Self> {
        Self::with_cache_capacity(inner, DEFAULT_CACHE_CHUNKS)
    }

    pub fn with_cache_capacity(mut inner: R, cache_chunks: usize) -> Result<Self> {
        let end = inner.seek(SeekFrom::End(0))?;
        if end < (HEADER_SIZE + TRAILER_SIZE) as u64 {
            return Err(CodecError::TooShort(end));
        }

        inner.seek(SeekFrom::End(-(TRAILER_SIZE as i64)))?;
        let mut trailer_buf = [0u8; TRAILER_SIZE];
        inner.read_exact(&mut trailer_buf)?;
        let trailer = Trailer::parse(&trailer_buf);

        let meta = TRAILER_SIZE as u64 + trailer.index_size;
        if meta > end - HEADER_SIZE as u64 {
            return Err(CodecError::CorruptIndex(format!(
                "index size {} exceeds stream length {}",
                trailer.index_size, end
            )));
        }

        inner.seek(SeekFrom::Start(end - meta))?;
        let mut index_buf = vec![0u8; trailer.index_size as usize];
        inner.read_exact(&mut index_buf)?;
        let index = parse_index(&index_buf)?;

        inner.seek(SeekFrom::Start(0))?;
        let mut header_buf = [0u8; HEADER_SIZE];
        inner.read_exact(&mut header_buf)?;
        let header_algo = parse_header(&header_buf)?;
        if header_algo != trailer.algorithm {
            return Err(CodecError::AlgorithmMismatch {
                header: header_algo,
                trailer: trailer.algorithm,
            });
        }

        let algo_type = AlgorithmType::from_u16(trailer.algorithm)?;

        tracing::debug!(
            chunks = index.len() - 1,
            raw_size = index.last().map(|r| r.raw_off).unwrap_or(0),
            "opened compressed stream"
        );

        Ok(Self {
            inner,
            algo: algorithm_from_type(algo_type),
            index,
            chunk_size: trailer.chunk_size,
            pos: 0,
            cache: ChunkCache::new(cache_chunks),
        })
    }

    /// Total size of the uncompressed stream.
    pub fn size(&self) -> u64 {
        // The sentinel record sits at the post-last-chunk offsets.
        self.index.last().map(|r| r.raw_off).unwrap_or(0)
    }

    /// Chunk size the stream was written with.
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// Read up to `buf.len()` bytes starting at uncompressed offset `off`.
    /// Returns the number of bytes read; 0 means end of stream.
    pub fn read_at(&mut self, buf: &mut [u8], off: u64) -> Result<usize> {
        let total = self.size();
        let mut off = off;
        let mut written = 0usize;

        while written < buf.len() && off < total {
            let i = self.chunk_index_for(off);
            let chunk_start = self.index[i].raw_off;
            let chunk = self.load_chunk(i)?;

            let skip = (off - chunk_start) as usize;
            let n = (buf.len() - written).min(chunk.len() - skip);
            buf[written..written + n].copy_from_slice(&chunk[skip..skip + n]);

            written += n;
            off += n as u64;
        }

        Ok(written)
    }

    /// Index of the record whose chunk contains `off`.
    /// Caller guarantees `off < self.size()`.
    fn chunk_index_for(&self, off: u64) -> usize {
        self.index.partition_point(|r| r.raw_off <= off) - 1
    }

    /// Fetch a decoded chunk from the cache, decoding on miss.
    fn load_chunk(&mut self, i: usize) -> Result<Arc<Vec<u8>>> {
        let start = self.index[i];
        if let Some(chunk) = self.cache.get(start.raw_off) {
            return Ok(chunk);
        }

        let next = self.index[i + 1];
        let zip_len = (next.zip_off - start.zip_off) as usize;

        let mut compressed = vec![0u8; zip_len];
        self.inner.seek(SeekFrom::Start(start.zip_off))?;
        self.inner.read_exact(&mut compressed)?;

        let decoded = self.algo.decode(&compressed)?;
        let expected = next.raw_off - start.raw_off;
        if decoded.len() as u64 != expected {
            return Err(CodecError::ChunkSizeMismatch {
                raw_off: start.raw_off,
                expected,
                actual: decoded.len() as u64,
            });
        }

        let decoded = Arc::new(decoded);
        self.cache.put(start.raw_off, decoded.clone());
        Ok(decoded)
    }
}

impl<R: Read + Seek> Read for ChunkReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.read_at(buf, self.pos)?;
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for ChunkReader<R> {
    /// Pure metadata update; no I/O happens until the next read.
    fn seek(&mut self, whence: SeekFrom) -> std::io::Result<u64> {
        let target = match whence {
            SeekFrom::Start(off) => Some(off),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
            SeekFrom::End(delta) => self.size().checked_add_signed(delta),
        };

        match target {
            Some(pos) => {
                self.pos = pos;
                Ok(pos)
            }
            None => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "seek before start of stream",
            )),
        }
    }
}

/// LRU cache of decoded chunks keyed by raw offset.
struct ChunkCache {
    capacity: usize,
    map: AHashMap<u64, Arc<Vec<u8>>>,
    order: VecDeque<u64>,
}

impl ChunkCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            map: AHashMap::new(),
            order: VecDeque::new(),
        }
    }

    fn get(&mut self, raw_off: u64) -> Option<Arc<Vec<u8>>> {
        let chunk = self.map.get(&raw_off)?.clone();
        self.order.retain(|&k| k != raw_off);
        self.order.push_back(raw_off);
        Some(chunk)
    }

    fn put(&mut self, raw_off: u64, chunk: Arc<Vec<u8>>) {
        if self.map.insert(raw_off, chunk).is_none() {
            self.order.push_back(raw_off);
        }

        while self.map.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}
