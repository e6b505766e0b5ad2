//! Chunking compression writer

use crate::algorithm::{algorithm_from_type, Algorithm, AlgorithmType};
use crate::format::{make_header, Record, Trailer, HEADER_SIZE, INDEX_RECORD_SIZE, MAX_CHUNK_SIZE, TRAILER_SIZE};
use crate::Result;
use std::io::{Read, Write};

/// Writer producing the seekable compressed container.
///
/// Incoming bytes are buffered into `MAX_CHUNK_SIZE` chunks; each full chunk
/// is compressed and appended together with an index record. `finish` must
/// be called to flush the residual chunk and emit index and trailer; a
/// dropped writer leaves a truncated stream.
pub struct ChunkWriter<W: Write> {
    inner: W,

    /// Buffers data into `MAX_CHUNK_SIZE` chunks.
    chunk_buf: Vec<u8>,

    /// Records with the start offsets of every flushed chunk.
    index: Vec<Record>,

    /// Accumulated uncompressed offset.
    raw_off: u64,

    /// Accumulated compressed offset (absolute stream position).
    zip_off: u64,

    algo: Box<dyn Algorithm>,
    algo_type: AlgorithmType,

    /// Becomes true after the first write.
    header_written: bool,
}

impl<W: Write> ChunkWriter<W> {
    pub fn new(inner: W, algo_type: AlgorithmType) -> Self {
        Self {
            inner,
            chunk_buf: Vec::with_capacity(MAX_CHUNK_SIZE),
            index: Vec::new(),
            raw_off: 0,
            zip_off: 0,
            algo: algorithm_from_type(algo_type),
            algo_type,
            header_written: false,
        }
    }

    fn write_header_if_needed(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }

        self.inner.write_all(&make_header(self.algo_type.as_u16()))?;
        self.header_written = true;
        self.zip_off += HEADER_SIZE as u64;
        Ok(())
    }

    /// Compress and append one chunk, recording its start offsets.
    /// Empty input is a no-op; a failed encode fails the whole write.
    fn flush_chunk(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }

        self.index.push(Record {
            raw_off: self.raw_off,
            zip_off: self.zip_off,
        });

        let encoded = self.algo.encode(data)?;
        self.inner.write_all(&encoded)?;

        self.raw_off += data.len() as u64;
        self.zip_off += encoded.len() as u64;
        Ok(())
    }

    fn buffer(&mut self, p: &[u8]) -> Result<()> {
        self.write_header_if_needed()?;
        self.chunk_buf.extend_from_slice(p);

        while self.chunk_buf.len() >= MAX_CHUNK_SIZE {
            let chunk: Vec<u8> = self.chunk_buf.drain(..MAX_CHUNK_SIZE).collect();
            self.flush_chunk(&chunk)?;
        }

        Ok(())
    }

    /// Drain `r` into the stream in chunk-sized reads, avoiding a caller-side
    /// buffer. Returns the number of bytes consumed.
    pub fn read_from<R: Read>(&mut self, mut r: R) -> Result<u64> {
        let mut total = 0u64;
        let mut buf = vec![0u8; MAX_CHUNK_SIZE];

        self.write_header_if_needed()?;

        loop {
            // Fill the buffer fully so mid-stream chunks stay fixed-size.
            let mut filled = 0;
            while filled < buf.len() {
                let n = r.read(&mut buf[filled..])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }

            if filled == 0 {
                return Ok(total);
            }

            self.buffer(&buf[..filled])?;
            total += filled as u64;

            if filled < buf.len() {
                return Ok(total);
            }
        }
    }

    /// Flush the residual chunk, append the sentinel index record, then
    /// write index and trailer. Returns the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        self.write_header_if_needed()?;

        if !self.chunk_buf.is_empty() {
            let rest = std::mem::take(&mut self.chunk_buf);
            self.flush_chunk(&rest)?;
        }

        // Sentinel at the post-last-chunk offsets; lets readers compute the
        // size of chunk i as rec[i+1] - rec[i].
        self.index.push(Record {
            raw_off: self.raw_off,
            zip_off: self.zip_off,
        });

        let index_size = (self.index.len() * INDEX_RECORD_SIZE) as u64;
        let mut index_buf = vec![0u8; index_size as usize];
        for (i, record) in self.index.iter().enumerate() {
            record.marshal(&mut index_buf[i * INDEX_RECORD_SIZE..(i + 1) * INDEX_RECORD_SIZE]);
        }
        self.inner.write_all(&index_buf)?;

        let trailer = Trailer {
            algorithm: self.algo_type.as_u16(),
            chunk_size: MAX_CHUNK_SIZE as u32,
            index_size,
        };
        let mut trailer_buf = [0u8; TRAILER_SIZE];
        trailer.marshal(&mut trailer_buf);
        self.inner.write_all(&trailer_buf)?;
        self.inner.flush()?;

        tracing::debug!(
            raw_bytes = self.raw_off,
            chunks = self.index.len() - 1,
            "finished compressed stream"
        );

        Ok(self.inner)
    }
}

impl<W: Write> Write for ChunkWriter<W> {
    fn write(&mut self, p: &[u8]) -> std::io::Result<usize> {
        self.buffer(p)?;
        Ok(p.len())
    }

    /// Flushes the underlying writer only. Partial chunks stay buffered
    /// until `finish`, since a chunk boundary is a format commitment.
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
