//! End-to-end stream tests: write, reopen, ranged reads, seeks

use anyhow::Result;
use ketch_codec::{AlgorithmType, ChunkReader, ChunkWriter, MAX_CHUNK_SIZE};
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

fn roundtrip(data: &[u8], ty: AlgorithmType) -> Result<ChunkReader<Cursor<Vec<u8>>>> {
    let mut w = ChunkWriter::new(Vec::new(), ty);
    w.write_all(data)?;
    Ok(ChunkReader::open(Cursor::new(w.finish()?))?)
}

/// Deterministic pseudo-random payload, no RNG dependency needed.
fn payload(len: usize) -> Vec<u8> {
    let mut state = 0x2545_f491_4f6c_dd1du64;
    (0..len)
        .map(|_| {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (state >> 56) as u8
        })
        .collect()
}

#[test]
fn test_full_roundtrip_all_algorithms() -> Result<()> {
    let data = payload(3 * MAX_CHUNK_SIZE + 7777);

    for ty in [AlgorithmType::None, AlgorithmType::Zlib, AlgorithmType::Zstd] {
        let mut r = roundtrip(&data, ty)?;
        assert_eq!(r.size(), data.len() as u64);

        let mut out = Vec::new();
        r.read_to_end(&mut out)?;
        assert_eq!(out, data, "roundtrip failed for {:?}", ty);
    }

    Ok(())
}

#[test]
fn test_large_payload_roundtrip() -> Result<()> {
    // Up to 16 chunks, the documented property-test bound.
    let data = payload(16 * MAX_CHUNK_SIZE);
    let mut r = roundtrip(&data, AlgorithmType::Zstd)?;

    let mut out = Vec::new();
    r.read_to_end(&mut out)?;
    assert_eq!(out, data);

    Ok(())
}

#[test]
fn test_ranged_reads_match_slices() -> Result<()> {
    let data = payload(4 * MAX_CHUNK_SIZE + 123);
    let mut r = roundtrip(&data, AlgorithmType::Zlib)?;

    // Ranges chosen to hit chunk interiors, boundaries and the tail.
    let ranges = [
        (0usize, 10usize),
        (MAX_CHUNK_SIZE - 5, 10),
        (MAX_CHUNK_SIZE, MAX_CHUNK_SIZE),
        (2 * MAX_CHUNK_SIZE + 1, 3 * MAX_CHUNK_SIZE),
        (4 * MAX_CHUNK_SIZE, 123),
        (data.len() - 1, 1),
    ];

    for (off, len) in ranges {
        let mut buf = vec![0u8; len];
        let mut read = 0;
        while read < len {
            let n = r.read_at(&mut buf[read..], (off + read) as u64)?;
            if n == 0 {
                break;
            }
            read += n;
        }
        let want = &data[off..(off + len).min(data.len())];
        assert_eq!(&buf[..read], want, "range ({off}, {len})");
    }

    Ok(())
}

#[test]
fn test_two_chunk_ranged_read() -> Result<()> {
    // 100_000 bytes of 'A' with 64 KiB chunks: exactly two data chunks.
    let data = vec![b'A'; 100_000];
    let mut r = roundtrip(&data, AlgorithmType::Zlib)?;

    let mut buf = vec![0u8; 30_000];
    let mut read = 0;
    while read < buf.len() {
        let n = r.read_at(&mut buf[read..], (50_000 + read) as u64)?;
        assert_ne!(n, 0);
        read += n;
    }
    assert_eq!(buf, vec![b'A'; 30_000]);

    Ok(())
}

#[test]
fn test_seek_then_read_equals_read_at() -> Result<()> {
    let data = payload(2 * MAX_CHUNK_SIZE + 99);

    for off in [0u64, 1, 65535, 65536, 100_000, (data.len() - 8) as u64] {
        let mut r = roundtrip(&data, AlgorithmType::Zstd)?;

        let mut via_read_at = [0u8; 8];
        let n1 = r.read_at(&mut via_read_at, off)?;

        r.seek(SeekFrom::Start(off))?;
        let mut via_seek = [0u8; 8];
        let n2 = r.read(&mut via_seek)?;

        assert_eq!(n1, n2, "offset {off}");
        assert_eq!(via_read_at[..n1], via_seek[..n2], "offset {off}");
    }

    Ok(())
}

#[test]
fn test_sequential_reads_advance_position() -> Result<()> {
    let data = payload(MAX_CHUNK_SIZE + 50);
    let mut r = roundtrip(&data, AlgorithmType::None)?;

    let mut first = vec![0u8; 100];
    r.read_exact(&mut first)?;
    let mut second = vec![0u8; 100];
    r.read_exact(&mut second)?;

    assert_eq!(first, &data[..100]);
    assert_eq!(second, &data[100..200]);

    Ok(())
}

#[test]
fn test_empty_stream_reopen() -> Result<()> {
    let mut r = roundtrip(b"", AlgorithmType::Zstd)?;
    assert_eq!(r.size(), 0);

    let mut out = Vec::new();
    r.read_to_end(&mut out)?;
    assert!(out.is_empty());

    Ok(())
}

#[test]
fn test_single_byte_reopen() -> Result<()> {
    let mut r = roundtrip(b"Z", AlgorithmType::Zlib)?;

    let mut buf = [0u8; 1];
    assert_eq!(r.read_at(&mut buf, 0)?, 1);
    assert_eq!(&buf, b"Z");

    Ok(())
}
