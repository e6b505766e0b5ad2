//! Write-path integration: codec blob -> content hash -> staged file
//!
//! File payloads cross the storage boundary as compressed streams; the
//! stream's hash names the File node and the seekable index serves ranged
//! reads without decompressing the whole object.

use anyhow::Result;
use ketch_codec::{AlgorithmType, ChunkReader, ChunkWriter};
use ketch_store::{Filesystem, Hash, KvStore};
use std::io::{Cursor, Write};

#[test]
fn test_compressed_payload_roundtrip_through_store() -> Result<()> {
    let fs = Filesystem::new(KvStore::temporary()?);

    // 100k of 'A' with 64 KiB chunks: two data chunks on the wire.
    let payload = vec![b'A'; 100_000];
    let mut writer = ChunkWriter::new(Vec::new(), AlgorithmType::Zlib);
    writer.write_all(&payload)?;
    let blob = writer.finish()?;

    // The blob's hash names the file's content.
    let content = Hash::digest(&blob);
    fs.stage_file("/big.bin", content.clone(), payload.len() as u64, "u")?;

    let file = fs.resolve_file("/big.bin")?.expect("file resolves");
    assert_eq!(file.content, content);
    assert_eq!(file.size, 100_000);

    // A ranged read straddling the chunk boundary decodes only what it needs.
    let mut reader = ChunkReader::open(Cursor::new(blob))?;
    assert_eq!(reader.size(), 100_000);

    let mut range = vec![0u8; 30_000];
    let mut read = 0;
    while read < range.len() {
        let n = reader.read_at(&mut range[read..], (50_000 + read) as u64)?;
        assert_ne!(n, 0);
        read += n;
    }
    assert_eq!(range, vec![b'A'; 30_000]);

    Ok(())
}

#[test]
fn test_content_hash_is_stable_across_rewrites() -> Result<()> {
    // Same payload, same algorithm: bit-identical stream, identical name.
    let payload = b"deterministic payload".repeat(1000);

    let mut first = ChunkWriter::new(Vec::new(), AlgorithmType::Zstd);
    first.write_all(&payload)?;
    let mut second = ChunkWriter::new(Vec::new(), AlgorithmType::Zstd);
    second.write_all(&payload)?;

    assert_eq!(
        Hash::digest(&first.finish()?),
        Hash::digest(&second.finish()?)
    );

    Ok(())
}
