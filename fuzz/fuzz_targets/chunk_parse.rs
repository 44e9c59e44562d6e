#![no_main]

use bytes::Bytes;
use libfuzzer_sys::fuzz_target;
use loghouse_chunk::{Direction, EntryIterator, IterContext, MemChunk, NoopPipeline};

fuzz_target!(|data: &[u8]| {
    // Feed arbitrary bytes to the chunk parser. All malformed inputs
    // must come back as errors, never panics:
    // - invalid magic at either end
    // - unknown version or encoding bytes
    // - truncated trailers, metadata, and payloads
    // - corrupted CRC32C checksums
    // - varints that overflow or run off the buffer
    // - compressed payloads that fail to decode
    let bytes = Bytes::copy_from_slice(data);

    if let Ok(chunk) = MemChunk::from_bytes(bytes, 256 * 1024, 0) {
        // parsing succeeded: iteration must still fail gracefully on
        // payloads whose frames are garbage
        let _ = chunk.compressed_size();
        let _ = chunk.uncompressed_size();
        let _ = chunk.blocks(i64::MIN, i64::MAX);

        let mut it = chunk.iterator(
            IterContext::background(),
            i64::MIN,
            i64::MAX,
            Direction::Forward,
            NoopPipeline,
        );
        while it.next() {
            let _ = it.entry();
        }
        let _ = it.error();
        it.close();
    }
});
