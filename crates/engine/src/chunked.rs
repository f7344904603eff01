//! Chunk range planning — generalized from the teacher's single-chunk-count
//! splitter to the ceiling-division scheme §3 requires.

use storage::Chunk;

/// Splits `[0, total_size - 1]` into `num_chunks` contiguous, non-overlapping
/// ranges. Chunk size is `ceil(total_size / num_chunks)`; the last chunk
/// absorbs the remainder. A `total_size` smaller than `num_chunks` still
/// produces as many chunks as fit; chunks whose start would land past the
/// end of the file are omitted rather than emitted as zero-length.
pub fn calculate_chunks(total_size: u64, num_chunks: u8) -> Vec<Chunk> {
    let n = num_chunks as u64;
    let chunk_size = total_size.div_ceil(n);

    let mut chunks = Vec::with_capacity(num_chunks as usize);
    for i in 0..num_chunks {
        let start = i as u64 * chunk_size;
        if total_size == 0 || start > total_size - 1 {
            break;
        }
        let end = std::cmp::min((i as u64 + 1) * chunk_size - 1, total_size - 1);
        chunks.push(Chunk::new(i, start, end));
    }
    chunks
}

/// Derives the filename from the URL's last path segment, falling back to
/// `download-<id>` when the URL has no usable segment.
pub fn derive_filename(url: &str, id: &str) -> String {
    let parsed = reqwest::Url::parse(url).ok();
    let segment = parsed.as_ref().and_then(|u| u.path_segments()).and_then(|mut s| s.next_back());

    match segment {
        Some(s) if !s.is_empty() => s.to_string(),
        _ => format!("download-{id}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eight_chunks_partition_a_1024_byte_file() {
        let chunks = calculate_chunks(1024, 8);
        assert_eq!(chunks.len(), 8);
        assert_eq!(chunks[0].start, 0);
        assert_eq!(chunks[0].end, 127);
        assert_eq!(chunks[7].start, 896);
        assert_eq!(chunks[7].end, 1023);
    }

    #[test]
    fn chunks_are_contiguous_with_no_gaps_or_overlap() {
        let chunks = calculate_chunks(100_003, 8);
        let mut next_start = 0u64;
        for chunk in &chunks {
            assert_eq!(chunk.start, next_start);
            assert!(chunk.end >= chunk.start);
            next_start = chunk.end + 1;
        }
        assert_eq!(next_start, 100_003);
    }

    #[test]
    fn small_file_still_partitions_exactly() {
        // 5 bytes split 8 ways: chunk_size = ceil(5/8) = 1, so only 5 of the
        // 8 chunks have a valid start within the file.
        let chunks = calculate_chunks(5, 8);
        assert_eq!(chunks.len(), 5);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.start, i as u64);
            assert_eq!(chunk.end, i as u64);
        }
    }

    #[test]
    fn filename_falls_back_when_path_is_empty() {
        assert_eq!(derive_filename("https://example.com/", "7"), "download-7");
        assert_eq!(derive_filename("https://example.com", "7"), "download-7");
        assert_eq!(derive_filename("https://example.com/dir/file.zip", "7"), "file.zip");
    }
}
