/// Shared helpers used across the collection pipeline.
///
/// This module contains:
/// - The chunker that splits an id list into detail-call batches
/// - Time helpers for run timing
///
/// Nothing here holds state.

use std::time::{Duration, Instant};

use chrono::NaiveDate;

/// Split an id list into consecutive batches of at most `chunk_size` ids.
///
/// GUARANTEES:
/// - Concatenating the batches yields `ids` unchanged (no gap, no overlap)
/// - Every batch except possibly the last holds exactly `chunk_size` ids
/// - An empty id list yields no batches (and therefore no detail calls)
///
/// `chunk_size` must be positive; callers validate it up front.
pub fn chunk_ids(ids: &[String], chunk_size: usize) -> Vec<&[String]> {
    debug_assert!(chunk_size > 0, "chunk_size must be validated before chunking");
    ids.chunks(chunk_size.max(1)).collect()
}

/// Number of detail calls an id list of `len` ids will need.
pub fn chunk_count(len: usize, chunk_size: usize) -> usize {
    len.div_ceil(chunk_size.max(1))
}

/// Milliseconds elapsed since `start`, saturating.
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Upstream wire format for date partitions.
pub fn format_partition(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Compact form used inside generated ids: `20260101`.
pub fn compact_partition(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Upstream wire format for the injected delay parameter.
pub fn delay_param(delay: Duration) -> String {
    delay.as_millis().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("OB-{i:06}")).collect()
    }

    #[test]
    fn chunks_partition_the_id_list_exactly() {
        let ids = ids(100);
        let chunks = chunk_ids(&ids, 99);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 99);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks.concat(), ids);
    }

    #[test]
    fn only_the_last_chunk_may_be_short() {
        for (len, size) in [(0, 3), (1, 3), (3, 3), (10, 3), (250, 99), (7, 1)] {
            let ids = ids(len);
            let chunks = chunk_ids(&ids, size);

            assert_eq!(chunks.len(), chunk_count(len, size), "len={len} size={size}");
            assert_eq!(chunks.concat(), ids);
            if let Some((last, full)) = chunks.split_last() {
                assert!(full.iter().all(|c| c.len() == size));
                assert!(!last.is_empty() && last.len() <= size);
            }
        }
    }

    #[test]
    fn empty_id_list_needs_no_detail_calls() {
        assert!(chunk_ids(&[], 99).is_empty());
        assert_eq!(chunk_count(0, 99), 0);
    }

    #[test]
    fn partition_formats() {
        let date = NaiveDate::from_ymd_opt(2026, 1, 5).unwrap();
        assert_eq!(format_partition(date), "2026-01-05");
        assert_eq!(compact_partition(date), "20260105");
        assert_eq!(delay_param(Duration::from_millis(500)), "500");
    }
}
