//! Splitting work into balanced contiguous chunks.

/// Splits `items` into at most `max_workers` contiguous chunks.
///
/// Chunks hold `ceil(len / max_workers)` elements except possibly the last.
/// A `max_workers` of zero is treated as one. Empty input yields no chunks.
#[must_use]
pub fn partition<T>(items: &[T], max_workers: usize) -> Vec<&[T]> {
    if items.is_empty() {
        return Vec::new();
    }
    let workers = max_workers.max(1);
    let chunk_size = items.len().div_ceil(workers).max(1);
    items.chunks(chunk_size).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_has_no_chunks() {
        assert!(partition::<u8>(&[], 4).is_empty());
    }

    #[test]
    fn never_exceeds_worker_count() {
        let items: Vec<u32> = (0..5).collect();
        let chunks = partition(&items, 2);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0], &[0, 1, 2]);
        assert_eq!(chunks[1], &[3, 4]);
    }

    #[test]
    fn fewer_items_than_workers() {
        let items = ["a", "b"];
        let chunks = partition(&items, 8);
        assert_eq!(chunks, vec![&["a"][..], &["b"][..]]);
    }

    #[test]
    fn zero_workers_means_one_chunk() {
        let items = [1, 2, 3];
        assert_eq!(partition(&items, 0), vec![&items[..]]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn chunks_cover_input_exactly_once(len in 0usize..200, workers in 0usize..16) {
                let items: Vec<usize> = (0..len).collect();
                let chunks = partition(&items, workers);
                prop_assert!(chunks.len() <= workers.max(1));
                let flat: Vec<usize> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
                prop_assert_eq!(flat, items);
            }

            #[test]
            fn chunk_sizes_are_balanced(len in 1usize..200, workers in 1usize..16) {
                let items: Vec<usize> = (0..len).collect();
                let chunks = partition(&items, workers);
                let largest = chunks.iter().map(|c| c.len()).max().unwrap_or(0);
                prop_assert!(chunks.iter().all(|c| !c.is_empty()));
                prop_assert_eq!(largest, len.div_ceil(workers));
            }
        }
    }
}
