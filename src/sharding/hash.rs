use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;

/// First eight bytes (big-endian) of SHA-256 over the decimal restaurant id.
pub fn restaurant_key(restaurant_id: i64) -> u64 {
    let digest = Sha256::digest(restaurant_id.to_string().as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

/// Lamping & Veach jump consistent hash: maps `key` into `[0, buckets)`.
pub fn jump_consistent_hash(mut key: u64, buckets: NonZeroUsize) -> usize {
    let buckets = buckets.get() as i64;
    let mut bucket: i64 = -1;
    let mut jump: i64 = 0;

    while jump < buckets {
        bucket = jump;
        key = key.wrapping_mul(2_862_933_555_777_941_757).wrapping_add(1);
        jump = ((bucket + 1) as f64 * ((1u64 << 31) as f64 / ((key >> 33) + 1) as f64)) as i64;
    }

    bucket as usize
}

/// Owning shard for a restaurant. Pure: depends only on the id and the shard count.
pub fn shard_for(restaurant_id: i64, shard_count: NonZeroUsize) -> usize {
    jump_consistent_hash(restaurant_key(restaurant_id), shard_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn n(count: usize) -> NonZeroUsize {
        NonZeroUsize::new(count).unwrap()
    }

    #[test]
    fn known_assignments_are_stable() {
        // Pinned values: a change here re-shards live restaurants.
        let four: Vec<usize> = [1, 42, 100, 200, 300, 400].iter().map(|&id| shard_for(id, n(4))).collect();
        assert_eq!(four, vec![2, 0, 2, 0, 1, 0]);

        let sixteen: Vec<usize> = [1, 42, 100, 200, 300, 400].iter().map(|&id| shard_for(id, n(16))).collect();
        assert_eq!(sixteen, vec![4, 12, 10, 12, 5, 9]);
    }

    #[test]
    fn repeated_calls_agree() {
        for id in [100, 200, 300, 400, -5, 0, i64::MAX] {
            let first = shard_for(id, n(4));
            for _ in 0..10 {
                assert_eq!(shard_for(id, n(4)), first);
            }
        }
    }

    #[test]
    fn always_in_range() {
        for count in 1..=17 {
            for id in 1..=500 {
                assert!(shard_for(id, n(count)) < count);
            }
        }
    }

    #[test]
    fn single_shard_takes_everything() {
        assert!((1..=1000).all(|id| shard_for(id, n(1)) == 0));
    }

    #[test]
    fn thousand_restaurants_fill_four_shards() {
        let mut counts = [0usize; 4];
        for id in 1..=1000 {
            counts[shard_for(id, n(4))] += 1;
        }
        assert_eq!(counts, [237, 254, 274, 235]);
        assert!(counts.iter().all(|&c| c > 0));
    }

    #[test]
    fn no_starved_shard_at_larger_counts() {
        for count in [3, 8, 16, 32] {
            let mut counts = vec![0usize; count];
            for id in 1..=(count as i64 * 50) {
                counts[shard_for(id, n(count))] += 1;
            }
            assert!(counts.iter().all(|&c| c > 0), "{count} shards: {counts:?}");
        }
    }

    #[test]
    fn growing_moves_keys_only_to_the_new_shard() {
        for id in 1..=1000 {
            let before = shard_for(id, n(4));
            let after = shard_for(id, n(5));
            assert!(after == before || after == 4, "restaurant {id}: {before} -> {after}");
        }
    }
}
