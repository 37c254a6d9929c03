//! Merkle commitment over a block's transactions.
//!
//! Leaves are transaction digests. Each pass first pairs the last hash with
//! itself when the level has an odd count, then combines adjacent pairs with
//! `hash(left ‖ right)`. At least one pass always runs, so a single leaf `d`
//! yields `hash(d ‖ d)` rather than `d`. An empty list has no root.

use crate::Hash;

/// Hash two child nodes to produce parent hash.
#[inline]
fn hash_pair(left: &Hash, right: &Hash) -> Hash {
    let mut data = [0u8; 64];
    data[..32].copy_from_slice(left.as_bytes());
    data[32..].copy_from_slice(right.as_bytes());
    Hash::from_bytes(&data)
}

/// Compute the Merkle root of `leaves`, or `None` for an empty list.
pub fn merkle_root(leaves: &[Hash]) -> Option<Hash> {
    if leaves.is_empty() {
        return None;
    }

    let mut level = leaves.to_vec();
    loop {
        if level.len() % 2 == 1 {
            if let Some(&last) = level.last() {
                level.push(last);
            }
        }

        level = level
            .chunks_exact(2)
            .map(|pair| hash_pair(&pair[0], &pair[1]))
            .collect();

        if level.len() == 1 {
            return level.first().copied();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<Hash> {
        (0..n)
            .map(|i| Hash::from_bytes(format!("leaf{i}").as_bytes()))
            .collect()
    }

    #[test]
    fn test_empty_has_no_root() {
        assert_eq!(merkle_root(&[]), None);
    }

    #[test]
    fn test_single_leaf_is_paired_with_itself() {
        let leaf = Hash::from_bytes(b"single leaf");
        let root = merkle_root(&[leaf]).unwrap();
        assert_eq!(root, hash_pair(&leaf, &leaf));
        assert_ne!(root, leaf);
    }

    #[test]
    fn test_two_leaves() {
        let l = leaves(2);
        assert_eq!(merkle_root(&l), Some(hash_pair(&l[0], &l[1])));
    }

    #[test]
    fn test_odd_count_duplicates_last() {
        let l = leaves(3);
        let left = hash_pair(&l[0], &l[1]);
        let right = hash_pair(&l[2], &l[2]);
        assert_eq!(merkle_root(&l), Some(hash_pair(&left, &right)));
    }

    #[test]
    fn test_odd_intermediate_level_duplicates_last() {
        // 6 leaves -> 3 nodes -> (dup) 2 nodes -> root
        let l = leaves(6);
        let a = hash_pair(&l[0], &l[1]);
        let b = hash_pair(&l[2], &l[3]);
        let c = hash_pair(&l[4], &l[5]);
        let expected = hash_pair(&hash_pair(&a, &b), &hash_pair(&c, &c));
        assert_eq!(merkle_root(&l), Some(expected));
    }

    #[test]
    fn test_order_sensitive() {
        let mut l = leaves(4);
        let root = merkle_root(&l);
        l.swap(0, 1);
        assert_ne!(merkle_root(&l), root);
    }
}
