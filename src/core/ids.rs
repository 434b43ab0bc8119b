//! Purpose: Compute the smallest positive id not used by any record.
//! Exports: `next_id`, `next_id_for`.
//! Invariants: Input order does not matter; ids are sorted and deduplicated here.
use std::collections::BTreeSet;

use super::car::Car;

pub fn next_id(ids: impl IntoIterator<Item = u32>) -> u32 {
    let used: BTreeSet<u32> = ids.into_iter().filter(|id| *id > 0).collect();
    let mut candidate = 1;
    for id in used {
        if id != candidate {
            break;
        }
        candidate += 1;
    }
    candidate
}

pub fn next_id_for(cars: &[Car]) -> u32 {
    next_id(cars.iter().map(|car| car.id))
}

#[cfg(test)]
mod tests {
    use super::next_id;

    #[test]
    fn contiguous_ids_allocate_next() {
        assert_eq!(next_id([1, 2, 3]), 4);
    }

    #[test]
    fn first_gap_is_reused() {
        assert_eq!(next_id([1, 3]), 2);
        assert_eq!(next_id([2, 3, 4]), 1);
        assert_eq!(next_id([1, 2, 5, 6]), 3);
    }

    #[test]
    fn empty_collection_starts_at_one() {
        assert_eq!(next_id([]), 1);
    }

    #[test]
    fn unsorted_and_duplicate_ids_are_tolerated() {
        assert_eq!(next_id([3, 1, 2, 2]), 4);
        assert_eq!(next_id([4, 1, 3]), 2);
    }
}
