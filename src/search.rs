//! Binary search over non-decreasing sequences.
//!
//! The sequence must be sorted ascending. Unsorted input never panics, but the
//! returned index is then meaningless.

use crate::error::{ArchiveError, Result};

/// Which match to return when several elements equal the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    /// Last element of the run of equal matches.
    #[default]
    Last,
    /// First element of the run of equal matches.
    First,
}

/// Largest index `i` with `seq[i] <= target`.
pub fn find<T: PartialOrd>(seq: &[T], target: &T) -> Result<usize> {
    find_by_key(seq, |x| x, target, TieBreak::Last)
}

pub fn find_with<T: PartialOrd>(seq: &[T], target: &T, tie: TieBreak) -> Result<usize> {
    find_by_key(seq, |x| x, target, tie)
}

/// Searches `seq` through the projection `key`.
pub fn find_by_key<T, K, F>(seq: &[T], key: F, target: &K, tie: TieBreak) -> Result<usize>
where
    K: PartialOrd + ?Sized,
    F: Fn(&T) -> &K,
{
    let after = seq.partition_point(|x| key(x) <= target);
    if after == 0 {
        return Err(ArchiveError::NotFound(if seq.is_empty() {
            "search in empty sequence".to_string()
        } else {
            "target is before the first element".to_string()
        }));
    }
    let last = after - 1;
    match tie {
        TieBreak::Last => Ok(last),
        TieBreak::First => {
            let found = key(&seq[last]);
            // Start of the run of elements equal to seq[last].
            Ok(seq[..last].partition_point(|x| key(x) < found))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn linear_find(seq: &[i64], target: i64) -> Option<usize> {
        seq.iter().rposition(|x| *x <= target)
    }

    #[test]
    fn test_find_matches_linear_scan() {
        let sequences: Vec<Vec<i64>> = vec![
            vec![],
            vec![5],
            vec![1, 2, 3, 4, 5],
            vec![1, 1, 1, 2, 2, 3, 9, 9],
            vec![-10, -3, 0, 0, 7, 7, 7, 20],
        ];
        for seq in &sequences {
            for target in -12..=22 {
                let expected = linear_find(seq, target);
                let actual = find(seq, &target).ok();
                assert_eq!(actual, expected, "seq {:?} target {}", seq, target);
            }
        }
    }

    #[test]
    fn test_find_empty_is_not_found() {
        let empty: Vec<i32> = vec![];
        let err = find(&empty, &3).unwrap_err();
        assert!(matches!(err, ArchiveError::NotFound(_)));
    }

    #[test]
    fn test_find_below_first_is_not_found() {
        assert!(matches!(find(&[2, 3], &1), Err(ArchiveError::NotFound(_))));
    }

    #[test]
    fn test_tie_break() {
        let seq = [1, 2, 2, 2, 5];
        assert_eq!(find_with(&seq, &2, TieBreak::Last).unwrap(), 3);
        assert_eq!(find_with(&seq, &2, TieBreak::First).unwrap(), 1);
        assert_eq!(find_with(&seq, &4, TieBreak::First).unwrap(), 1);
        assert_eq!(find_with(&seq, &9, TieBreak::First).unwrap(), 4);
    }

    #[test]
    fn test_find_by_key() {
        let seq = [(1.0, "a"), (2.5, "b"), (4.0, "c")];
        let idx = find_by_key(&seq, |p| &p.0, &3.0, TieBreak::Last).unwrap();
        assert_eq!(seq[idx].1, "b");
    }

    #[test]
    fn test_unsorted_input_does_not_panic() {
        let seq = [5, 1, 4, 2, 3];
        for target in 0..7 {
            if let Ok(i) = find(&seq, &target) {
                assert!(i < seq.len());
            }
        }
    }
}
