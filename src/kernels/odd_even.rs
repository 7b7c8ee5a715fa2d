//! Odd/even stream partition.
//!
//! The classification is on the literal predicate `value % 2 != 0`: values
//! that satisfy it land in `even`, everything else lands in `odd`. The bucket
//! names are inverted relative to the values they hold. The host-side
//! buffer wiring inverts them back (see [`crate::runtime::Design::OddEven`]).
//!
//! [`odd_even_indexed`] is the in-core variant: it uses `value % 2 == 0` for
//! `even`, with no inversion, and writes each value at its input position
//! instead of compacting.

use super::element_count;

/// Number of elements written to each output of [`odd_even`] or
/// [`odd_even_indexed`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Partition {
    /// Elements written to the `odd` output.
    pub odd: usize,
    /// Elements written to the `even` output.
    pub even: usize,
}

impl Partition {
    /// Total number of classified elements.
    pub fn total(&self) -> usize {
        self.odd + self.even
    }
}

/// Stable partition of `input[..n]` into `odd` and `even`.
///
/// Slots past the returned counts are left untouched.
///
/// # Panics
///
/// Panics if `n` exceeds `input.len()` or if either output is too small to
/// hold its share.
pub fn odd_even(input: &[i32], odd: &mut [i32], even: &mut [i32], n: i32) -> Partition {
    let mut counts = Partition::default();

    for &value in &input[..element_count(n)] {
        if value % 2 != 0 {
            even[counts.even] = value;
            counts.even += 1;
        } else {
            odd[counts.odd] = value;
            counts.odd += 1;
        }
    }

    counts
}

/// Position-preserving split of `input[..n]`, as done inside the compute
/// tile without an external kernel.
///
/// `input[i]` goes to `even[i]` when `input[i] % 2 == 0`, otherwise to
/// `odd[i]`. The slot at `i` in the other buffer is left untouched, so each
/// buffer keeps whatever it held there before.
///
/// # Panics
///
/// Panics if `n` exceeds any of the three slices.
pub fn odd_even_indexed(input: &[i32], even: &mut [i32], odd: &mut [i32], n: i32) -> Partition {
    let mut counts = Partition::default();

    for (i, &value) in input[..element_count(n)].iter().enumerate() {
        if value % 2 == 0 {
            even[i] = value;
            counts.even += 1;
        } else {
            odd[i] = value;
            counts.odd += 1;
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_identity_input() {
        let input: Vec<i32> = (0..4096).collect();
        let mut odd = vec![0; 4096];
        let mut even = vec![0; 4096];

        let counts = odd_even(&input, &mut odd, &mut even, 4096);

        assert_eq!(counts, Partition { odd: 2048, even: 2048 });
        // `odd` holds the values with an even remainder
        assert!(odd[..2048].iter().enumerate().all(|(k, &v)| v == 2 * k as i32));
        assert!(even[..2048].iter().enumerate().all(|(k, &v)| v == 2 * k as i32 + 1));
        assert!(odd[2048..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_negative_values_use_literal_predicate() {
        let input = [-3, -2, -1, 0];
        let mut odd = [0; 4];
        let mut even = [0; 4];

        let counts = odd_even(&input, &mut odd, &mut even, 4);

        assert_eq!(counts.total(), 4);
        assert_eq!(&even[..counts.even], &[-3, -1]);
        assert_eq!(&odd[..counts.odd], &[-2, 0]);
    }

    #[test]
    fn test_non_positive_length_writes_nothing() {
        let input = [1, 2, 3];
        let mut odd = [7; 3];
        let mut even = [7; 3];

        assert_eq!(odd_even(&input, &mut odd, &mut even, 0), Partition::default());
        assert_eq!(odd_even(&input, &mut odd, &mut even, -4), Partition::default());
        assert_eq!(odd, [7; 3]);
        assert_eq!(even, [7; 3]);
    }

    #[test]
    fn test_partial_length() {
        let input = [1, 2, 3, 4];
        let mut odd = [0; 4];
        let mut even = [0; 4];

        let counts = odd_even(&input, &mut odd, &mut even, 2);
        assert_eq!(counts, Partition { odd: 1, even: 1 });
        assert_eq!(odd, [2, 0, 0, 0]);
        assert_eq!(even, [1, 0, 0, 0]);
    }

    #[test]
    fn test_indexed_split_keeps_positions() {
        let input = [4, 7, -3, 10, 0, 9];
        let mut even = [-1; 6];
        let mut odd = [-2; 6];

        let counts = odd_even_indexed(&input, &mut even, &mut odd, 6);

        assert_eq!(counts, Partition { odd: 3, even: 3 });
        assert_eq!(even, [4, -1, -1, 10, 0, -1]);
        assert_eq!(odd, [-2, 7, -3, -2, -2, 9]);
    }

    #[test]
    fn test_indexed_split_empty() {
        let mut even = [5; 2];
        let mut odd = [5; 2];
        assert_eq!(odd_even_indexed(&[1, 2], &mut even, &mut odd, 0), Partition::default());
        assert_eq!(even, [5; 2]);
        assert_eq!(odd, [5; 2]);
    }

    proptest! {
        #[test]
        fn prop_indexed_split_covers_each_position_once(input in proptest::collection::vec(any::<i32>(), 0..128)) {
            let n = input.len();
            let mut even = vec![i32::MIN; n];
            let mut odd = vec![i32::MIN; n];

            let counts = odd_even_indexed(&input, &mut even, &mut odd, n as i32);
            prop_assert_eq!(counts.total(), n);

            for (i, &v) in input.iter().enumerate() {
                if v % 2 == 0 {
                    prop_assert_eq!(even[i], v);
                    prop_assert_eq!(odd[i], i32::MIN);
                } else {
                    prop_assert_eq!(odd[i], v);
                    prop_assert_eq!(even[i], i32::MIN);
                }
            }
        }

        #[test]
        fn prop_every_element_classified_once(input in proptest::collection::vec(any::<i32>(), 0..256)) {
            let n = input.len();
            let mut odd = vec![0; n];
            let mut even = vec![0; n];

            let counts = odd_even(&input, &mut odd, &mut even, n as i32);
            prop_assert_eq!(counts.total(), n);

            let mut union: Vec<i32> = odd[..counts.odd].iter().chain(&even[..counts.even]).copied().collect();
            let mut expected = input.clone();
            union.sort_unstable();
            expected.sort_unstable();
            prop_assert_eq!(union, expected);
        }

        #[test]
        fn prop_partition_is_stable(input in proptest::collection::vec(any::<i32>(), 0..256)) {
            let n = input.len();
            let mut odd = vec![0; n];
            let mut even = vec![0; n];

            let counts = odd_even(&input, &mut odd, &mut even, n as i32);

            let remainder: Vec<i32> = input.iter().copied().filter(|v| v % 2 != 0).collect();
            let divisible: Vec<i32> = input.iter().copied().filter(|v| v % 2 == 0).collect();
            prop_assert_eq!(&even[..counts.even], remainder.as_slice());
            prop_assert_eq!(&odd[..counts.odd], divisible.as_slice());
        }
    }
}
