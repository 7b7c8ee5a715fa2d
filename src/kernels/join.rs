//! Nested-loop equi-join.
//!
//! For every position `i` in `input` and every position `j` in `input1`, a
//! match `input[i] == input1[j]` emits `(i, input[i])`. Emission is row-major
//! and nothing is deduplicated, so outputs need room for `n * n` entries in
//! the worst case.

use super::element_count;

/// Number of `(index, value)` pairs emitted by [`join`].
pub type JoinCount = usize;

/// Semi-join `input[..n]` against `input1[..n]`.
///
/// # Panics
///
/// Panics if `n` exceeds either input or the outputs overflow.
pub fn join(input: &[i32], input1: &[i32], index: &mut [i32], value: &mut [i32], n: i32) -> JoinCount {
    let n = element_count(n);
    let right = &input1[..n];
    let mut count = 0;

    for (i, &lhs) in input[..n].iter().enumerate() {
        for &rhs in right {
            if lhs == rhs {
                value[count] = lhs;
                index[count] = i as i32;
                count += 1;
            }
        }
    }

    count
}
