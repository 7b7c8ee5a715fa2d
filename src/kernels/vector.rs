//! Elementwise vector operators.

use super::element_count;

/// `c[i] = a[i] + 1` for `i` in `0..n`, wrapping on overflow.
///
/// # Panics
///
/// Panics if `n` exceeds either slice.
pub fn vector_plus_one(a: &[i32], c: &mut [i32], n: i32) {
    let n = element_count(n);
    for (out, &value) in c[..n].iter_mut().zip(&a[..n]) {
        *out = value.wrapping_add(1);
    }
}
