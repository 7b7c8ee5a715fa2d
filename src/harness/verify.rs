//! Golden references and mismatch accounting.
//!
//! References are recomputed on the host from the inputs alone and never call
//! into [`crate::kernels`].

/// Mismatches kept for the summary; the count itself is unbounded.
const KEEP_FIRST: usize = 8;

/// One output slot that disagreed with its reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub buffer: &'static str,
    pub index: usize,
    pub expected: i32,
    pub actual: i32,
}

/// Running mismatch tally.
///
/// Every slot is checked: a mismatch is recorded and checking continues.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Mismatches {
    count: usize,
    checked: usize,
    first: Vec<Mismatch>,
}

impl Mismatches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one slot.
    pub fn check(&mut self, buffer: &'static str, index: usize, expected: i32, actual: i32, verbosity: u8) {
        self.checked += 1;
        if expected == actual {
            if verbosity >= 2 {
                println!("Correct output {} == {}", actual, expected);
            }
            return;
        }

        if verbosity >= 1 {
            println!("Error in output {} != {}", actual, expected);
        }
        self.count += 1;
        if self.first.len() < KEEP_FIRST {
            self.first.push(Mismatch { buffer, index, expected, actual });
        }
    }

    /// Compare `actual` slot by slot against `expected`.
    ///
    /// Slots missing from `actual` count as mismatches against zero.
    pub fn compare(&mut self, buffer: &'static str, expected: &[i32], actual: &[u32], verbosity: u8) {
        for (index, &want) in expected.iter().enumerate() {
            let got = actual.get(index).map(|&w| w as i32).unwrap_or(0);
            self.check(buffer, index, want, got, verbosity);
        }
    }

    /// Fold another tally into this one.
    pub fn merge(&mut self, other: Mismatches) {
        self.count += other.count;
        self.checked += other.checked;
        let room = KEEP_FIRST.saturating_sub(self.first.len());
        self.first.extend(other.first.into_iter().take(room));
    }

    /// Number of mismatching slots.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Number of slots compared.
    pub fn checked(&self) -> usize {
        self.checked
    }

    /// The earliest mismatches, in the order they were found.
    pub fn first(&self) -> &[Mismatch] {
        &self.first
    }

    pub fn is_clean(&self) -> bool {
        self.count == 0
    }
}

/// `input[i] + k` with 32-bit wraparound.
pub fn reference_add(input: &[u32], k: i32) -> Vec<i32> {
    input.iter().map(|&v| (v as i32).wrapping_add(k)).collect()
}

/// Expected contents of the two odd/even output buffers, padded with zero
/// sentinels to `capacity`.
///
/// Returns `(with_even_values, with_odd_values)`.
pub fn reference_partition(input: &[u32], capacity: usize) -> (Vec<i32>, Vec<i32>) {
    let values = input.iter().map(|&v| v as i32);
    let mut even: Vec<i32> = values.clone().filter(|v| v % 2 == 0).collect();
    let mut odd: Vec<i32> = values.filter(|v| v % 2 != 0).collect();
    even.resize(capacity.max(even.len()), 0);
    odd.resize(capacity.max(odd.len()), 0);
    (even, odd)
}

/// Expected contents of the in-core split: each input lands at its own index
/// in one buffer while the other buffer keeps its fill value there.
///
/// Returns `(even, odd)`.
pub fn reference_indexed_split(input: &[u32], even_fill: i32, odd_fill: i32) -> (Vec<i32>, Vec<i32>) {
    input
        .iter()
        .map(|&v| {
            let v = v as i32;
            if v % 2 == 0 {
                (v, odd_fill)
            } else {
                (even_fill, v)
            }
        })
        .unzip()
}

/// Expected `(index, value)` buffers of the nested-loop join, padded with zero
/// sentinels to `capacity`.
pub fn reference_join(input: &[u32], input1: &[u32], capacity: usize) -> (Vec<i32>, Vec<i32>) {
    let (mut index, mut value): (Vec<i32>, Vec<i32>) = input
        .iter()
        .enumerate()
        .flat_map(|(i, &a)| {
            input1
                .iter()
                .filter(move |&&b| a == b)
                .map(move |_| (i as i32, a as i32))
        })
        .unzip();
    index.resize(capacity.max(index.len()), 0);
    value.resize(capacity.max(value.len()), 0);
    (index, value)
}
