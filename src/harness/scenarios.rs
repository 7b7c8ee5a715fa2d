//! The host tests.
//!
//! Each scenario only describes data: buffer layout, input patterns, and the
//! golden check. The run loop in [`super::run_scenario`] does the rest.

use crate::runtime::design::{LOCAL_EVEN_FILL, LOCAL_ODD_FILL};
use crate::runtime::Design;

use super::verify::{reference_add, reference_indexed_split, reference_join, reference_partition, Mismatches};
use super::{BufferRole, BufferSpec, Scenario, Snapshot};

/// Elements per test in the single-tile designs.
pub const DEFAULT_LEN: usize = 4096;
/// Object FIFO tile size in the placed pipeline.
pub const DEFAULT_CHUNK: usize = 256;
/// Elements per join input.
pub const DEFAULT_JOIN_LEN: usize = 8;
/// Elements in the in-core split.
pub const DEFAULT_LOCAL_MEM_LEN: usize = 64;

/// Size of the odd/even control-packet slot in bytes.
const CTRL_PACKET_BYTES: usize = 8;

fn words(snapshot: &Snapshot, arg: usize) -> &[u32] {
    snapshot.get(&arg).map(Vec::as_slice).unwrap_or(&[])
}

fn dump(name: &str, data: &[u32]) {
    let line: Vec<String> = data.iter().map(|&w| (w as i32).to_string()).collect();
    println!("{}: [{}]", name, line.join(", "));
}

/// Partition `i + iter` into the two output buffers.
#[derive(Debug, Clone, Copy)]
pub struct OddEvenTest {
    pub len: usize,
}

impl Default for OddEvenTest {
    fn default() -> Self {
        Self { len: DEFAULT_LEN }
    }
}

impl Scenario for OddEvenTest {
    fn name(&self) -> &'static str {
        "odd_even"
    }

    fn design(&self) -> Design {
        Design::OddEven { len: self.len }
    }

    fn buffers(&self) -> Vec<BufferSpec> {
        let bytes = self.len.saturating_mul(4);
        vec![
            BufferSpec { name: "inA", arg: 3, bytes, role: BufferRole::Input },
            BufferSpec { name: "outC", arg: 4, bytes, role: BufferRole::Output },
            BufferSpec { name: "outOdd", arg: 5, bytes, role: BufferRole::Output },
            BufferSpec { name: "ctrlpkts", arg: 6, bytes: CTRL_PACKET_BYTES, role: BufferRole::Scratch },
        ]
    }

    fn inputs(&self, iter: u32) -> Vec<(usize, Vec<u32>)> {
        let data = (0..self.len as u32).map(|i| i.wrapping_add(iter)).collect();
        vec![(3, data)]
    }

    fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches {
        let input = words(io, 3);
        let (even_values, odd_values) = reference_partition(input, self.len);
        if verbosity >= 1 {
            let evens = input.iter().filter(|&&v| (v as i32) % 2 == 0).count();
            println!("reference: {} even values, {} odd values", evens, input.len() - evens);
        }

        let mut m = Mismatches::new();
        m.compare("outC", &even_values, words(io, 4), verbosity);
        m.compare("outOdd", &odd_values, words(io, 5), verbosity);
        m
    }

    fn print_buffers(&self, io: &Snapshot) {
        dump("outC", words(io, 4));
        dump("outOdd", words(io, 5));
    }
}

/// `c[i] = a[i] + 1` on one tile.
#[derive(Debug, Clone, Copy)]
pub struct VectorPlusOneTest {
    pub len: usize,
}

impl Default for VectorPlusOneTest {
    fn default() -> Self {
        Self { len: DEFAULT_LEN }
    }
}

impl Scenario for VectorPlusOneTest {
    fn name(&self) -> &'static str {
        "vector_plus_one"
    }

    fn design(&self) -> Design {
        Design::VectorPlusOne { len: self.len }
    }

    fn buffers(&self) -> Vec<BufferSpec> {
        let bytes = self.len.saturating_mul(4);
        vec![
            BufferSpec { name: "inA", arg: 3, bytes, role: BufferRole::Input },
            BufferSpec { name: "outC", arg: 4, bytes, role: BufferRole::Output },
            BufferSpec { name: "outOdd", arg: 5, bytes, role: BufferRole::Scratch },
        ]
    }

    fn inputs(&self, _iter: u32) -> Vec<(usize, Vec<u32>)> {
        vec![(3, (0..self.len as u32).collect())]
    }

    fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches {
        let mut m = Mismatches::new();
        m.compare("outC", &reference_add(words(io, 3), 1), words(io, 4), verbosity);
        m
    }

    fn print_buffers(&self, io: &Snapshot) {
        dump("outC", words(io, 4));
    }
}

/// Two chained plus-one tiles, streamed in chunks: `c[i] = a[i] + 2`.
#[derive(Debug, Clone, Copy)]
pub struct PlacedPipelineTest {
    pub len: usize,
    pub chunk: usize,
}

impl Default for PlacedPipelineTest {
    fn default() -> Self {
        Self { len: DEFAULT_LEN, chunk: DEFAULT_CHUNK }
    }
}

impl Scenario for PlacedPipelineTest {
    fn name(&self) -> &'static str {
        "placed_pipeline"
    }

    fn design(&self) -> Design {
        Design::PlacedPipeline { len: self.len, chunk: self.chunk }
    }

    fn buffers(&self) -> Vec<BufferSpec> {
        let bytes = self.len.saturating_mul(4);
        vec![
            BufferSpec { name: "inA", arg: 3, bytes, role: BufferRole::Input },
            BufferSpec { name: "outC", arg: 4, bytes, role: BufferRole::Output },
            BufferSpec { name: "outOdd", arg: 5, bytes, role: BufferRole::Scratch },
        ]
    }

    fn inputs(&self, _iter: u32) -> Vec<(usize, Vec<u32>)> {
        vec![(3, (0..self.len as u32).collect())]
    }

    fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches {
        let mut m = Mismatches::new();
        m.compare("outC", &reference_add(words(io, 3), 2), words(io, 4), verbosity);
        m
    }

    fn print_buffers(&self, io: &Snapshot) {
        dump("outC", words(io, 4));
    }
}

/// One pair of join inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinCase {
    /// `[1..=n]` against `[1..=n]`: one match per row.
    Identity,
    /// `[k; n]` against `[1..=n]`.
    Constant(i32),
}

impl JoinCase {
    /// The `(input, input1)` pair for `len` elements.
    pub fn data(&self, len: usize) -> (Vec<u32>, Vec<u32>) {
        let ramp: Vec<u32> = (1..=len as u32).collect();
        match *self {
            JoinCase::Identity => (ramp.clone(), ramp),
            JoinCase::Constant(k) => (vec![k as u32; len], ramp),
        }
    }
}

/// Nested-loop equality join; iterations cycle through `cases`.
#[derive(Debug, Clone)]
pub struct JoinTest {
    pub len: usize,
    pub cases: Vec<JoinCase>,
}

impl Default for JoinTest {
    fn default() -> Self {
        Self {
            len: DEFAULT_JOIN_LEN,
            cases: vec![JoinCase::Identity, JoinCase::Constant(3)],
        }
    }
}

impl JoinTest {
    fn case(&self, iter: u32) -> JoinCase {
        if self.cases.is_empty() {
            return JoinCase::Identity;
        }
        self.cases[iter as usize % self.cases.len()]
    }
}

impl Scenario for JoinTest {
    fn name(&self) -> &'static str {
        "join"
    }

    fn design(&self) -> Design {
        Design::Join { len: self.len }
    }

    fn buffers(&self) -> Vec<BufferSpec> {
        let in_bytes = self.len.saturating_mul(4);
        let out_bytes = self.len.saturating_mul(self.len).saturating_mul(4);
        vec![
            BufferSpec { name: "inA", arg: 3, bytes: in_bytes, role: BufferRole::Input },
            BufferSpec { name: "inB", arg: 4, bytes: in_bytes, role: BufferRole::Input },
            BufferSpec { name: "outC", arg: 5, bytes: out_bytes, role: BufferRole::Output },
            BufferSpec { name: "outOdd", arg: 6, bytes: out_bytes, role: BufferRole::Output },
        ]
    }

    fn inputs(&self, iter: u32) -> Vec<(usize, Vec<u32>)> {
        let case = self.case(iter);
        log::debug!("join iteration {}: {:?}", iter, case);
        let (input, input1) = case.data(self.len);
        vec![(3, input), (4, input1)]
    }

    fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches {
        let (index, value) = reference_join(words(io, 3), words(io, 4), self.len.saturating_mul(self.len));
        let mut m = Mismatches::new();
        m.compare("outC", &index, words(io, 5), verbosity);
        m.compare("outOdd", &value, words(io, 6), verbosity);
        m
    }

    fn print_buffers(&self, io: &Snapshot) {
        dump("outC", words(io, 5));
        dump("outOdd", words(io, 6));
    }
}

/// In-core odd/even split: every input keeps its index in one of the two
/// outputs.
#[derive(Debug, Clone, Copy)]
pub struct LocalMemTest {
    pub len: usize,
}

impl Default for LocalMemTest {
    fn default() -> Self {
        Self { len: DEFAULT_LOCAL_MEM_LEN }
    }
}

impl Scenario for LocalMemTest {
    fn name(&self) -> &'static str {
        "local_mem"
    }

    fn design(&self) -> Design {
        Design::LocalMem { len: self.len }
    }

    fn buffers(&self) -> Vec<BufferSpec> {
        let bytes = self.len.saturating_mul(4);
        vec![
            BufferSpec { name: "inA", arg: 3, bytes, role: BufferRole::Input },
            BufferSpec { name: "outOdd", arg: 4, bytes, role: BufferRole::Output },
            BufferSpec { name: "outC", arg: 5, bytes, role: BufferRole::Output },
        ]
    }

    fn inputs(&self, iter: u32) -> Vec<(usize, Vec<u32>)> {
        let data = (0..self.len as u32).map(|i| i.wrapping_add(iter)).collect();
        vec![(3, data)]
    }

    fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches {
        let (even, odd) = reference_indexed_split(words(io, 3), LOCAL_EVEN_FILL, LOCAL_ODD_FILL);
        let mut m = Mismatches::new();
        m.compare("outOdd", &odd, words(io, 4), verbosity);
        m.compare("outC", &even, words(io, 5), verbosity);
        m
    }

    fn print_buffers(&self, io: &Snapshot) {
        dump("outOdd", words(io, 4));
        dump("outC", words(io, 5));
    }
}
