//! Host test harness.
//!
//! Drives a [`Scenario`] through the runtime the way the XRT host programs do:
//! allocate buffer objects per kernel argument group, bind them to one run
//! handle, then for every iteration refill inputs, sync, start, wait, sync
//! back, and verify against a host-side reference.
//!
//! ```no_run
//! use aie_kernel_tests::harness::{run_scenario, scenarios::JoinTest, TestOptions};
//!
//! let report = run_scenario(&JoinTest::default(), &TestOptions::default()).unwrap();
//! report.print();
//! assert!(report.passed());
//! ```

pub mod scenarios;
pub mod timing;
pub mod trace;
pub mod verify;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};

use crate::runtime::{
    load_instr_binary, load_instr_sequence, BoFlags, BufferObject, CommandState, Design, Device, Run,
    SyncDirection, Xclbin, ARG_INSTR, ARG_INSTR_COUNT, ARG_OPCODE, OPCODE_TRANSACTION,
};

pub use timing::NpuTimings;
pub use trace::write_out_trace;
pub use verify::{Mismatch, Mismatches};

/// Kernel name the harness looks up by default.
pub const DEFAULT_KERNEL: &str = "MLIR_AIE";
/// Default trace output path.
pub const DEFAULT_TRACE_FILE: &str = "trace.txt";

/// Buffer contents keyed by kernel argument index.
pub type Snapshot = BTreeMap<usize, Vec<u32>>;

/// What the harness does with a buffer between iterations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Refilled from [`Scenario::inputs`] every iteration.
    Input,
    /// Zeroed before every iteration and verified after it.
    Output,
    /// Bound but never touched by the host.
    Scratch,
}

/// One host-allocated data buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferSpec {
    pub name: &'static str,
    pub arg: usize,
    pub bytes: usize,
    pub role: BufferRole,
}

/// A host test: buffer layout, input patterns, and golden check.
pub trait Scenario {
    fn name(&self) -> &'static str;

    /// Design the kernel is bound to.
    fn design(&self) -> Design;

    /// Data buffers in kernel argument order, excluding instructions and trace.
    fn buffers(&self) -> Vec<BufferSpec>;

    /// Input contents for iteration `iter`, keyed by kernel argument.
    fn inputs(&self, iter: u32) -> Vec<(usize, Vec<u32>)>;

    /// Compare outputs in `io` against a host reference computed from the
    /// inputs in `io`.
    fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches;

    /// Dump output buffers to stdout.
    fn print_buffers(&self, io: &Snapshot);
}

/// Options shared by every host test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOptions {
    pub xclbin: Option<PathBuf>,
    pub instr: Option<PathBuf>,
    pub kernel: String,
    pub verbosity: u8,
    pub iters: u32,
    pub warmup: u32,
    /// Trace buffer size in bytes; 0 disables the trace dump.
    pub trace_size: usize,
    pub trace_file: PathBuf,
    pub print_buffers: bool,
}

impl Default for TestOptions {
    fn default() -> Self {
        Self {
            xclbin: None,
            instr: None,
            kernel: DEFAULT_KERNEL.to_string(),
            verbosity: 0,
            iters: 1,
            warmup: 0,
            trace_size: 0,
            trace_file: PathBuf::from(DEFAULT_TRACE_FILE),
            print_buffers: false,
        }
    }
}

/// Outcome of one host test.
#[derive(Debug, Clone)]
pub struct Report {
    pub scenario: &'static str,
    pub iterations: u32,
    pub warmup: u32,
    pub timings: NpuTimings,
    pub mismatches: Mismatches,
    /// Runs that did not end in [`CommandState::Completed`].
    pub failed_runs: usize,
}

impl Report {
    /// Mismatching slots plus failed runs.
    pub fn errors(&self) -> usize {
        self.mismatches.count() + self.failed_runs
    }

    pub fn passed(&self) -> bool {
        self.errors() == 0
    }

    /// Print the summary in the host tests' format.
    pub fn print(&self) {
        println!();
        println!("Number of iterations: {}", self.iterations);
        println!("Number of warmup iterations: {}", self.warmup);
        println!("Avg NPU time: {}us.", self.timings.avg_us());
        println!("Min NPU time: {}us.", self.timings.min_us());
        println!("Max NPU time: {}us.", self.timings.max_us());

        if self.passed() {
            println!("\nPASS!\n");
        } else {
            for m in self.mismatches.first() {
                println!("  {}[{}]: expected {}, got {}", m.buffer, m.index, m.expected, m.actual);
            }
            if self.failed_runs > 0 {
                println!("{} runs did not complete.", self.failed_runs);
            }
            println!("\n{} mismatches.\n", self.errors());
            println!("fail.");
        }
    }
}

/// Read an instruction file: `.txt` files hold one hex word per line,
/// anything else is a little-endian binary.
pub fn load_instructions(path: &Path) -> Result<Vec<u32>> {
    let is_text = path.extension().map_or(false, |ext| ext.eq_ignore_ascii_case("txt"));
    let words = if is_text {
        load_instr_sequence(path)?
    } else {
        load_instr_binary(path)?
    };
    Ok(words)
}

/// Run `scenario` for `opts.warmup + opts.iters` iterations.
pub fn run_scenario(scenario: &dyn Scenario, opts: &TestOptions) -> Result<Report> {
    let design = scenario.design();

    let instr = match &opts.instr {
        Some(path) => load_instructions(path)
            .with_context(|| format!("Failed to load instructions from {}", path.display()))?,
        None => Vec::new(),
    };
    if opts.verbosity >= 1 {
        println!("Sequence instr count: {}", instr.len());
    }

    let xclbin = opts.xclbin.as_deref().map(Xclbin::from_file).transpose()?;
    if let Some(xclbin) = &xclbin {
        xclbin.log_summary();
    }

    let mut device = Device::open(0)?;
    if opts.verbosity >= 1 {
        println!("Kernel opcode: {}", opts.kernel);
    }
    let kernel = device.load_kernel(xclbin.as_ref(), &opts.kernel, design)?;

    // An empty stream still gets a one-word buffer; XRT rejects zero-sized BOs.
    let bo_instr = BufferObject::new(&device, (instr.len() * 4).max(4), BoFlags::Cacheable, kernel.group_id(ARG_INSTR)?)?;
    bo_instr.write(&instr);

    let specs = scenario.buffers();
    let mut buffers: BTreeMap<usize, (BufferSpec, BufferObject)> = BTreeMap::new();
    for spec in &specs {
        // an empty run still binds a one-byte buffer
        let bo = BufferObject::new(&device, spec.bytes.max(1), BoFlags::HostOnly, kernel.group_id(spec.arg)?)
            .with_context(|| format!("Failed to allocate {}", spec.name))?;
        buffers.insert(spec.arg, (*spec, bo));
    }

    let bo_trace = match design.trace_arg() {
        Some(arg) => {
            // XRT rejects zero-sized BOs, so an unused trace still gets one byte.
            let bytes = if opts.trace_size > 0 { opts.trace_size.saturating_mul(4) } else { 1 };
            Some((arg, BufferObject::new(&device, bytes, BoFlags::HostOnly, kernel.group_id(arg)?)?))
        }
        None => None,
    };

    if opts.verbosity >= 1 {
        println!("Writing data into buffer objects.");
    }

    let mut run = Run::new(&kernel);
    run.set_arg(ARG_OPCODE, OPCODE_TRANSACTION);
    run.set_arg(ARG_INSTR, &bo_instr);
    run.set_arg(ARG_INSTR_COUNT, instr.len());
    for (arg, (_, bo)) in &buffers {
        run.set_arg(*arg, bo);
    }
    if let Some((arg, bo)) = &bo_trace {
        run.set_arg(*arg, bo);
    }

    bo_instr.sync(SyncDirection::ToDevice);

    let mut report = Report {
        scenario: scenario.name(),
        iterations: opts.iters,
        warmup: opts.warmup,
        timings: NpuTimings::new(),
        mismatches: Mismatches::new(),
        failed_runs: 0,
    };

    for iter in 0..opts.warmup + opts.iters {
        for (arg, data) in scenario.inputs(iter) {
            if let Some((_, bo)) = buffers.get(&arg) {
                bo.write(&data);
            }
        }
        for (spec, bo) in buffers.values() {
            if spec.role == BufferRole::Output {
                bo.clear();
            }
        }
        if let Some((_, bo)) = &bo_trace {
            bo.clear();
        }
        for (_, bo) in buffers.values() {
            bo.sync(SyncDirection::ToDevice);
        }
        if let Some((_, bo)) = &bo_trace {
            bo.sync(SyncDirection::ToDevice);
        }

        if opts.verbosity >= 1 {
            println!("Running Kernel.");
        }
        let start = Instant::now();
        run.start()?;
        let state = run.wait();
        let elapsed = start.elapsed();

        if state != CommandState::Completed {
            println!("Kernel did not complete. Returned status: {}", state);
            if let Some(e) = run.last_error() {
                log::error!("{}: {}", scenario.name(), e);
            }
            report.failed_runs += 1;
        }

        for (spec, bo) in buffers.values() {
            if spec.role == BufferRole::Output {
                bo.sync(SyncDirection::FromDevice);
            }
        }
        if let Some((_, bo)) = &bo_trace {
            bo.sync(SyncDirection::FromDevice);
        }

        if iter < opts.warmup {
            continue;
        }

        let us = report.timings.record(elapsed);
        if opts.verbosity >= 1 {
            println!("NPU time: {}us.", us);
        }

        if opts.trace_size > 0 && iter == opts.warmup {
            if let Some((_, bo)) = &bo_trace {
                write_out_trace(&bo.to_vec(), opts.trace_size, &opts.trace_file)?;
            }
        }

        let io: Snapshot = buffers
            .iter()
            .filter(|(_, (spec, _))| spec.role != BufferRole::Scratch)
            .map(|(arg, (spec, bo))| {
                let mut words = bo.to_vec();
                words.truncate(spec.bytes.div_ceil(4));
                (*arg, words)
            })
            .collect();
        if opts.print_buffers {
            scenario.print_buffers(&io);
        }

        if opts.verbosity >= 1 {
            println!("Verifying results ...");
        }
        report.mismatches.merge(scenario.verify(&io, opts.verbosity));
    }

    log::info!(
        "{}: {} iterations, {} mismatches, {} failed runs",
        scenario.name(),
        opts.iters,
        report.mismatches.count(),
        report.failed_runs
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::scenarios::{JoinTest, LocalMemTest, OddEvenTest, PlacedPipelineTest, VectorPlusOneTest};
    use super::*;
    use crate::runtime::instr::asm;

    /// Plus-one with a deliberate off-by-one in the golden check.
    struct WrongReference;

    impl Scenario for WrongReference {
        fn name(&self) -> &'static str {
            "wrong_reference"
        }
        fn design(&self) -> Design {
            Design::VectorPlusOne { len: 4 }
        }
        fn buffers(&self) -> Vec<BufferSpec> {
            VectorPlusOneTest { len: 4 }.buffers()
        }
        fn inputs(&self, _iter: u32) -> Vec<(usize, Vec<u32>)> {
            vec![(3, vec![1, 2, 3, 4])]
        }
        fn verify(&self, io: &Snapshot, verbosity: u8) -> Mismatches {
            let mut m = Mismatches::new();
            m.compare("outC", &[3, 4, 5, 6], &io[&4], verbosity);
            m
        }
        fn print_buffers(&self, _io: &Snapshot) {}
    }

    #[test]
    fn test_odd_even_passes() {
        let opts = TestOptions { iters: 3, ..Default::default() };
        let report = run_scenario(&OddEvenTest { len: 64 }, &opts).unwrap();
        assert!(report.passed(), "{:?}", report.mismatches.first());
        assert_eq!(report.timings.samples(), 3);
        assert_eq!(report.mismatches.checked(), 3 * 2 * 64);
    }

    #[test]
    fn test_warmup_is_not_timed_or_verified() {
        let opts = TestOptions { iters: 2, warmup: 3, ..Default::default() };
        let report = run_scenario(&VectorPlusOneTest { len: 16 }, &opts).unwrap();
        assert!(report.passed());
        assert_eq!(report.timings.samples(), 2);
        assert_eq!(report.mismatches.checked(), 2 * 16);
    }

    #[test]
    fn test_pipeline_and_join_pass() {
        let opts = TestOptions { iters: 2, ..Default::default() };
        assert!(run_scenario(&PlacedPipelineTest { len: 512, chunk: 256 }, &opts).unwrap().passed());
        assert!(run_scenario(&JoinTest::default(), &opts).unwrap().passed());
    }

    #[test]
    fn test_zero_length_is_an_empty_run() {
        let opts = TestOptions { iters: 2, ..Default::default() };
        for report in [
            run_scenario(&OddEvenTest { len: 0 }, &opts).unwrap(),
            run_scenario(&VectorPlusOneTest { len: 0 }, &opts).unwrap(),
            run_scenario(&JoinTest { len: 0, ..JoinTest::default() }, &opts).unwrap(),
            run_scenario(&LocalMemTest { len: 0 }, &opts).unwrap(),
        ] {
            assert!(report.passed(), "{}", report.scenario);
            assert_eq!(report.mismatches.checked(), 0);
        }
    }

    #[test]
    fn test_oversized_join_is_an_error() {
        let opts = TestOptions::default();
        let err = run_scenario(&JoinTest { len: 1 << 20, ..JoinTest::default() }, &opts).unwrap_err();
        assert!(format!("{:#}", err).contains("byte limit"), "{:#}", err);

        let err = run_scenario(&JoinTest { len: usize::MAX, ..JoinTest::default() }, &opts).unwrap_err();
        assert!(format!("{:#}", err).contains("byte limit"), "{:#}", err);
    }

    #[test]
    fn test_local_mem_passes() {
        let opts = TestOptions { iters: 3, ..Default::default() };
        let report = run_scenario(&LocalMemTest::default(), &opts).unwrap();
        assert!(report.passed(), "{:?}", report.mismatches.first());
        assert_eq!(report.mismatches.checked(), 3 * 2 * 64);
    }

    #[test]
    fn test_mismatches_accumulate_across_iterations() {
        let opts = TestOptions { iters: 2, ..Default::default() };
        let report = run_scenario(&WrongReference, &opts).unwrap();
        assert!(!report.passed());
        assert_eq!(report.errors(), 8);
        assert_eq!(report.failed_runs, 0);
    }

    #[test]
    fn test_unbound_patch_counts_as_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insts.bin");
        let words = asm::stream(&[asm::ddr_patch(0x1D004, 9, 0)]);
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        std::fs::write(&path, bytes).unwrap();

        let opts = TestOptions { instr: Some(path), ..Default::default() };
        let report = run_scenario(&VectorPlusOneTest { len: 8 }, &opts).unwrap();
        assert_eq!(report.failed_runs, 1);
        assert!(!report.passed());
    }

    #[test]
    fn test_trace_written_on_first_timed_iteration() {
        let dir = tempfile::tempdir().unwrap();
        let trace_file = dir.path().join("trace.txt");
        let opts = TestOptions {
            iters: 2,
            warmup: 1,
            trace_size: 16,
            trace_file: trace_file.clone(),
            ..Default::default()
        };

        let report = run_scenario(&VectorPlusOneTest { len: 8 }, &opts).unwrap();
        assert!(report.passed());

        let text = std::fs::read_to_string(&trace_file).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], "e0000000");
        assert_eq!(lines[1], "e1000001");
        assert_eq!(lines[2], "00000000");
    }

    #[test]
    fn test_text_instruction_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("insts.txt");
        let words = asm::stream(&[asm::write32(0x1D000, 1)]);
        let text: String = words.iter().map(|w| format!("{:08x}\n", w)).collect();
        std::fs::write(&path, text).unwrap();

        assert_eq!(load_instructions(&path).unwrap(), words);
    }
}
