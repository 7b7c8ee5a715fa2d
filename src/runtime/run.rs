//! Run handles.
//!
//! A [`Run`] owns the argument bindings for one kernel. [`Run::start`]
//! snapshots the bindings and hands them to a worker thread; [`Run::wait`]
//! blocks until that worker finishes. There is at most one outstanding
//! execution per handle.

use std::collections::BTreeMap;
use std::fmt;
use std::thread::JoinHandle;

use crate::kernels::NoEvents;

use super::bo::BufferObject;
use super::design::{Design, TraceRecorder};
use super::device::Kernel;
use super::instr::{NpuInstruction, NpuInstructionStream};
use super::{RuntimeError, ARG_INSTR, ARG_INSTR_COUNT, ARG_OPCODE, FIRST_BUFFER_ARG, OPCODE_TRANSACTION};

/// A bound kernel argument.
#[derive(Debug, Clone)]
pub enum KernelArg {
    Scalar(u64),
    Buffer(BufferObject),
}

impl From<u32> for KernelArg {
    fn from(value: u32) -> Self {
        KernelArg::Scalar(value as u64)
    }
}

impl From<u64> for KernelArg {
    fn from(value: u64) -> Self {
        KernelArg::Scalar(value)
    }
}

impl From<usize> for KernelArg {
    fn from(value: usize) -> Self {
        KernelArg::Scalar(value as u64)
    }
}

impl From<&BufferObject> for KernelArg {
    fn from(bo: &BufferObject) -> Self {
        KernelArg::Buffer(bo.clone())
    }
}

impl From<BufferObject> for KernelArg {
    fn from(bo: BufferObject) -> Self {
        KernelArg::Buffer(bo)
    }
}

/// Command state reported by [`Run::wait`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    /// Never started.
    New,
    /// Started, not yet waited on.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error; see [`Run::last_error`].
    Error,
}

impl fmt::Display for CommandState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CommandState::New => "ERT_CMD_STATE_NEW",
            CommandState::Running => "ERT_CMD_STATE_RUNNING",
            CommandState::Completed => "ERT_CMD_STATE_COMPLETED",
            CommandState::Error => "ERT_CMD_STATE_ERROR",
        };
        f.write_str(s)
    }
}

/// A run handle for one kernel.
pub struct Run {
    kernel: String,
    design: Design,
    args: BTreeMap<usize, KernelArg>,
    state: CommandState,
    pending: Option<JoinHandle<Result<(), RuntimeError>>>,
    last_error: Option<RuntimeError>,
}

impl Run {
    /// Create an unstarted run for `kernel`.
    pub fn new(kernel: &Kernel) -> Self {
        Self {
            kernel: kernel.name().to_string(),
            design: kernel.design(),
            args: BTreeMap::new(),
            state: CommandState::New,
            pending: None,
            last_error: None,
        }
    }

    /// Bind argument `idx`. Bindings persist across starts.
    pub fn set_arg(&mut self, idx: usize, arg: impl Into<KernelArg>) {
        let arg = arg.into();
        if let KernelArg::Buffer(bo) = &arg {
            if bo.group() as usize != idx {
                log::warn!(
                    "{}: arg {} bound to a buffer from group {}",
                    self.kernel, idx, bo.group()
                );
            }
        }
        self.args.insert(idx, arg);
    }

    /// Current state without blocking.
    pub fn state(&self) -> CommandState {
        self.state
    }

    /// Error from the most recent failed run.
    pub fn last_error(&self) -> Option<&RuntimeError> {
        self.last_error.as_ref()
    }

    /// Launch the kernel with the current bindings.
    ///
    /// A run that has been waited on may be started again; it re-executes
    /// with the same bindings and whatever the buffers' device views now hold.
    pub fn start(&mut self) -> Result<(), RuntimeError> {
        if self.pending.is_some() {
            return Err(RuntimeError::RunInFlight);
        }

        let design = self.design;
        let args = self.args.clone();
        let handle = std::thread::Builder::new()
            .name(format!("aie-{}", self.kernel))
            .spawn(move || execute(design, &args))
            .map_err(RuntimeError::Spawn)?;

        log::debug!("{}: started", self.kernel);
        self.pending = Some(handle);
        self.state = CommandState::Running;
        self.last_error = None;
        Ok(())
    }

    /// Block until the outstanding execution finishes. No timeout.
    pub fn wait(&mut self) -> CommandState {
        let Some(handle) = self.pending.take() else {
            return self.state;
        };

        let outcome = handle
            .join()
            .unwrap_or_else(|_| Err(RuntimeError::KernelPanicked(self.kernel.clone())));

        self.state = match outcome {
            Ok(()) => CommandState::Completed,
            Err(e) => {
                log::error!("{}: {}", self.kernel, e);
                self.last_error = Some(e);
                CommandState::Error
            }
        };
        self.state
    }
}

impl Drop for Run {
    fn drop(&mut self) {
        if self.pending.is_some() {
            self.wait();
        }
    }
}

fn scalar(args: &BTreeMap<usize, KernelArg>, idx: usize) -> Result<u64, RuntimeError> {
    match args.get(&idx) {
        Some(KernelArg::Scalar(v)) => Ok(*v),
        Some(KernelArg::Buffer(_)) => Err(RuntimeError::ArgKind { arg: idx, expected: "scalar" }),
        None => Err(RuntimeError::MissingArg(idx)),
    }
}

fn buffer(args: &BTreeMap<usize, KernelArg>, idx: usize) -> Result<&BufferObject, RuntimeError> {
    match args.get(&idx) {
        Some(KernelArg::Buffer(bo)) => Ok(bo),
        Some(KernelArg::Scalar(_)) => Err(RuntimeError::ArgKind { arg: idx, expected: "buffer" }),
        None => Err(RuntimeError::MissingArg(idx)),
    }
}

/// Worker body: validate the command, walk the instruction stream, run the design.
fn execute(design: Design, args: &BTreeMap<usize, KernelArg>) -> Result<(), RuntimeError> {
    let opcode = scalar(args, ARG_OPCODE)?;
    if opcode != OPCODE_TRANSACTION {
        return Err(RuntimeError::UnsupportedOpcode(opcode));
    }

    let buffers: BTreeMap<usize, BufferObject> = args
        .iter()
        .filter(|(idx, _)| **idx >= FIRST_BUFFER_ARG)
        .filter_map(|(idx, arg)| match arg {
            KernelArg::Buffer(bo) => Some((*idx, bo.clone())),
            KernelArg::Scalar(_) => None,
        })
        .collect();

    let instr = buffer(args, ARG_INSTR)?;
    let count = scalar(args, ARG_INSTR_COUNT)? as usize;
    let words = instr.device_view().to_vec();
    if count > words.len() {
        return Err(RuntimeError::BufferTooSmall { arg: ARG_INSTR, needed: count, have: words.len() });
    }
    if count > 0 {
        let stream = NpuInstructionStream::from_words(&words[..count])?;
        walk_instructions(&stream, &buffers)?;
    }

    let trace = design
        .trace_arg()
        .and_then(|arg| buffers.get(&arg))
        .map(|bo| (bo, TraceRecorder::new(bo.words())));

    match trace {
        Some((bo, mut recorder)) => {
            design.execute(&buffers, &mut recorder)?;
            recorder.flush(bo);
            log::debug!("{}: {} trace words", design.name(), recorder.words().len());
        }
        None => design.execute(&buffers, &mut NoEvents)?,
    }
    Ok(())
}

/// The emulator has no shim DMAs to program; it only checks that every
/// address patch points at a buffer the host actually bound.
fn walk_instructions(
    stream: &NpuInstructionStream,
    buffers: &BTreeMap<usize, BufferObject>,
) -> Result<(), RuntimeError> {
    let mut writes = 0usize;
    for instr in stream.instructions() {
        match instr {
            NpuInstruction::Write32 { .. } | NpuInstruction::BlockWrite { .. } | NpuInstruction::MaskWrite { .. } => {
                writes += 1;
            }
            NpuInstruction::DdrPatch { arg_idx, arg_plus, .. } => {
                let kernel_arg = FIRST_BUFFER_ARG + *arg_idx as usize;
                if !buffers.contains_key(&kernel_arg) {
                    return Err(RuntimeError::UnboundPatch { arg_idx: *arg_idx, kernel_arg });
                }
                log::trace!("patch: runtime arg {} (+{}) -> kernel arg {}", arg_idx, arg_plus, kernel_arg);
            }
            NpuInstruction::MaskPoll { .. } | NpuInstruction::Sync { .. } => {
                // completion is immediate in the emulator
            }
            NpuInstruction::Unknown { opcode, .. } => {
                log::warn!("skipping unknown NPU opcode 0x{:02X}", opcode);
            }
        }
    }
    log::debug!("instruction stream: {} ops, {} register writes", stream.len(), writes);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::instr::{asm, InstrError, INSTR_MAGIC};
    use crate::runtime::{BoFlags, Device, SyncDirection};

    struct Fixture {
        kernel: Kernel,
        instr: BufferObject,
        a: BufferObject,
        c: BufferObject,
    }

    fn fixture(len: usize) -> Fixture {
        let dev = Device::open(0).unwrap();
        let kernel = dev
            .clone()
            .load_kernel(None, "MLIR_AIE", Design::VectorPlusOne { len })
            .unwrap();
        let instr = BufferObject::new(&dev, 64 * 4, BoFlags::Cacheable, 1).unwrap();
        let a = BufferObject::new(&dev, len * 4, BoFlags::HostOnly, 3).unwrap();
        let c = BufferObject::new(&dev, len * 4, BoFlags::HostOnly, 4).unwrap();
        Fixture { kernel, instr, a, c }
    }

    fn bind(run: &mut Run, f: &Fixture, instr_words: usize) {
        run.set_arg(0, 3u32);
        run.set_arg(1, &f.instr);
        run.set_arg(2, instr_words);
        run.set_arg(3, &f.a);
        run.set_arg(4, &f.c);
    }

    #[test]
    fn test_run_completes() {
        let f = fixture(4);
        f.a.write(&[10, 20, 30, 40]);
        f.a.sync(SyncDirection::ToDevice);

        let mut run = Run::new(&f.kernel);
        assert_eq!(run.state(), CommandState::New);
        bind(&mut run, &f, 0);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Completed);

        f.c.sync(SyncDirection::FromDevice);
        assert_eq!(f.c.to_vec(), vec![11, 21, 31, 41]);
    }

    #[test]
    fn test_missing_sync_reads_stale_data() {
        let f = fixture(2);
        f.a.write(&[5, 6]);
        // no ToDevice sync: the kernel sees zeros

        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, 0);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Completed);

        assert_eq!(f.c.to_vec(), vec![0, 0], "host view untouched before FromDevice");
        f.c.sync(SyncDirection::FromDevice);
        assert_eq!(f.c.to_vec(), vec![1, 1]);
    }

    #[test]
    fn test_restart_reuses_bindings() {
        let f = fixture(2);
        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, 0);

        f.a.write(&[1, 2]);
        f.a.sync(SyncDirection::ToDevice);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Completed);

        f.a.write(&[100, 200]);
        f.a.sync(SyncDirection::ToDevice);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Completed);

        f.c.sync(SyncDirection::FromDevice);
        assert_eq!(f.c.to_vec(), vec![101, 201]);
    }

    #[test]
    fn test_start_while_in_flight_is_rejected() {
        let f = fixture(2);
        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, 0);
        run.start().unwrap();
        assert!(matches!(run.start(), Err(RuntimeError::RunInFlight)));
        assert_eq!(run.wait(), CommandState::Completed);
    }

    #[test]
    fn test_bad_opcode() {
        let f = fixture(2);
        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, 0);
        run.set_arg(0, 7u32);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Error);
        assert!(matches!(run.last_error(), Some(RuntimeError::UnsupportedOpcode(7))));
    }

    #[test]
    fn test_missing_output_fails_run() {
        let f = fixture(2);
        let mut run = Run::new(&f.kernel);
        run.set_arg(0, 3u32);
        run.set_arg(1, &f.instr);
        run.set_arg(2, 0u32);
        run.set_arg(3, &f.a);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Error);
        assert!(matches!(run.last_error(), Some(RuntimeError::MissingArg(4))));
    }

    #[test]
    fn test_instruction_patches_must_be_bound() {
        let f = fixture(2);
        let ok = asm::stream(&[asm::ddr_patch(0x1D004, 0, 0), asm::ddr_patch(0x1D024, 1, 0)]);
        f.instr.write(&ok);
        f.instr.sync(SyncDirection::ToDevice);

        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, ok.len());
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Completed);

        let bad = asm::stream(&[asm::ddr_patch(0x1D004, 4, 0)]);
        f.instr.write(&bad);
        f.instr.sync(SyncDirection::ToDevice);
        run.set_arg(2, bad.len());
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Error);
        assert!(matches!(
            run.last_error(),
            Some(RuntimeError::UnboundPatch { arg_idx: 4, kernel_arg: 7 })
        ));
    }

    #[test]
    fn test_oversized_op_count_fails_run() {
        let f = fixture(2);
        let header = [INSTR_MAGIC, 0, u32::MAX, 16];
        f.instr.write(&header);
        f.instr.sync(SyncDirection::ToDevice);

        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, header.len());
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Error);
        assert!(matches!(
            run.last_error(),
            Some(RuntimeError::Instr(InstrError::Truncated { offset: 16 }))
        ));
    }

    #[test]
    fn test_kernel_call_starts_run() {
        let f = fixture(1);
        f.a.write(&[41]);
        f.a.sync(SyncDirection::ToDevice);

        let mut run = f
            .kernel
            .call([
                KernelArg::from(3u32),
                KernelArg::from(&f.instr),
                KernelArg::from(0u32),
                KernelArg::from(&f.a),
                KernelArg::from(&f.c),
            ])
            .unwrap();
        assert_eq!(run.wait(), CommandState::Completed);
        f.c.sync(SyncDirection::FromDevice);
        assert_eq!(f.c.to_vec(), vec![42]);
    }

    #[test]
    fn test_trace_buffer_receives_markers() {
        let f = fixture(2);
        let dev = Device::open(0).unwrap();
        let trace = BufferObject::new(&dev, 16, BoFlags::HostOnly, 7).unwrap();

        let mut run = Run::new(&f.kernel);
        bind(&mut run, &f, 0);
        run.set_arg(7, &trace);
        run.start().unwrap();
        assert_eq!(run.wait(), CommandState::Completed);

        trace.sync(SyncDirection::FromDevice);
        assert_eq!(trace.to_vec(), vec![0xE000_0000, 0xE100_0001, 0, 0]);
    }

    #[test]
    fn test_wait_without_start() {
        let f = fixture(1);
        let mut run = Run::new(&f.kernel);
        assert_eq!(run.wait(), CommandState::New);
    }
}
