//! Emulated XRT host runtime.
//!
//! Mirrors the slice of the XRT API the kernel tests use, backed by an
//! in-process device instead of the NPU driver:
//!
//! ```text
//!  host thread                         emulated device
//!  ───────────                         ───────────────
//!  BufferObject::map_mut()  ──sync(ToDevice)──►  device view
//!  Run::start()             ──────────────────►  worker: Design::execute()
//!  Run::wait()              ◄──────────────────  CommandState
//!  BufferObject::map()      ◄─sync(FromDevice)─  device view
//! ```
//!
//! The kernel only ever sees device views and the host only ever sees host
//! views, so skipping a `sync` is observable as stale data.
//!
//! # Example
//!
//! ```
//! use aie_kernel_tests::runtime::{BoFlags, BufferObject, Design, Device, KernelArg, SyncDirection, CommandState};
//!
//! let mut device = Device::open(0)?;
//! let kernel = device.load_kernel(None, "MLIR_AIE", Design::VectorPlusOne { len: 4 })?;
//!
//! let instr = BufferObject::new(&device, 4, BoFlags::Cacheable, kernel.group_id(1)?)?;
//! let a = BufferObject::new(&device, 16, BoFlags::HostOnly, kernel.group_id(3)?)?;
//! let c = BufferObject::new(&device, 16, BoFlags::HostOnly, kernel.group_id(4)?)?;
//!
//! a.map_mut().copy_from_slice(&[1, 2, 3, 4]);
//! a.sync(SyncDirection::ToDevice);
//!
//! let mut run = kernel.call([
//!     KernelArg::from(3u32),
//!     KernelArg::from(&instr),
//!     KernelArg::from(0u32),
//!     KernelArg::from(&a),
//!     KernelArg::from(&c),
//! ])?;
//! assert_eq!(run.wait(), CommandState::Completed);
//!
//! c.sync(SyncDirection::FromDevice);
//! assert_eq!(&*c.map(), &[2, 3, 4, 5]);
//! # Ok::<(), aie_kernel_tests::runtime::RuntimeError>(())
//! ```

pub mod bo;
pub mod design;
pub mod device;
pub mod instr;
pub mod run;
pub mod xclbin;

pub use bo::{BoFlags, BufferObject, SyncDirection, MAX_BO_BYTES};
pub use design::{Design, TraceRecorder, LOCAL_EVEN_FILL, LOCAL_ODD_FILL};
pub use device::{Device, Kernel};
pub use instr::{load_instr_binary, load_instr_sequence, InstrError, NpuInstruction, NpuInstructionStream};
pub use run::{CommandState, KernelArg, Run};
pub use xclbin::Xclbin;

use thiserror::Error;

/// Kernel argument carrying the opcode.
pub const ARG_OPCODE: usize = 0;
/// Kernel argument carrying the instruction buffer.
pub const ARG_INSTR: usize = 1;
/// Kernel argument carrying the instruction word count.
pub const ARG_INSTR_COUNT: usize = 2;
/// First kernel argument that maps to a runtime-sequence buffer.
pub const FIRST_BUFFER_ARG: usize = 3;

/// Opcode the NPU firmware expects for a transaction-style instruction stream.
pub const OPCODE_TRANSACTION: u64 = 3;

/// Errors raised by the emulated runtime.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// No emulated device at this index.
    #[error("no device at index {0}")]
    DeviceNotFound(u32),

    /// Kernel name did not match any kernel in the xclbin.
    #[error("kernel '{name}' not found in xclbin (available: {available:?})")]
    KernelNotFound {
        /// Requested name prefix.
        name: String,
        /// Kernels the xclbin declares.
        available: Vec<String>,
    },

    /// Buffer objects must hold at least one byte.
    #[error("buffer object size must be non-zero")]
    ZeroSizedBuffer,

    /// Requested size is beyond what the emulator will allocate.
    #[error("buffer object of {bytes} bytes exceeds the {max} byte limit")]
    BufferTooLarge {
        /// Requested size.
        bytes: usize,
        /// Largest accepted size.
        max: usize,
    },

    /// Argument is not backed by a buffer in this design.
    #[error("argument {arg} of '{kernel}' is not a buffer argument")]
    NotABufferArg {
        /// Kernel name.
        kernel: String,
        /// Argument index.
        arg: usize,
    },

    /// Argument was not bound before start.
    #[error("argument {0} is not set")]
    MissingArg(usize),

    /// Argument was bound with the wrong kind (scalar vs buffer).
    #[error("argument {arg} expects a {expected}")]
    ArgKind {
        /// Argument index.
        arg: usize,
        /// "scalar" or "buffer".
        expected: &'static str,
    },

    /// Buffer is smaller than the design needs.
    #[error("argument {arg} holds {have} words, design needs {needed}")]
    BufferTooSmall {
        /// Argument index.
        arg: usize,
        /// Words required.
        needed: usize,
        /// Words available.
        have: usize,
    },

    /// Opcode argument was not the transaction opcode.
    #[error("unsupported opcode {0}")]
    UnsupportedOpcode(u64),

    /// Instruction stream references a runtime-sequence argument that is not bound.
    #[error("instruction stream patches runtime argument {arg_idx} (kernel arg {kernel_arg}) which is not a bound buffer")]
    UnboundPatch {
        /// Runtime-sequence argument index.
        arg_idx: u8,
        /// Corresponding kernel argument.
        kernel_arg: usize,
    },

    /// Instruction stream could not be decoded.
    #[error("instruction stream: {0}")]
    Instr(#[from] InstrError),

    /// `start()` called on a run that has not been waited on.
    #[error("run is already in flight")]
    RunInFlight,

    /// Worker thread could not be spawned.
    #[error("failed to spawn device worker: {0}")]
    Spawn(#[source] std::io::Error),

    /// Kernel body panicked on the worker.
    #[error("kernel '{0}' panicked")]
    KernelPanicked(String),
}
