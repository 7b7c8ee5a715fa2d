//! Emulated AIE array designs.
//!
//! A design fixes how kernel arguments map onto the compute-tile program:
//! which buffers are read, which are written, and where the trace goes. The
//! argument layout follows the runtime sequence of each design, offset by the
//! three leading XRT arguments (opcode, instructions, instruction count).

use std::collections::BTreeMap;

use crate::kernels::{self, bracket, EventHook};

use super::bo::BufferObject;
use super::RuntimeError;

/// Event-marker tag written to the trace buffer.
const TRACE_TAG: u32 = 0xE000_0000;

/// Initial value of the tile-local even buffer in [`Design::LocalMem`].
pub const LOCAL_EVEN_FILL: i32 = -1;
/// Initial value of the tile-local odd buffer in [`Design::LocalMem`].
pub const LOCAL_ODD_FILL: i32 = -2;

/// The program loaded onto the AIE array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Design {
    /// One compute tile running `odd_even` over `len` elements.
    ///
    /// Arg 4 receives the kernel's `odd` output, which holds the values with
    /// an even remainder; arg 5 receives `even`. Arg 6 is the control-packet
    /// slot and arg 7 the trace.
    OddEven { len: usize },

    /// One compute tile running `vector_plus_one` over `len` elements.
    VectorPlusOne { len: usize },

    /// Two tiles placed back to back, each running `vector_plus_one` on
    /// `chunk`-element tiles streamed through an object FIFO.
    PlacedPipeline { len: usize, chunk: usize },

    /// One compute tile running the nested-loop join over `len` elements.
    Join { len: usize },

    /// Odd/even split done in the core body into two tile-local buffers,
    /// then streamed out slot by slot.
    ///
    /// The tile buffers start out filled with [`LOCAL_EVEN_FILL`] and
    /// [`LOCAL_ODD_FILL`] on every run. Arg 4 receives the odd buffer and
    /// arg 5 the even buffer. There is no trace.
    LocalMem { len: usize },
}

impl Design {
    /// Short name used in logs and CLI output.
    pub fn name(&self) -> &'static str {
        match self {
            Design::OddEven { .. } => "odd_even",
            Design::VectorPlusOne { .. } => "vector_plus_one",
            Design::PlacedPipeline { .. } => "placed_pipeline",
            Design::Join { .. } => "join",
            Design::LocalMem { .. } => "local_mem",
        }
    }

    /// Buffer arguments the kernel reads.
    pub fn inputs(&self) -> &'static [usize] {
        match self {
            Design::Join { .. } => &[3, 4],
            _ => &[3],
        }
    }

    /// Buffer arguments the kernel writes.
    pub fn outputs(&self) -> &'static [usize] {
        match self {
            Design::OddEven { .. } => &[4, 5],
            Design::VectorPlusOne { .. } | Design::PlacedPipeline { .. } => &[4],
            Design::Join { .. } => &[5, 6],
            Design::LocalMem { .. } => &[4, 5],
        }
    }

    /// Buffer arguments the design declares but never touches.
    pub fn placeholders(&self) -> &'static [usize] {
        match self {
            Design::OddEven { .. } => &[6],
            Design::VectorPlusOne { .. } | Design::PlacedPipeline { .. } => &[5],
            Design::Join { .. } | Design::LocalMem { .. } => &[],
        }
    }

    /// Trace buffer argument, if the design routes one.
    pub fn trace_arg(&self) -> Option<usize> {
        match self {
            Design::Join { .. } | Design::LocalMem { .. } => None,
            _ => Some(7),
        }
    }

    /// Whether `arg` is backed by a buffer object.
    pub fn is_buffer_arg(&self, arg: usize) -> bool {
        arg == super::ARG_INSTR
            || self.inputs().contains(&arg)
            || self.outputs().contains(&arg)
            || self.placeholders().contains(&arg)
            || self.trace_arg() == Some(arg)
    }

    /// Number of elements the kernel processes.
    pub fn len(&self) -> usize {
        match *self {
            Design::OddEven { len }
            | Design::VectorPlusOne { len }
            | Design::PlacedPipeline { len, .. }
            | Design::Join { len }
            | Design::LocalMem { len } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Words a data argument must hold.
    pub fn words_for(&self, arg: usize) -> usize {
        match self {
            Design::Join { len } if self.outputs().contains(&arg) => len.saturating_mul(*len),
            _ => self.len(),
        }
    }

    /// Run the design against the device views of `buffers`.
    ///
    /// Outputs are read back first so slots the kernel does not write keep
    /// whatever the host synced.
    pub(crate) fn execute(
        &self,
        buffers: &BTreeMap<usize, BufferObject>,
        events: &mut dyn EventHook,
    ) -> Result<(), RuntimeError> {
        let fetch = |arg: usize| -> Result<Vec<i32>, RuntimeError> {
            let bo = buffers.get(&arg).ok_or(RuntimeError::MissingArg(arg))?;
            let view = bo.device_view();
            let needed = self.words_for(arg);
            if view.len() < needed {
                return Err(RuntimeError::BufferTooSmall { arg, needed, have: view.len() });
            }
            Ok(view[..needed].iter().map(|&w| w as i32).collect())
        };
        let store = |arg: usize, data: &[i32]| {
            if let Some(bo) = buffers.get(&arg) {
                let mut view = bo.device_view();
                for (slot, &v) in view.iter_mut().zip(data) {
                    *slot = v as u32;
                }
            }
        };

        let n = i32::try_from(self.len()).unwrap_or(i32::MAX);

        match *self {
            Design::OddEven { .. } => {
                let input = fetch(3)?;
                let mut odd = fetch(4)?;
                let mut even = fetch(5)?;
                let counts = bracket(events, || kernels::odd_even(&input, &mut odd, &mut even, n));
                log::debug!("odd_even: {} to odd, {} to even", counts.odd, counts.even);
                store(4, &odd);
                store(5, &even);
            }
            Design::VectorPlusOne { .. } => {
                let a = fetch(3)?;
                let mut c = fetch(4)?;
                bracket(events, || kernels::vector_plus_one(&a, &mut c, n));
                store(4, &c);
            }
            Design::PlacedPipeline { chunk, .. } => {
                let input = fetch(3)?;
                let mut output = fetch(4)?;
                let chunk = chunk.max(1);
                let mut mid = vec![0i32; chunk];
                for (tile_in, tile_out) in input.chunks(chunk).zip(output.chunks_mut(chunk)) {
                    let m = tile_in.len() as i32;
                    bracket(events, || kernels::vector_plus_one(tile_in, &mut mid, m));
                    bracket(events, || kernels::vector_plus_one(&mid, tile_out, m));
                }
                store(4, &output);
            }
            Design::Join { .. } => {
                let input = fetch(3)?;
                let input1 = fetch(4)?;
                let mut index = fetch(5)?;
                let mut value = fetch(6)?;
                let count = bracket(events, || kernels::join(&input, &input1, &mut index, &mut value, n));
                log::debug!("join: {} pairs", count);
                store(5, &index);
                store(6, &value);
            }
            Design::LocalMem { len } => {
                let input = fetch(3)?;
                for arg in [4, 5] {
                    let have = buffers.get(&arg).ok_or(RuntimeError::MissingArg(arg))?.words();
                    if have < len {
                        return Err(RuntimeError::BufferTooSmall { arg, needed: len, have });
                    }
                }
                let mut even = vec![LOCAL_EVEN_FILL; len];
                let mut odd = vec![LOCAL_ODD_FILL; len];
                let counts = bracket(events, || kernels::odd_even_indexed(&input, &mut even, &mut odd, n));
                log::debug!("local_mem: {} even, {} odd", counts.even, counts.odd);
                store(4, &odd);
                store(5, &even);
            }
        }

        Ok(())
    }
}

/// Collects event markers for the trace buffer.
///
/// Each marker is one word: `0xE000_0000 | event << 24 | sequence`. Markers
/// past the buffer capacity are dropped.
#[derive(Debug, Clone)]
pub struct TraceRecorder {
    capacity: usize,
    words: Vec<u32>,
    seq: u32,
}

impl TraceRecorder {
    /// Recorder that holds at most `capacity` words.
    pub fn new(capacity: usize) -> Self {
        Self { capacity, words: Vec::new(), seq: 0 }
    }

    fn record(&mut self, event: u32) {
        if self.words.len() < self.capacity {
            self.words.push(TRACE_TAG | (event << 24) | (self.seq & 0x00FF_FFFF));
        }
        self.seq = self.seq.wrapping_add(1);
    }

    /// Recorded words, oldest first.
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// Write the recorded words to the start of `bo`'s device view.
    pub(crate) fn flush(&self, bo: &BufferObject) {
        let mut view = bo.device_view();
        let n = self.words.len().min(view.len());
        view[..n].copy_from_slice(&self.words[..n]);
    }
}

impl EventHook for TraceRecorder {
    fn event0(&mut self) {
        self.record(0);
    }

    fn event1(&mut self) {
        self.record(1);
    }
}
