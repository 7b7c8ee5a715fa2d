//! NPU instruction streams.
//!
//! The runtime sequence of a design is compiled to a flat list of
//! little-endian 32-bit words (`insts.bin`). The host copies it verbatim into
//! the instruction buffer object; the device decodes it on every run.

use std::io::{self, Cursor, Read};
use std::path::{Path, PathBuf};

use byteorder::{ByteOrder, LittleEndian, ReadBytesExt};
use thiserror::Error;

/// Magic word at the start of a transaction-format stream.
pub const INSTR_MAGIC: u32 = 0x0603_0100;

/// Size of the stream header in bytes.
const HEADER_BYTES: usize = 16;

/// Instruction stream errors.
#[derive(Debug, Error)]
pub enum InstrError {
    /// File could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Text sequence contained a line that is not a hex word.
    #[error("{path}:{line}: invalid instruction word '{text}'")]
    BadWord {
        /// File path.
        path: PathBuf,
        /// 1-based line number.
        line: usize,
        /// Offending text.
        text: String,
    },

    /// Fewer bytes than a header.
    #[error("instruction data too short ({0} bytes)")]
    TooShort(usize),

    /// Header magic mismatch.
    #[error("unknown instruction magic 0x{0:08X}")]
    BadMagic(u32),

    /// Header claims more bytes than are present.
    #[error("instruction size {size} exceeds data length {len}")]
    SizeOverflow {
        /// Size declared in the header.
        size: usize,
        /// Bytes available.
        len: usize,
    },

    /// An operation ran past the end of the data.
    #[error("truncated instruction at offset 0x{offset:X}")]
    Truncated {
        /// Byte offset of the operation.
        offset: usize,
    },
}

/// Load a binary instruction file as little-endian words.
///
/// A trailing partial word is ignored.
pub fn load_instr_binary(path: impl AsRef<Path>) -> Result<Vec<u32>, InstrError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| InstrError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut words = vec![0u32; bytes.len() / 4];
    LittleEndian::read_u32_into(&bytes[..words.len() * 4], &mut words);
    log::debug!("loaded {} instruction words from {}", words.len(), path.display());
    Ok(words)
}

/// Load a text instruction file, one hex word per line.
///
/// Blank lines are skipped. A `0x` prefix is optional.
pub fn load_instr_sequence(path: impl AsRef<Path>) -> Result<Vec<u32>, InstrError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| InstrError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut words = Vec::new();
    for (i, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let digits = line
            .strip_prefix("0x")
            .or_else(|| line.strip_prefix("0X"))
            .unwrap_or(line);
        let word = u32::from_str_radix(digits, 16).map_err(|_| InstrError::BadWord {
            path: path.to_path_buf(),
            line: i + 1,
            text: line.to_string(),
        })?;
        words.push(word);
    }
    Ok(words)
}

/// NPU instruction opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NpuOpcode {
    Write32,
    BlockWrite,
    MaskWrite,
    MaskPoll,
    /// Transaction control token (sync).
    Tct,
    DdrPatch,
    Unknown,
}

impl From<u8> for NpuOpcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::Write32,
            1 => Self::BlockWrite,
            3 => Self::MaskWrite,
            4 => Self::MaskPoll,
            128 => Self::Tct,
            129 => Self::DdrPatch,
            _ => Self::Unknown,
        }
    }
}

/// A decoded NPU instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NpuInstruction {
    /// Write one register.
    Write32 { reg_off: u32, value: u32 },
    /// Write consecutive registers.
    BlockWrite { reg_off: u32, values: Vec<u32> },
    /// Read-modify-write of the bits in `mask`.
    MaskWrite { reg_off: u32, value: u32, mask: u32 },
    /// Wait until `(reg & mask) == value`.
    MaskPoll { reg_off: u32, value: u32, mask: u32 },
    /// Patch a buffer descriptor with the address of runtime argument `arg_idx`.
    DdrPatch { reg_addr: u32, arg_idx: u8, arg_plus: u32 },
    /// Wait for a DMA channel to finish.
    Sync { channel: u8, column: u8, direction: u8, column_num: u8, row: u8, row_num: u8 },
    /// Anything else, kept raw.
    Unknown { opcode: u8, data: Vec<u8> },
}

/// Fail with `UnexpectedEof` unless `len` bytes are left after the cursor.
fn ensure_remaining(cursor: &Cursor<&[u8]>, len: usize) -> io::Result<usize> {
    let remaining = cursor.get_ref().len().saturating_sub(cursor.position() as usize);
    if len > remaining {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("operation declares {} bytes, {} left", len, remaining),
        ));
    }
    Ok(len)
}

/// A parsed instruction stream.
#[derive(Debug, Clone, Default)]
pub struct NpuInstructionStream {
    instructions: Vec<NpuInstruction>,
}

impl NpuInstructionStream {
    /// Parse from raw bytes.
    ///
    /// Header layout: magic, flags, operation count, total size in bytes.
    pub fn parse(data: &[u8]) -> Result<Self, InstrError> {
        if data.len() < HEADER_BYTES {
            return Err(InstrError::TooShort(data.len()));
        }

        let magic = LittleEndian::read_u32(&data[0..4]);
        let num_ops = LittleEndian::read_u32(&data[8..12]);
        let total_size = LittleEndian::read_u32(&data[12..16]) as usize;

        if magic != INSTR_MAGIC {
            return Err(InstrError::BadMagic(magic));
        }
        if total_size > data.len() {
            return Err(InstrError::SizeOverflow { size: total_size, len: data.len() });
        }

        let mut cursor = Cursor::new(data);
        cursor.set_position(HEADER_BYTES as u64);

        // every op is at least 8 bytes, so the data bounds the op count
        let max_ops = (data.len() - HEADER_BYTES) / 8;
        let mut instructions = Vec::with_capacity((num_ops as usize).min(max_ops));
        for i in 0..num_ops {
            let offset = cursor.position() as usize;
            if offset >= data.len() {
                log::warn!("instruction stream ends after {} of {} ops", i, num_ops);
                return Err(InstrError::Truncated { offset });
            }
            let instr = Self::parse_instruction(&mut cursor)
                .map_err(|_| InstrError::Truncated { offset })?;
            log::trace!("op {} @0x{:X}: {:?}", i, offset, instr);
            instructions.push(instr);
        }

        Ok(Self { instructions })
    }

    /// Parse from words as stored in an instruction buffer.
    pub fn from_words(words: &[u32]) -> Result<Self, InstrError> {
        let mut bytes = vec![0u8; words.len() * 4];
        LittleEndian::write_u32_into(words, &mut bytes);
        Self::parse(&bytes)
    }

    /// Standard ops (< 128): 8-byte header then fixed fields.
    /// Custom ops (>= 128): 4-byte header, 4-byte size, payload.
    fn parse_instruction(cursor: &mut Cursor<&[u8]>) -> io::Result<NpuInstruction> {
        let opcode_byte = cursor.read_u8()?;
        let _pad = cursor.read_u24::<LittleEndian>()?;
        let opcode = NpuOpcode::from(opcode_byte);

        if opcode_byte >= 128 {
            let size = cursor.read_u32::<LittleEndian>()?;
            let payload_len = ensure_remaining(cursor, size.saturating_sub(8) as usize)?;
            let mut payload = vec![0u8; payload_len];
            cursor.read_exact(&mut payload)?;
            let word = |idx: usize| {
                payload
                    .get(idx * 4..idx * 4 + 4)
                    .map(LittleEndian::read_u32)
                    .unwrap_or(0)
            };

            return Ok(match opcode {
                NpuOpcode::Tct => {
                    let (w2, w3) = (word(0), word(1));
                    NpuInstruction::Sync {
                        direction: w2 as u8,
                        row: (w2 >> 8) as u8,
                        column: (w2 >> 16) as u8,
                        row_num: (w3 >> 8) as u8,
                        column_num: (w3 >> 16) as u8,
                        channel: (w3 >> 24) as u8,
                    }
                }
                // words 6, 8 and 10 of the full op; payload starts at word 2
                NpuOpcode::DdrPatch => NpuInstruction::DdrPatch {
                    reg_addr: word(4),
                    arg_idx: word(6) as u8,
                    arg_plus: word(8),
                },
                _ => NpuInstruction::Unknown { opcode: opcode_byte, data: payload },
            });
        }

        let _pad = cursor.read_u32::<LittleEndian>()?;
        Ok(match opcode {
            NpuOpcode::Write32 => {
                let reg_off = cursor.read_u64::<LittleEndian>()? as u32;
                let value = cursor.read_u32::<LittleEndian>()?;
                let _size = cursor.read_u32::<LittleEndian>()?;
                NpuInstruction::Write32 { reg_off, value }
            }
            NpuOpcode::BlockWrite => {
                let reg_off = cursor.read_u32::<LittleEndian>()?;
                let size = cursor.read_u32::<LittleEndian>()?;
                let count = ensure_remaining(cursor, size.saturating_sub(16) as usize)? / 4;
                let mut values = vec![0u32; count];
                cursor.read_u32_into::<LittleEndian>(&mut values)?;
                NpuInstruction::BlockWrite { reg_off, values }
            }
            NpuOpcode::MaskWrite | NpuOpcode::MaskPoll => {
                let reg_off = cursor.read_u64::<LittleEndian>()? as u32;
                let value = cursor.read_u32::<LittleEndian>()?;
                let mask = cursor.read_u32::<LittleEndian>()?;
                let _size = cursor.read_u32::<LittleEndian>()?;
                if opcode == NpuOpcode::MaskWrite {
                    NpuInstruction::MaskWrite { reg_off, value, mask }
                } else {
                    NpuInstruction::MaskPoll { reg_off, value, mask }
                }
            }
            _ => {
                let mut data = vec![0u8; 8];
                cursor.read_exact(&mut data)?;
                NpuInstruction::Unknown { opcode: opcode_byte, data }
            }
        })
    }

    /// Decoded instructions in stream order.
    pub fn instructions(&self) -> &[NpuInstruction] {
        &self.instructions
    }

    /// Runtime-sequence arguments the stream patches addresses for.
    pub fn patched_args(&self) -> impl Iterator<Item = u8> + '_ {
        self.instructions.iter().filter_map(|i| match i {
            NpuInstruction::DdrPatch { arg_idx, .. } => Some(*arg_idx),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }
}


#[cfg(test)]
mod tests {
    use super::asm::*;
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_empty() {
        assert!(matches!(NpuInstructionStream::parse(&[]), Err(InstrError::TooShort(0))));
    }

    #[test]
    fn test_bad_magic() {
        let words = [0xDEAD_BEEF, 0, 0, 16];
        assert!(matches!(
            NpuInstructionStream::from_words(&words),
            Err(InstrError::BadMagic(0xDEAD_BEEF))
        ));
    }

    #[test]
    fn test_opcode_from_u8() {
        assert_eq!(NpuOpcode::from(0), NpuOpcode::Write32);
        assert_eq!(NpuOpcode::from(1), NpuOpcode::BlockWrite);
        assert_eq!(NpuOpcode::from(3), NpuOpcode::MaskWrite);
        assert_eq!(NpuOpcode::from(128), NpuOpcode::Tct);
        assert_eq!(NpuOpcode::from(129), NpuOpcode::DdrPatch);
        assert_eq!(NpuOpcode::from(200), NpuOpcode::Unknown);
    }

    #[test]
    fn test_parse_runtime_sequence() {
        let words = stream(&[
            write32(0x0001_D004, 0x8000_0000),
            ddr_patch(0x0001_D004, 0, 0),
            ddr_patch(0x0001_D024, 2, 64),
            sync(0, 0, 0, 1),
            mask_poll(0x0001_D220, 0, 0x1),
        ]);

        let stream = NpuInstructionStream::from_words(&words).unwrap();
        assert_eq!(stream.len(), 5);
        assert_eq!(
            stream.instructions()[0],
            NpuInstruction::Write32 { reg_off: 0x0001_D004, value: 0x8000_0000 }
        );
        assert_eq!(
            stream.instructions()[2],
            NpuInstruction::DdrPatch { reg_addr: 0x0001_D024, arg_idx: 2, arg_plus: 64 }
        );
        assert!(matches!(stream.instructions()[3], NpuInstruction::Sync { channel: 1, .. }));
        assert_eq!(stream.patched_args().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_truncated_op() {
        let mut words = stream(&[write32(0x10, 1)]);
        words.truncate(words.len() - 2);
        words[3] = (words.len() * 4) as u32;
        assert!(matches!(
            NpuInstructionStream::from_words(&words),
            Err(InstrError::Truncated { offset: 16 })
        ));
    }

    #[test]
    fn test_op_count_larger_than_data() {
        let words = [INSTR_MAGIC, 0, u32::MAX, 16];
        assert!(matches!(
            NpuInstructionStream::from_words(&words),
            Err(InstrError::Truncated { offset: 16 })
        ));
    }

    #[test]
    fn test_op_size_larger_than_data() {
        // DdrPatch declaring a 4 GiB payload
        let mut words = stream(&[ddr_patch(0x1D004, 0, 0)]);
        words[5] = u32::MAX;
        assert!(matches!(
            NpuInstructionStream::from_words(&words),
            Err(InstrError::Truncated { offset: 16 })
        ));

        let block = stream(&[vec![1, 0, 0x1D000, u32::MAX, 7]]);
        assert!(matches!(
            NpuInstructionStream::from_words(&block),
            Err(InstrError::Truncated { offset: 16 })
        ));
    }

    #[test]
    fn test_load_instr_binary() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[0x00, 0x01, 0x03, 0x06, 0xAA, 0xBB, 0xCC, 0xDD, 0xFF]).unwrap();

        let words = load_instr_binary(file.path()).unwrap();
        assert_eq!(words, vec![INSTR_MAGIC, 0xDDCC_BBAA]);
    }

    #[test]
    fn test_load_instr_sequence() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "06030100").unwrap();
        writeln!(file).unwrap();
        writeln!(file, "0x0000001f").unwrap();

        let words = load_instr_sequence(file.path()).unwrap();
        assert_eq!(words, vec![INSTR_MAGIC, 0x1F]);
    }

    #[test]
    fn test_load_instr_sequence_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "06030100").unwrap();
        writeln!(file, "not-hex").unwrap();

        let err = load_instr_sequence(file.path()).unwrap_err();
        assert!(matches!(err, InstrError::BadWord { line: 2, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_instr_binary("/nonexistent/insts.bin").unwrap_err();
        assert!(matches!(err, InstrError::Io { .. }));
    }
}
