//! On-wire instruction format for differential records.
//!
//! Each instruction is a 2-byte little-endian `length` field (high bit
//! [`MOVE_FLAG`] selects `Move` vs `Copy`, low 15 bits [`LENGTH_MASK`] give
//! the byte length) followed by a payload: literal bytes for `Copy`, a
//! 2-byte little-endian `source` offset for `Move`. Instructions are applied
//! back to back against an implicit cursor starting at 0; the lengths of all
//! instructions in one page's stream sum to [`crate::page::BLCKSZ`].

use zerocopy::byteorder::little_endian::U16;
use zerocopy::AsBytes;

/// Distinguishes a `Move` instruction from a `Copy` instruction in the
/// 2-byte length field.
pub const MOVE_FLAG: u16 = 0x8000;
/// Mask for the length bits once [`MOVE_FLAG`] is stripped.
pub const LENGTH_MASK: u16 = 0x7FFF;

#[repr(C)]
#[derive(Debug, Clone, Copy, AsBytes, zerocopy::FromBytes, zerocopy::FromZeroes)]
struct RawLength(U16);

/// A decoded instruction from a differential record stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction<'a> {
    Copy(&'a [u8]),
    Move { length: u16, source: u16 },
}

impl<'a> Instruction<'a> {
    pub fn length(&self) -> u16 {
        match self {
            Instruction::Copy(bytes) => bytes.len() as u16,
            Instruction::Move { length, .. } => *length,
        }
    }
}

/// Appends a `Copy(len, bytes)` instruction to `out`.
pub fn write_copy(out: &mut Vec<u8>, bytes: &[u8]) {
    debug_assert!(bytes.len() as u32 <= LENGTH_MASK as u32);
    let len = RawLength(U16::new(bytes.len() as u16));
    out.extend_from_slice(len.as_bytes());
    out.extend_from_slice(bytes);
}

/// Appends a `Move(len, source)` instruction to `out`.
pub fn write_move(out: &mut Vec<u8>, length: u16, source: u16) {
    debug_assert!(length as u32 <= LENGTH_MASK as u32);
    let tagged = RawLength(U16::new(length | MOVE_FLAG));
    out.extend_from_slice(tagged.as_bytes());
    let source = RawLength(U16::new(source));
    out.extend_from_slice(source.as_bytes());
}

/// Error produced when a differential record stream is malformed. Any
/// occurrence is a corruption condition fatal to the recovering process
/// (spec §7 class 3).
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("instruction header truncated")]
    TruncatedHeader,
    #[error("move source field truncated")]
    TruncatedMoveSource,
    #[error("copy payload truncated")]
    TruncatedCopyPayload,
}

/// Iterates the instructions of one page's differential record.
pub struct InstructionReader<'a> {
    data: &'a [u8],
}

impl<'a> InstructionReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }
}

impl<'a> Iterator for InstructionReader<'a> {
    type Item = Result<Instruction<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.data.is_empty() {
            return None;
        }
        if self.data.len() < 2 {
            self.data = &[];
            return Some(Err(DecodeError::TruncatedHeader));
        }
        let raw = u16::from_le_bytes([self.data[0], self.data[1]]);
        self.data = &self.data[2..];

        if raw & MOVE_FLAG != 0 {
            let length = raw & LENGTH_MASK;
            if self.data.len() < 2 {
                self.data = &[];
                return Some(Err(DecodeError::TruncatedMoveSource));
            }
            let source = u16::from_le_bytes([self.data[0], self.data[1]]);
            self.data = &self.data[2..];
            Some(Ok(Instruction::Move { length, source }))
        } else {
            let length = raw as usize;
            if self.data.len() < length {
                self.data = &[];
                return Some(Err(DecodeError::TruncatedCopyPayload));
            }
            let (bytes, rest) = self.data.split_at(length);
            self.data = rest;
            Some(Ok(Instruction::Copy(bytes)))
        }
    }
}
