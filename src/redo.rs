//! Redo decoder: reconstructs a post-image from a pre-image and a
//! differential record, and the resource-manager glue consumed by recovery.

use thiserror::Error;

use crate::collab::{BufferManager, RedoAction, RedoReader};
use crate::page::BLCKSZ;
use crate::wire::{DecodeError, Instruction, InstructionReader};

/// The constant identify() string for the generic-xlog resource manager.
pub const RM_NAME: &str = "Generic";

/// The resource-manager id this crate registers its redo handler under.
/// Callers wire this into whatever resource-manager table their host WAL
/// framework keeps; there is only ever one generic-xlog record shape, so
/// this id and [`crate::transaction::XLOG_GENERIC`] are the only values
/// `WalWriter::insert` is ever called with.
pub const RM_ID: u8 = 20;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RedoError {
    #[error("differential record is malformed: {0}")]
    Malformed(#[from] DecodeError),
    #[error("instruction lengths sum to {got}, expected {expected}")]
    LengthMismatch { got: usize, expected: usize },
    #[error("move source {source} + length {length} extends past page bounds")]
    SourceOutOfRange { source: usize, length: usize },
}

/// Applies a differential record against `pre_image`, writing the
/// reconstructed post-image into `out`. Any malformedness — lengths that
/// extend past [`BLCKSZ`], a `Move` source out of range — is a fatal
/// corruption condition (spec §7 class 3): the caller is expected to
/// propagate this to the recovery framework rather than paper over it.
pub fn apply(out: &mut [u8; BLCKSZ], pre_image: &[u8; BLCKSZ], data: &[u8]) -> Result<(), RedoError> {
    let mut offset = 0usize;
    for instr in InstructionReader::new(data) {
        let instr = instr?;
        let length = instr.length() as usize;
        if offset + length > BLCKSZ {
            return Err(RedoError::LengthMismatch {
                got: offset + length,
                expected: BLCKSZ,
            });
        }
        match instr {
            Instruction::Copy(bytes) => {
                out[offset..offset + length].copy_from_slice(bytes);
            }
            Instruction::Move { length, source } => {
                let source = source as usize;
                let length = length as usize;
                if source + length > BLCKSZ {
                    return Err(RedoError::SourceOutOfRange { source, length });
                }
                out[offset..offset + length].copy_from_slice(&pre_image[source..source + length]);
            }
        }
        offset += length;
    }

    if offset != BLCKSZ {
        return Err(RedoError::LengthMismatch {
            got: offset,
            expected: BLCKSZ,
        });
    }

    Ok(())
}

/// The `redo` half of the `{redo, desc, identify}` resource-manager
/// registration triple (spec §6). Walks every block referenced by the
/// record, applying the differential stream (or accepting a full-page
/// restore) to bring each buffer up to the record's LSN.
#[tracing::instrument(skip(record, buffers))]
pub fn generic_redo<R, B>(record: &mut R, buffers: &mut B) -> Result<(), RedoError>
where
    R: RedoReader,
    B: BufferManager<Buffer = R::Buffer>,
{
    let lsn = record.end_rec_ptr();
    for block_id in 0..=record.max_block_id() {
        if !record.has_block_ref(block_id) {
            continue;
        }

        match record.read_buffer_for_redo(block_id) {
            RedoAction::Done => {
                tracing::trace!(block_id, "buffer already up to date, skipping");
            }
            RedoAction::Restored => {
                tracing::trace!(block_id, "buffer restored from full page image");
            }
            RedoAction::NeedsRedo(buf) => {
                tracing::debug!(block_id, "applying differential record");
                let pre_image = *buffers.page(buf);
                let block_data = record.block_data(block_id);
                let mut post_image = [0u8; BLCKSZ];
                apply(&mut post_image, &pre_image, block_data)?;
                *buffers.page_mut(buf) = post_image;
                buffers.set_lsn(buf, lsn);
                buffers.mark_dirty(buf);
            }
        }
    }

    Ok(())
}

/// The `desc` half of the resource-manager triple: generic-xlog records
/// carry no human-readable summary.
pub fn generic_desc(_record: &impl RedoReader) {}

/// The `identify` half of the resource-manager triple.
pub fn generic_identify(_info: u8) -> &'static str {
    RM_NAME
}
