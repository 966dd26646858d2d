//! Contracts for the external collaborators this crate treats as fixed
//! services (spec §6): the buffer manager, the WAL writer, and the redo
//! reader. The real implementations of these live in the host storage
//! engine; this crate only needs the seams.

use crate::page::BLCKSZ;

/// Monotonic log sequence number. `0` is the invalid/unset value, matching
/// Postgres's `InvalidXLogRecPtr`.
pub type Lsn = u64;

pub const INVALID_LSN: Lsn = 0;

/// The buffer-manager surface the controller needs at commit time: reading
/// and writing a buffer's page, querying its identity, and stamping the
/// post-commit LSN. Locking and pinning are the caller's responsibility
/// (spec §5) — by the time any of these methods run, the caller must hold
/// an exclusive lock on `buf`.
pub trait BufferManager {
    type Buffer: Copy + Eq;

    fn is_invalid(&self, buf: Self::Buffer) -> bool;
    fn block_number(&self, buf: Self::Buffer) -> u64;
    fn page(&self, buf: Self::Buffer) -> &[u8; BLCKSZ];
    fn page_mut(&mut self, buf: Self::Buffer) -> &mut [u8; BLCKSZ];
    fn mark_dirty(&mut self, buf: Self::Buffer);
    fn set_lsn(&mut self, buf: Self::Buffer, lsn: Lsn);
}

/// The WAL-insertion surface consumed by [`crate::transaction::GenericXlog::finish`].
pub trait WalWriter {
    fn begin_insert(&mut self);
    /// Registers block `block_id` with the record being built. `force_image`
    /// corresponds to the `REGBUF_FORCE_IMAGE` flag; otherwise the block is
    /// registered `REGBUF_STANDARD` and its differential data is attached
    /// separately via [`Self::register_buf_data`].
    fn register_buffer(&mut self, block_id: u8, force_image: bool);
    fn register_buf_data(&mut self, block_id: u8, data: &[u8]);
    /// Inserts the accumulated record and returns its LSN.
    fn insert(&mut self, rmid: u8, info: u8) -> Lsn;
}

/// Outcome of asking the redo framework to resolve one block reference, per
/// spec §6's `XLogReadBufferForRedo`.
pub enum RedoAction<Buf> {
    /// The buffer is already at or past the record's LSN; nothing to do.
    Done,
    /// The buffer was restored verbatim from a full-page image.
    Restored,
    /// The buffer holds the pre-image and needs the differential record
    /// applied.
    NeedsRedo(Buf),
}

/// The redo-side surface consumed by [`crate::redo::generic_redo`].
pub trait RedoReader {
    type Buffer: Copy;

    fn max_block_id(&self) -> u8;
    fn has_block_ref(&self, block_id: u8) -> bool;
    fn read_buffer_for_redo(&mut self, block_id: u8) -> RedoAction<Self::Buffer>;
    fn block_data(&self, block_id: u8) -> &[u8];
    fn restore_block_image(&self, block_id: u8, out: &mut [u8; BLCKSZ]);
    fn end_rec_ptr(&self) -> Lsn;
}

/// Marks the scoped window around the commit protocol's critical section
/// (spec §4.4, §5): no allocation, no I/O-bound calls while one is held.
/// Rust has no portable way to enforce that statically, so this is a
/// documented marker rather than an enforced one — callers are expected to
/// keep the scope bounded to the buffer swap, WAL insert, and dirty-mark
/// steps only.
pub struct CriticalSection;

impl CriticalSection {
    #[tracing::instrument(skip_all)]
    pub fn enter() -> Self {
        tracing::trace!("entering critical section");
        CriticalSection
    }
}

impl Drop for CriticalSection {
    fn drop(&mut self) {
        tracing::trace!("leaving critical section");
    }
}
