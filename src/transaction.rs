//! Transaction controller: the `Start -> Register* -> Finish|Abort` state
//! machine that owns the fixed-capacity slot table of pages being modified
//! together in one generic-xlog transaction.

use crate::collab::{BufferManager, CriticalSection, WalWriter, INVALID_LSN, Lsn};
use crate::error::Error;
use crate::page::{PageBuf, BLCKSZ};
use crate::region::MoveOutcome;
use crate::slot::Slot;

/// Maximum number of pages one transaction can register, per spec. Indices
/// into the slot table double as the block-ids addressed inside the WAL
/// record.
pub const MAX_GENERIC_XLOG_PAGES: usize = 3;

/// The `info` byte generic-xlog records carry; there is only one record
/// shape, so this is always the same constant.
pub const XLOG_GENERIC: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    NotStarted,
    Logged,
    Unlogged,
}

/// Owns one in-flight generic-xlog transaction. There is one of these per
/// logical execution context; it is not meant to be shared across
/// concurrent callers (spec §5).
pub struct GenericXlog<B: BufferManager> {
    mode: Mode,
    slots: Vec<Option<Slot<B::Buffer>>>,
}

impl<B: BufferManager> Default for GenericXlog<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: BufferManager> GenericXlog<B> {
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_GENERIC_XLOG_PAGES);
        slots.resize_with(MAX_GENERIC_XLOG_PAGES, || None);
        Self {
            mode: Mode::NotStarted,
            slots,
        }
    }

    /// Begins a transaction. `logged` selects the `Logged` vs `Unlogged`
    /// mode (spec §4.1); it is the caller's job to know whether the
    /// relation being modified is WAL-logged.
    #[tracing::instrument(skip(self))]
    pub fn start(&mut self, logged: bool) -> Result<(), Error> {
        if self.mode != Mode::NotStarted {
            return Err(Error::AlreadyStarted);
        }
        for slot in &mut self.slots {
            *slot = None;
        }
        self.mode = if logged { Mode::Logged } else { Mode::Unlogged };
        tracing::trace!(logged, "transaction started");
        Ok(())
    }

    fn require_started(&self) -> Result<(), Error> {
        if self.mode == Mode::NotStarted {
            return Err(Error::NotStarted);
        }
        Ok(())
    }

    /// Registers `buf` with the transaction, returning a writable working
    /// image the caller mutates directly (routing moves through
    /// [`Self::memmove`]).
    #[tracing::instrument(skip(self, buffers))]
    pub fn register(&mut self, buffers: &B, buf: B::Buffer, is_new: bool) -> Result<&mut [u8; BLCKSZ], Error> {
        self.require_started()?;
        if self.slots.iter().flatten().any(|s| s.buffer == buf) {
            return Err(Error::DuplicateBuffer);
        }
        let index = self
            .slots
            .iter()
            .position(|s| s.is_none())
            .ok_or(Error::NoFreeSlots)?;

        let image = PageBuf::from_bytes(buffers.page(buf));
        self.slots[index] = Some(Slot::new(buf, image, is_new));
        tracing::trace!(index, is_new, "buffer registered");
        Ok(&mut *self.slots[index].as_mut().unwrap().image)
    }

    fn find_slot_mut(&mut self, buf: B::Buffer) -> Option<&mut Slot<B::Buffer>> {
        self.slots.iter_mut().flatten().find(|s| s.buffer == buf)
    }

    /// Records an in-page relocation on `buf`'s working image, keeping the
    /// region map consistent (spec §4.2). `dst`, `src`, and `len` must lie
    /// within the page; the caller is responsible for actually moving the
    /// bytes in the image it holds from [`Self::register`] — this only
    /// updates the bookkeeping.
    #[tracing::instrument(skip(self))]
    pub fn memmove(&mut self, buf: B::Buffer, dst: usize, src: usize, len: usize) -> Result<(), Error> {
        self.require_started()?;
        if dst.checked_add(len).map_or(true, |e| e > BLCKSZ) {
            return Err(Error::OutOfRange { offset: dst, length: len });
        }
        if src.checked_add(len).map_or(true, |e| e > BLCKSZ) {
            return Err(Error::OutOfRange { offset: src, length: len });
        }
        let slot = self.find_slot_mut(buf).ok_or(Error::NotRegistered)?;
        if !slot.needs_full_image() {
            if slot.regions.mv(dst as u32, src as u32, len as u32) == MoveOutcome::Overflow {
                slot.overflow = true;
                tracing::debug!("region table overflowed, falling back to full image");
            }
        }
        Ok(())
    }

    /// Discards the transaction without touching any buffer.
    #[tracing::instrument(skip(self))]
    pub fn abort(&mut self) -> Result<(), Error> {
        self.require_started()?;
        for slot in &mut self.slots {
            *slot = None;
        }
        self.mode = Mode::NotStarted;
        tracing::trace!("transaction aborted");
        Ok(())
    }

    /// Commits the transaction: in `Logged` mode, encodes and inserts a WAL
    /// record and installs the post-images under its LSN; in `Unlogged`
    /// mode, installs the post-images directly with no WAL record. Returns
    /// the LSN stamped on the buffers, or [`crate::collab::INVALID_LSN`] for
    /// the unlogged path.
    #[tracing::instrument(skip(self, buffers, wal))]
    pub fn finish<W: WalWriter>(&mut self, buffers: &mut B, wal: &mut W) -> Result<Lsn, Error> {
        self.require_started()?;
        let logged = self.mode == Mode::Logged;

        let lsn = if logged {
            self.finish_logged(buffers, wal)
        } else {
            self.finish_unlogged(buffers)
        };

        for slot in &mut self.slots {
            *slot = None;
        }
        self.mode = Mode::NotStarted;
        Ok(lsn)
    }

    fn finish_logged<W: WalWriter>(&mut self, buffers: &mut B, wal: &mut W) -> Lsn {
        let _cs = CriticalSection::enter();

        // Step 1: swap each slot's image with the buffer's current
        // contents. The caller only ever wrote into the image handed back
        // by `register`, so before this swap the buffer still holds the
        // pre-image and `image` holds the post-image. After the swap the
        // buffer holds the post-image, letting the WAL subsystem take a
        // full-page snapshot of the final state, while `image` holds the
        // pre-image the encoder needs to diff against.
        for slot in self.slots.iter_mut().flatten() {
            std::mem::swap(&mut *slot.image, buffers.page_mut(slot.buffer));
        }

        wal.begin_insert();
        for (block_id, slot) in self.slots.iter_mut().enumerate() {
            let Some(slot) = slot else { continue };
            wal.register_buffer(block_id as u8, slot.needs_full_image());
            if !slot.needs_full_image() {
                let post_image = *buffers.page(slot.buffer);
                let data = slot.encode(&post_image);
                wal.register_buf_data(block_id as u8, data);
            }
        }
        let lsn = wal.insert(crate::redo::RM_ID, XLOG_GENERIC);

        // Step 4: install the post-image (still sitting in `image` from the
        // step-1 swap) onto the buffer, then stamp the LSN and mark dirty.
        // This is a copy, not a second swap: swapping again would hand the
        // pre-image back to the buffer and undo every caller edit.
        for slot in self.slots.iter_mut().flatten() {
            *buffers.page_mut(slot.buffer) = *slot.image;
            buffers.set_lsn(slot.buffer, lsn);
            buffers.mark_dirty(slot.buffer);
        }

        lsn
    }

    fn finish_unlogged(&mut self, buffers: &mut B) -> Lsn {
        let _cs = CriticalSection::enter();
        for slot in self.slots.iter().flatten() {
            *buffers.page_mut(slot.buffer) = *slot.image;
            buffers.mark_dirty(slot.buffer);
        }
        INVALID_LSN
    }
}
