//! Per-page bookkeeping for one registered buffer within a transaction
//! (spec §3's `MAX_GENERIC_XLOG_PAGES`-sized slot table).

use crate::encoder::encode_differential;
use crate::page::{PageBuf, BLCKSZ};
use crate::region::RegionSet;

/// Worst case a differential record can expand to: every byte emitted as
/// its own single-byte `Copy`, at 3 bytes of overhead apiece. `2 * BLCKSZ`
/// comfortably covers that and matches the original's scratch sizing.
pub const MAX_DATA_LEN: usize = 2 * BLCKSZ;

/// Tracks one buffer registered with [`crate::transaction::GenericXlog`]
/// between `register` and `finish`/`abort`.
pub struct Slot<Buf> {
    pub buffer: Buf,
    /// Untouched copy of the page as it looked at `register` time.
    pub image: PageBuf,
    /// Maps the working page's current layout back onto `image`'s offsets.
    pub regions: RegionSet,
    /// Set once `regions` has overflowed [`crate::region::MAX_REGIONS`];
    /// from then on this slot always emits a full-page image instead of a
    /// differential record.
    pub overflow: bool,
    /// Forces a full-page image unconditionally (`REGBUF_FORCE_IMAGE`).
    pub full_image: bool,
    /// Scratch buffer for the encoded differential record, reserved to
    /// [`MAX_DATA_LEN`] up front so `finish`'s critical section never
    /// allocates.
    data: Vec<u8>,
}

impl<Buf: Copy> Slot<Buf> {
    pub fn new(buffer: Buf, image: PageBuf, full_image: bool) -> Self {
        Self {
            buffer,
            image,
            regions: RegionSet::identity(),
            overflow: false,
            full_image,
            data: Vec::with_capacity(MAX_DATA_LEN),
        }
    }

    /// Whether this slot should carry a full-page image rather than a
    /// differential record: either requested up front, or forced by a
    /// region-table overflow recorded during registration.
    pub fn needs_full_image(&self) -> bool {
        self.full_image || self.overflow
    }

    /// Encodes the differential record transforming `image` into `working`,
    /// reusing the pre-reserved scratch buffer. Must not be called once
    /// [`Self::needs_full_image`] is true; the caller sends a full-page
    /// image instead and the scratch buffer is irrelevant.
    pub fn encode(&mut self, working: &[u8; BLCKSZ]) -> &[u8] {
        encode_differential(working, &self.image, &self.regions, &mut self.data);
        &self.data
    }
}
