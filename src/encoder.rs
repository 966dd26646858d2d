//! Differential-record encoder: compares a working image against its
//! pre-image, using the region map to recognize runs that only moved, and
//! emits a minimal `COPY`/`MOVE` instruction stream (see [`crate::wire`]).

use crate::page::BLCKSZ;
use crate::region::{Region, RegionSet};
use crate::wire::{write_copy, write_move};

/// A matched run shorter than this many bytes is not worth a `MOVE`
/// instruction: a `MOVE` costs 4 bytes of overhead versus `2 + len` for a
/// `COPY`, so only runs of at least 16 unchanged bytes pay for themselves.
pub const MATCH_THRESHOLD: u32 = 16;

/// Emits the differential record transforming `pre_image` into `working`
/// into `out`, given the region map that tracks `working`'s current layout
/// in terms of `pre_image` offsets. `out` is cleared first; callers that
/// need to avoid allocating inside a critical section should pass a buffer
/// already reserved to its worst case (`2 * BLCKSZ`, per [`crate::slot`]).
///
/// The sum of all instruction lengths in the emitted stream equals
/// [`BLCKSZ`]; decoding it against `pre_image` with [`crate::redo::apply`]
/// reproduces `working` byte for byte.
pub fn encode_differential(working: &[u8; BLCKSZ], pre_image: &[u8; BLCKSZ], regions: &RegionSet, out: &mut Vec<u8>) {
    out.clear();
    let region_list = regions.regions();

    let mut region_idx = 0usize;
    let mut region: Region = region_list[0];
    let mut region_offset: u32 = 0;
    let mut not_match: u32 = 0;
    let mut match_start: u32 = 0;

    for i in 0..BLCKSZ as u32 {
        if region_offset >= region.length {
            flush_run(out, working, &mut not_match, i, match_start, region, region_offset);
            match_start = i;
            region_idx += 1;
            region = region_list[region_idx];
            region_offset = 0;
        }

        if working[i as usize] != pre_image[(region.src_offset + region_offset) as usize] {
            flush_run(out, working, &mut not_match, i, match_start, region, region_offset);
            match_start = i + 1;
        }

        region_offset += 1;
    }
    flush_run(
        out,
        working,
        &mut not_match,
        BLCKSZ as u32,
        match_start,
        region,
        region_offset,
    );
    // A pending match that runs to the very end of the page needs no
    // trailing COPY — see spec's note on this guard.
    if not_match < BLCKSZ as u32 {
        write_copy(out, &working[not_match as usize..]);
    }
}

/// Flushes the run `[match_start, i)` if it is long enough to be worth a
/// `Move` instruction: any pending unmatched prefix `[not_match, match_start)`
/// is emitted as a `Copy` first, then the matched run as a `Move` pointing at
/// its start on the pre-image.
fn flush_run(
    out: &mut Vec<u8>,
    working: &[u8; BLCKSZ],
    not_match: &mut u32,
    i: u32,
    match_start: u32,
    region: Region,
    region_offset: u32,
) {
    if i - match_start >= MATCH_THRESHOLD {
        if *not_match < match_start {
            write_copy(out, &working[*not_match as usize..match_start as usize]);
        }
        let match_src_end = region.src_offset + region_offset;
        write_move(out, (i - match_start) as u16, (match_src_end - (i - match_start)) as u16);
        *not_match = i;
    }
}
