//! # Boundary Tags
//!
//! The narrow unsafe core of the allocator: every raw word read or write on
//! the managed region happens here. The rest of the crate only sees typed
//! operations (`get_size`, `get_alloc`, `set_tags`, `next_block`,
//! `prev_block`, and the free-list link accessors).
//!
//! ## Block Layout
//!
//! Every block carries a one-word header and a one-word footer, both packing
//! `size | alloc_flag`. Sizes are always multiples of the word size, so the
//! low bit is free to hold the flag. Between the header and the payload sits
//! one extra word, the *link slot*, and the word after the footer mirrors it:
//!
//! ```text
//!              bp - 2W    bp - W      bp                 footer     footer + W
//!                 │          │         │                    │          │
//!                 ▼          ▼         ▼                    ▼          ▼
//!   ┌─────────┬────────┬─────────┬──────────────────────┬────────┬─────────┬───
//!   │ ...prev │ header │  link   │       payload        │ footer │  prev   │
//!   │  block  │ size|a │ (next)  │                      │ size|a │  link   │
//!   └─────────┴────────┴─────────┴──────────────────────┴────────┴─────────┴───
//!             ◄────────────────────── size ──────────────────────►
//! ```
//!
//! - `header(bp) = bp - 2W`, `footer(bp) = bp + size - 2 * DSIZE`.
//! - For a **free** block the link slot holds the `next` pointer of its
//!   size-class list and the word after the footer holds `prev`. Both words
//!   are dead storage while the block is allocated.
//! - The footer mirrors the header so that `prev_block` can step backwards
//!   in O(1) by reading the preceding block's footer.
//!
//! Pointers stored in the link words are written as plain `usize` values,
//! exactly like the size tags.

use std::mem;

/// Word and header/footer size in bytes.
pub const WSIZE: usize = mem::size_of::<usize>();

/// Doubleword size in bytes.
pub const DSIZE: usize = 2 * WSIZE;

/// Extend the heap by at least this many bytes.
pub const CHUNKSIZE: usize = 1 << 11;

/// Number of segregated free-list size classes.
pub const NUM_CLASSES: usize = 16;

/// Smallest representable block: header, link slot, one payload word,
/// footer, and prev slot.
pub const MIN_BLOCK: usize = 2 * DSIZE + WSIZE;

/// Reads the word at `p`.
///
/// # Safety
///
/// `p` must be a word-aligned address inside the managed region.
#[inline]
pub unsafe fn get(p: *mut u8) -> usize {
  unsafe { p.cast::<usize>().read() }
}

/// Writes the word at `p`.
///
/// # Safety
///
/// `p` must be a word-aligned address inside the managed region.
#[inline]
pub unsafe fn put(
  p: *mut u8,
  value: usize,
) {
  unsafe { p.cast::<usize>().write(value) }
}

/// Packs a block size and an allocation flag into one tag word.
#[inline]
pub fn pack(
  size: usize,
  alloc: bool,
) -> usize {
  size | alloc as usize
}

/// Reads the size field of the tag word at `p` (header or footer address).
///
/// # Safety
///
/// `p` must point at a valid tag word.
#[inline]
pub unsafe fn get_size(p: *mut u8) -> usize {
  unsafe { get(p) & !(WSIZE - 1) }
}

/// Reads the allocation flag of the tag word at `p`.
///
/// # Safety
///
/// `p` must point at a valid tag word.
#[inline]
pub unsafe fn get_alloc(p: *mut u8) -> bool {
  unsafe { get(p) & 0x1 != 0 }
}

/// Address of the header of the block with payload address `bp`.
///
/// # Safety
///
/// `bp` must be the payload address of a block in the managed region.
#[inline]
pub unsafe fn header(bp: *mut u8) -> *mut u8 {
  unsafe { bp.sub(DSIZE) }
}

/// Address of the footer of the block with payload address `bp`.
///
/// Derived from the size currently stored in the header.
///
/// # Safety
///
/// `bp` must be the payload address of a block whose header is valid.
#[inline]
pub unsafe fn footer(bp: *mut u8) -> *mut u8 {
  unsafe { bp.add(get_size(header(bp)) - 2 * DSIZE) }
}

/// Address of the link slot (the word between header and payload).
///
/// # Safety
///
/// `bp` must be the payload address of a block in the managed region.
#[inline]
pub unsafe fn link(bp: *mut u8) -> *mut u8 {
  unsafe { bp.sub(WSIZE) }
}

/// Payload address of the block immediately after `bp`.
///
/// # Safety
///
/// `bp` must be the payload address of a block whose header is valid, and
/// the block after it must exist (the epilogue bounds every walk).
#[inline]
pub unsafe fn next_block(bp: *mut u8) -> *mut u8 {
  unsafe { bp.add(get_size(header(bp))) }
}

/// Payload address of the block immediately before `bp`.
///
/// Steps backwards over the preceding block's footer.
///
/// # Safety
///
/// `bp` must be the payload address of a block that has a predecessor (the
/// prologue bounds every walk).
#[inline]
pub unsafe fn prev_block(bp: *mut u8) -> *mut u8 {
  unsafe { bp.sub(get_size(bp.sub(2 * DSIZE))) }
}

/// Writes matching header and footer tags for the block at `bp`.
///
/// The header is written first; the footer position is derived from the
/// size just written, so this also works when a merge grows the block.
///
/// # Safety
///
/// `bp` must be the payload address of a block large enough for `size`
/// bytes inside the managed region.
#[inline]
pub unsafe fn set_tags(
  bp: *mut u8,
  size: usize,
  alloc: bool,
) {
  unsafe {
    put(header(bp), pack(size, alloc));
    put(footer(bp), pack(size, alloc));
  }
}

/// Reads the `next` pointer of a free block.
///
/// # Safety
///
/// `bp` must be the payload address of a free block on a free list.
#[inline]
pub unsafe fn next_free(bp: *mut u8) -> *mut u8 {
  unsafe { get(link(bp)) as *mut u8 }
}

/// Writes the `next` pointer of a free block.
///
/// # Safety
///
/// `bp` must be the payload address of a free block.
#[inline]
pub unsafe fn set_next_free(
  bp: *mut u8,
  next: *mut u8,
) {
  unsafe { put(link(bp), next as usize) }
}

/// Reads the `prev` pointer of a free block (stored after its footer).
///
/// # Safety
///
/// `bp` must be the payload address of a free block on a free list.
#[inline]
pub unsafe fn prev_free(bp: *mut u8) -> *mut u8 {
  unsafe { get(footer(bp).add(WSIZE)) as *mut u8 }
}

/// Writes the `prev` pointer of a free block.
///
/// # Safety
///
/// `bp` must be the payload address of a free block.
#[inline]
pub unsafe fn set_prev_free(
  bp: *mut u8,
  prev: *mut u8,
) {
  unsafe { put(footer(bp).add(WSIZE), prev as usize) }
}
