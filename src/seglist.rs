//! # Segregated Free-List Allocator
//!
//! The allocation engine: a boundary-tagged block heap with sixteen
//! segregated free lists, layered on top of a [`HeapSource`].
//!
//! ## Heap Shape
//!
//! The managed region is bounded by two allocated sentinel blocks. The
//! prologue is oversized: it carries the size-class table, so an ordinary
//! block walk steps over the table as if it were payload. The epilogue is a
//! zero-size header marking the end of the heap.
//!
//! ```text
//!              heap_listp (prologue payload address)
//!                   │
//!                   ▼
//!   ┌────────┬────┬──────────────────┬────────┬────┬─────────────┬────────┬────┐
//!   │ prolog │link│ size-class table │ prolog │prev│   ordinary  │ epilog │link│
//!   │ header │    │    (16 words)    │ footer │    │   blocks... │  0 | 1 │0|1 │
//!   └────────┴────┴──────────────────┴────────┴────┴─────────────┴────────┴────┘
//!   ◄──────────────── prologue block (allocated) ──►
//! ```
//!
//! Each table word heads one circular doubly-linked list whose nodes are
//! the free blocks themselves; a block of size `s` belongs to class
//! `min(15, ⌊log₂(s)⌋)`:
//!
//! ```text
//!   class table            free blocks (links live in the blocks)
//!   ┌──────────┐
//!   │  .....   │
//!   ├──────────┤      ┌──────────────┐     ┌──────────────┐
//!   │ class 5 ─┼─────►│ 32..63 bytes │◄───►│ 32..63 bytes │◄─┐
//!   ├──────────┤      └──────┬───────┘     └──────────────┘  │
//!   │  .....   │             └──────────────────────────────-┘
//!   ├──────────┤                     (circular: tail.next == head)
//!   │ class 15 │  all blocks of 2¹⁵ bytes and up
//!   └──────────┘
//! ```
//!
//! ## Operation
//!
//! - **allocate** rounds the request up to a whole block, takes a fit from
//!   the lists (detaching it), and splits off the tail when the remainder
//!   is at least one minimum block. When no block fits, the source is asked
//!   for `max(request, CHUNKSIZE)` more bytes.
//! - **free** clears the allocation flag and merges the block with free
//!   neighbours in O(1) using the boundary tags.
//! - **reallocate** grows in place by absorbing a free neighbour whenever
//!   the combined block suffices, and otherwise moves the payload to a
//!   fresh block with a 4/3 overcommit.
//!
//! Freshly extended memory is inserted into the lists *without* merging
//! into a preceding free block; the split during the following placement
//! restores the no-adjacent-free-blocks invariant before the operation
//! returns.

use std::{mem, ptr};

use log::trace;

use crate::align;
use crate::source::HeapSource;
use crate::tags::{
  CHUNKSIZE, DSIZE, MIN_BLOCK, NUM_CLASSES, WSIZE, footer, get, get_alloc, get_size, header, link,
  next_block, next_free, pack, prev_block, prev_free, put, set_next_free, set_prev_free, set_tags,
};

/// Re-check the whole heap after every public operation.
const SHOULD_CHECK: bool = cfg!(feature = "check");

/// Print every block while checking.
const CHECK_VERBOSE: bool = false;

/// A single-threaded allocator managing one contiguous region obtained
/// from a [`HeapSource`].
///
/// All state lives inside the managed region itself: the size-class table
/// sits in the prologue block and the free-list links sit in the payload
/// areas of the free blocks. The allocator value only owns the source and
/// remembers where the prologue is.
///
/// # Guarantees
///
/// - Returned payload addresses are word-aligned.
/// - Live allocations never overlap.
/// - Freed blocks are recycled before the source is asked to grow.
///
/// # Thread Safety
///
/// This allocator is **NOT** thread-safe. For multi-threaded usage,
/// external synchronization (e.g., a `Mutex`) is required.
pub struct SegAllocator<S: HeapSource> {
  /// Where new bytes come from. Dropping the allocator drops the source
  /// and, for owned sources, the whole region with it.
  source: S,

  /// Payload address of the prologue block; also the base address of the
  /// size-class table.
  pub(crate) heap_listp: *mut u8,
}

impl<S: HeapSource> SegAllocator<S> {
  /// Initializes an empty heap on `source` and returns the allocator.
  ///
  /// Builds the prologue (header, link slot, size-class table, footer),
  /// the epilogue, and one initial free block of [`CHUNKSIZE`] bytes.
  ///
  /// Returns `None` when the source refuses either of the two initial
  /// growth requests.
  ///
  /// # Safety
  ///
  /// `source` must honor the [`HeapSource`] contract; the returned
  /// allocator must only be used from one thread at a time.
  pub unsafe fn init(source: S) -> Option<Self> {
    let mut allocator = Self {
      source,
      heap_listp: ptr::null_mut(),
    };

    unsafe {
      // Round the class count up to a word multiple so the table keeps
      // the prologue footer aligned.
      let table_words = align!(NUM_CLASSES);

      let base = allocator.source.extend((6 + table_words) * WSIZE);
      if base.is_null() {
        return None;
      }

      let prologue_size = table_words * WSIZE + 2 * DSIZE;

      // Prologue header and link slot.
      put(base, pack(prologue_size, true));
      put(base.add(WSIZE), 0);

      // Size-class table: one head word per class, all lists empty.
      for class in 0..table_words {
        put(base.add((2 + class) * WSIZE), 0);
      }

      // Prologue footer and prev slot.
      put(base.add((2 + table_words) * WSIZE), pack(prologue_size, true));
      put(base.add((3 + table_words) * WSIZE), 0);

      // Epilogue: a zero-size allocated header plus its link word.
      put(base.add((4 + table_words) * WSIZE), pack(0, true));
      put(base.add((5 + table_words) * WSIZE), pack(0, true));

      allocator.heap_listp = base.add(2 * WSIZE);

      if allocator.extend_heap(CHUNKSIZE / WSIZE).is_null() {
        return None;
      }
    }

    if SHOULD_CHECK {
      allocator.check_heap(CHECK_VERBOSE);
    }

    Some(allocator)
  }

  /// Allocates a block with at least `size` bytes of payload.
  ///
  /// Returns a word-aligned payload address, or null when `size` is zero
  /// or the heap source is exhausted.
  ///
  /// # Safety
  ///
  /// The returned address is only valid until the matching
  /// [`free`](Self::free) and for as long as the allocator is alive.
  pub unsafe fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    trace!("allocate({size})");

    // Ignore spurious requests.
    if size == 0 {
      return ptr::null_mut();
    }

    // Adjust the request to cover the four overhead words and alignment.
    let asize = MIN_BLOCK.max(align!(size + 2 * DSIZE));

    unsafe {
      let mut bp = self.find_fit(asize);

      if bp.is_null() {
        // No fit found. Get more memory and place the block there.
        let extendsize = asize.max(CHUNKSIZE);
        bp = self.extend_heap(extendsize / WSIZE);
        if bp.is_null() {
          return ptr::null_mut();
        }

        // extend_heap inserts the new block; placement expects it detached.
        self.remove_free(bp);
      }

      self.place(bp, asize);

      if SHOULD_CHECK {
        self.check_heap(CHECK_VERBOSE);
      }

      bp
    }
  }

  /// Frees the block at `bp`.
  ///
  /// Null is ignored. The block is merged with free neighbours
  /// immediately and becomes available to subsequent allocations.
  ///
  /// # Safety
  ///
  /// `bp` must have been returned by [`allocate`](Self::allocate) or
  /// [`reallocate`](Self::reallocate) on this allocator and not freed
  /// since.
  pub unsafe fn free(
    &mut self,
    bp: *mut u8,
  ) {
    trace!("free({bp:?})");

    // Ignore spurious requests.
    if bp.is_null() {
      return;
    }

    unsafe {
      let size = get_size(header(bp));
      set_tags(bp, size, false);

      self.coalesce(bp);
    }

    if SHOULD_CHECK {
      self.check_heap(CHECK_VERBOSE);
    }
  }

  /// Resizes the allocation at `bp` to at least `size` payload bytes.
  ///
  /// - `size == 0` frees the block and returns null.
  /// - A null `bp` behaves like [`allocate`](Self::allocate).
  /// - Shrinking returns `bp` unchanged.
  /// - Growing absorbs a free neighbour when the combined block is large
  ///   enough (next first, then previous, then both); otherwise the
  ///   payload moves to a fresh block and the old one is freed.
  ///
  /// On exhaustion the original block is left untouched and null is
  /// returned.
  ///
  /// # Safety
  ///
  /// Same contract as [`free`](Self::free); the old address is invalid
  /// once a different address is returned.
  pub unsafe fn reallocate(
    &mut self,
    bp: *mut u8,
    size: usize,
  ) -> *mut u8 {
    trace!("reallocate({bp:?}, {size})");

    unsafe {
      // A zero size is just free, and we return null.
      if size == 0 {
        self.free(bp);
        return ptr::null_mut();
      }

      // A null block is just allocate.
      if bp.is_null() {
        return self.allocate(size);
      }

      let oldsize = get_size(header(bp));

      // Shrink in place; no split, the slack stays with the block.
      if size + 2 * DSIZE <= oldsize {
        return bp;
      }

      // If a free neighbour gives us enough room, grow in place.
      let next = next_block(bp);
      let prev = prev_block(bp);
      let next_is_free = !get_alloc(header(next));
      let prev_is_free = !get_alloc(header(prev));

      if next_is_free && oldsize + get_size(header(next)) >= size + 2 * DSIZE {
        let newsize = oldsize + get_size(header(next));

        self.remove_free(next);
        set_tags(bp, newsize, true);

        return bp;
      } else if prev_is_free && oldsize + get_size(header(prev)) >= size + 2 * DSIZE {
        let newsize = oldsize + get_size(header(prev));

        self.remove_free(prev);
        set_tags(prev, newsize, true);

        // Slide the payload down; the regions overlap.
        ptr::copy(bp, prev, oldsize - DSIZE);

        return prev;
      } else if next_is_free
        && prev_is_free
        && oldsize + get_size(header(prev)) + get_size(header(next)) >= size + 2 * DSIZE
      {
        let newsize = oldsize + get_size(header(prev)) + get_size(header(next));

        self.remove_free(prev);
        self.remove_free(next);
        set_tags(prev, newsize, true);

        ptr::copy(bp, prev, oldsize - DSIZE);

        return prev;
      }

      // Move. A 4/3 overcommit beats doubling in practice: repeated
      // growth still amortises while peak fragmentation stays lower.
      let request = size.max(4 * oldsize / 3);

      let newptr = self.allocate(request);

      // If the fresh allocation fails the original block is left untouched.
      if newptr.is_null() {
        return ptr::null_mut();
      }

      ptr::copy_nonoverlapping(bp, newptr, size.min(oldsize));

      self.free(bp);

      newptr
    }
  }

  /// Size class of a block or request of `size` bytes.
  fn class_of(size: usize) -> usize {
    (size.ilog2() as usize).min(NUM_CLASSES - 1)
  }

  /// Address of the head word of class `class` inside the prologue.
  pub(crate) fn head_slot(
    &self,
    class: usize,
  ) -> *mut u8 {
    unsafe { self.heap_listp.add(class * WSIZE) }
  }

  /// Address of the head word of the list responsible for `size`.
  pub(crate) fn bucket_for(
    &self,
    size: usize,
  ) -> *mut u8 {
    self.head_slot(Self::class_of(size))
  }

  /// Inserts the free block `bp` into the list for its size.
  ///
  /// An empty list becomes a self-linked singleton; otherwise `bp` is
  /// spliced in at the tail position, between the current tail and the
  /// head. Two pointer updates either way, no null checks on the ends.
  ///
  /// # Safety
  ///
  /// `bp` must be a free block with valid tags that is on no list.
  unsafe fn insert_free(
    &mut self,
    bp: *mut u8,
  ) {
    unsafe {
      let slot = self.bucket_for(get_size(header(bp)));
      let head = get(slot) as *mut u8;

      if head.is_null() {
        set_next_free(bp, bp);
        set_prev_free(bp, bp);
        put(slot, bp as usize);
      } else {
        let tail = prev_free(head);

        set_next_free(tail, bp);
        set_prev_free(bp, tail);
        set_next_free(bp, head);
        set_prev_free(head, bp);
      }
    }
  }

  /// Unlinks the free block `bp` from the list for its size.
  ///
  /// A singleton clears the head word; otherwise the neighbours are
  /// re-stitched and the head advanced past `bp` if it pointed there.
  ///
  /// # Safety
  ///
  /// `bp` must be a free block currently on the list for its size.
  unsafe fn remove_free(
    &mut self,
    bp: *mut u8,
  ) {
    unsafe {
      let slot = self.bucket_for(get_size(header(bp)));
      let next = next_free(bp);

      if next == bp {
        put(slot, 0);
      } else {
        let prev = prev_free(bp);

        set_next_free(prev, next);
        set_prev_free(next, prev);

        if get(slot) as *mut u8 == bp {
          put(slot, next as usize);
        }
      }
    }
  }

  /// Merges the newly freed block `bp` with free neighbours and inserts
  /// the result into the free lists.
  ///
  /// Returns the payload address of the merged block (which moves to the
  /// predecessor's when merging backwards).
  ///
  /// # Safety
  ///
  /// `bp` must be a free block with valid tags that is on no list.
  unsafe fn coalesce(
    &mut self,
    bp: *mut u8,
  ) -> *mut u8 {
    unsafe {
      let mut bp = bp;
      let mut size = get_size(header(bp));

      let prev_alloc = get_alloc(footer(prev_block(bp)));
      let next_alloc = get_alloc(header(next_block(bp)));

      trace!("coalesce({bp:?}) size={size} prev_alloc={prev_alloc} next_alloc={next_alloc}");

      if prev_alloc && next_alloc {
        // Both neighbours busy; keep the block as it is.
      } else if prev_alloc && !next_alloc {
        let next = next_block(bp);

        self.remove_free(next);
        size += get_size(header(next));
        set_tags(bp, size, false);
      } else if !prev_alloc && next_alloc {
        let prev = prev_block(bp);

        self.remove_free(prev);
        size += get_size(header(prev));
        set_tags(prev, size, false);
        bp = prev;
      } else {
        let prev = prev_block(bp);
        let next = next_block(bp);

        self.remove_free(prev);
        self.remove_free(next);
        size += get_size(header(prev)) + get_size(header(next));
        set_tags(prev, size, false);
        bp = prev;
      }

      self.insert_free(bp);

      bp
    }
  }

  /// Grows the heap by `words` words (rounded up to an even count) and
  /// returns the new free block, already inserted into the free lists.
  ///
  /// The old epilogue header is reused as the new block's header and a
  /// fresh epilogue is written after it. The new block is *not* merged
  /// with a preceding free block; the spatial locality of fresh memory is
  /// worth more than the occasional seam.
  ///
  /// Returns null when the source refuses to grow.
  unsafe fn extend_heap(
    &mut self,
    words: usize,
  ) -> *mut u8 {
    // Keep the block size an even number of words.
    let size = if words % 2 == 1 {
      (words + 1) * WSIZE
    } else {
      words * WSIZE
    };

    trace!("extend_heap({size} bytes)");

    unsafe {
      let bp = self.source.extend(size);
      if bp.is_null() {
        return ptr::null_mut();
      }

      // The first new byte lands one doubleword past the old epilogue
      // header, which therefore sits exactly where this block's header
      // belongs.
      set_tags(bp, size, false);

      // New epilogue after the block.
      put(header(next_block(bp)), pack(0, true));
      put(header(next_block(bp)).add(WSIZE), pack(0, true));

      self.insert_free(bp);

      bp
    }
  }

  /// Resolves `asize` to a free block, detaching it from its list.
  ///
  /// The largest class holds blocks of wildly different sizes and gets a
  /// first-fit scan; the head is rotated to the match's successor so
  /// consecutive searches do not rescan the same prefix. Every other
  /// class needs at most a look at its own head (which may be too small)
  /// before falling through to the strictly larger classes, where any
  /// block is guaranteed to fit.
  ///
  /// Returns null when every class is exhausted.
  unsafe fn find_fit(
    &mut self,
    asize: usize,
  ) -> *mut u8 {
    let class = Self::class_of(asize);

    unsafe {
      if class == NUM_CLASSES - 1 {
        let slot = self.head_slot(class);
        let head = get(slot) as *mut u8;

        if !head.is_null() {
          let mut bp = head;

          loop {
            if asize <= get_size(header(bp)) {
              put(slot, next_free(bp) as usize);
              self.remove_free(bp);
              return bp;
            }

            bp = next_free(bp);
            if bp == head {
              break;
            }
          }
        }

        return ptr::null_mut();
      }

      // The head of the own class may satisfy the request, but a block
      // further down the list never gets scanned.
      let head = get(self.head_slot(class)) as *mut u8;
      if !head.is_null() && asize <= get_size(header(head)) {
        self.remove_free(head);
        return head;
      }

      // Anything in a strictly larger class is big enough by definition.
      for larger in class + 1..NUM_CLASSES {
        let head = get(self.head_slot(larger)) as *mut u8;

        if !head.is_null() {
          self.remove_free(head);
          return head;
        }
      }

      ptr::null_mut()
    }
  }

  /// Converts the detached free block `bp` into an allocated block of
  /// `asize` bytes, splitting off the remainder when it can stand on its
  /// own.
  ///
  /// The link slot of the allocated portion is cleared so the payload
  /// starts with a clean prefix.
  ///
  /// # Safety
  ///
  /// `bp` must be a free block of at least `asize` bytes that has been
  /// removed from its free list.
  unsafe fn place(
    &mut self,
    bp: *mut u8,
    asize: usize,
  ) {
    unsafe {
      let csize = get_size(header(bp));

      if csize - asize >= MIN_BLOCK {
        set_tags(bp, asize, true);
        put(link(bp), 0);

        let rest = next_block(bp);
        set_tags(rest, csize - asize, false);
        self.insert_free(rest);
      } else {
        set_tags(bp, csize, true);
        put(link(bp), 0);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::ArenaSource;

  /// Bytes the initial heap consumes from the source: prologue, epilogue,
  /// and the first CHUNKSIZE extension.
  const BOOTSTRAP: usize = (6 + NUM_CLASSES) * WSIZE + CHUNKSIZE;

  fn fresh(capacity: usize) -> SegAllocator<ArenaSource> {
    unsafe { SegAllocator::init(ArenaSource::with_capacity(capacity)).expect("init") }
  }

  fn is_aligned(
    ptr: *mut u8,
    align: usize,
  ) -> bool {
    (ptr as usize) % align == 0
  }

  fn fill(
    ptr: *mut u8,
    len: usize,
    seed: u8,
  ) {
    unsafe {
      for i in 0..len {
        ptr.add(i).write(seed.wrapping_add(i as u8));
      }
    }
  }

  fn holds(
    ptr: *mut u8,
    len: usize,
    seed: u8,
  ) -> bool {
    unsafe { (0..len).all(|i| ptr.add(i).read() == seed.wrapping_add(i as u8)) }
  }

  #[test]
  fn init_fails_when_the_source_refuses_the_prologue() {
    unsafe {
      assert!(SegAllocator::init(ArenaSource::with_capacity(100)).is_none());
    }
  }

  #[test]
  fn init_fails_when_the_source_refuses_the_first_chunk() {
    // Room for the sentinels but not for the CHUNKSIZE extension.
    unsafe {
      assert!(SegAllocator::init(ArenaSource::with_capacity(300)).is_none());
    }
  }

  #[test]
  fn allocate_zero_returns_null() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      assert!(allocator.allocate(0).is_null());
    }
  }

  #[test]
  fn free_null_is_a_noop() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      allocator.free(ptr::null_mut());
    }

    allocator.check_heap(false);
  }

  #[test]
  fn returned_addresses_are_word_aligned() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      for size in [1usize, 2, 3, 7, 8, 9, 24, 100, 1000, 5000] {
        let bp = allocator.allocate(size);

        assert!(!bp.is_null());
        assert!(
          is_aligned(bp, WSIZE),
          "allocation of {size} must be {WSIZE}-byte aligned, got {bp:p}"
        );
      }
    }

    allocator.check_heap(false);
  }

  #[test]
  fn minimum_blocks_tile_without_overlap() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let first = allocator.allocate(1);
      let second = allocator.allocate(1);

      // One-byte requests round up to the minimum block, so the two
      // blocks sit exactly one minimum block apart.
      assert_eq!(second, first.add(MIN_BLOCK));
    }
  }

  #[test]
  fn distinct_allocations_do_not_clobber_each_other() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let sizes = [24usize, 100, 8, 512, 56];
      let mut blocks = Vec::new();

      for (i, &size) in sizes.iter().enumerate() {
        let bp = allocator.allocate(size);
        assert!(!bp.is_null());

        fill(bp, size, i as u8);
        blocks.push((bp, size, i as u8));
      }

      for (bp, size, seed) in blocks {
        assert!(holds(bp, size, seed));
      }
    }

    allocator.check_heap(false);
  }

  #[test]
  fn free_then_allocate_reuses_the_same_block() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let first = allocator.allocate(24);
      allocator.free(first);

      let second = allocator.allocate(24);
      assert_eq!(second, first);
    }

    allocator.check_heap(false);
  }

  #[test]
  fn freeing_the_middle_block_merges_all_three() {
    // Capacity fits exactly the bootstrap: any extension would fail, so
    // the final allocation below can only succeed if a, b, and c merged
    // back into one block spanning the whole initial chunk.
    let mut allocator = fresh(BOOTSTRAP);

    unsafe {
      let a = allocator.allocate(24);
      let b = allocator.allocate(24);
      let c = allocator.allocate(24);

      allocator.free(a);
      allocator.free(c);
      allocator.free(b);

      allocator.check_heap(false);

      let whole = allocator.allocate(CHUNKSIZE - 2 * DSIZE);
      assert_eq!(whole, a);
    }
  }

  #[test]
  fn placement_splits_off_the_remainder() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let first = allocator.allocate(24);
      allocator.free(first);

      // A smaller request reuses the front of the merged chunk...
      let second = allocator.allocate(8);
      assert_eq!(second, first);

      // ...and the tail went back to the lists: the next request is
      // served right behind the split, not from fresh memory.
      let third = allocator.allocate(1000);
      assert_eq!(third, second.add(MIN_BLOCK));
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_grows_in_place_into_the_next_block() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let p = allocator.allocate(48);
      let q = allocator.allocate(16);

      fill(p, 48, 7);
      allocator.free(q);

      let grown = allocator.reallocate(p, 80);
      assert_eq!(grown, p);
      assert!(holds(p, 48, 7));
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_grows_in_place_into_the_previous_block() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let a = allocator.allocate(24);
      let b = allocator.allocate(48);
      let _fence = allocator.allocate(24);

      fill(b, 48, 3);
      allocator.free(a);

      let grown = allocator.reallocate(b, 100);

      // The block slid down into the freed predecessor.
      assert_eq!(grown, a);
      assert!(holds(grown, 48, 3));
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_absorbs_both_neighbours_when_one_is_not_enough() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let a = allocator.allocate(24);
      let b = allocator.allocate(24);
      let c = allocator.allocate(24);
      let _fence = allocator.allocate(24);

      fill(b, 24, 11);
      allocator.free(a);
      allocator.free(c);

      // Each neighbour alone adds one minimum-size block, which is too
      // little; together they fit the request.
      let grown = allocator.reallocate(b, 120);

      assert_eq!(grown, a);
      assert!(holds(grown, 24, 11));
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_moves_and_preserves_the_payload() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let p = allocator.allocate(48);
      let _fence = allocator.allocate(48);

      fill(p, 48, 42);

      let moved = allocator.reallocate(p, 4096);

      assert_ne!(moved, p);
      assert!(holds(moved, 48, 42));

      // The old block was freed: an equally sized request gets it back.
      let reused = allocator.allocate(48);
      assert_eq!(reused, p);
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_shrink_keeps_the_pointer() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let p = allocator.allocate(200);
      fill(p, 200, 5);

      let shrunk = allocator.reallocate(p, 10);
      assert_eq!(shrunk, p);
      assert!(holds(p, 10, 5));
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_to_the_current_size_keeps_the_payload() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let p = allocator.allocate(48);
      fill(p, 48, 9);

      let same = allocator.reallocate(p, 48);
      assert_eq!(same, p);
      assert!(holds(same, 48, 9));
    }
  }

  #[test]
  fn reallocate_null_behaves_like_allocate() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let p = allocator.reallocate(ptr::null_mut(), 24);

      assert!(!p.is_null());
      assert!(is_aligned(p, WSIZE));
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_to_zero_frees_the_block() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      let p = allocator.allocate(24);

      assert!(allocator.reallocate(p, 0).is_null());

      // The freed block merged back into the chunk and is reused.
      let again = allocator.allocate(24);
      assert_eq!(again, p);
    }

    allocator.check_heap(false);
  }

  #[test]
  fn large_requests_go_through_the_top_class() {
    let mut allocator = fresh(1 << 20);

    unsafe {
      // Pin the initial chunk so the big block keeps allocated
      // neighbours on both sides.
      let _fence = allocator.allocate(CHUNKSIZE - 2 * DSIZE);

      // Larger than the biggest homogeneous class, so both the free and
      // the refill run the first-fit scan of the saturating class.
      let big = allocator.allocate(40000);
      assert!(!big.is_null());

      allocator.free(big);

      let refill = allocator.allocate(33000);
      assert_eq!(refill, big);
    }

    allocator.check_heap(false);
  }

  #[test]
  fn exhaustion_fails_the_allocation_and_preserves_live_blocks() {
    // One chunk of slack beyond the bootstrap, just under what the big
    // request's extension will ask for.
    let mut allocator = fresh(BOOTSTRAP + CHUNKSIZE);

    unsafe {
      let a = allocator.allocate(512);
      let b = allocator.allocate(512);
      let c = allocator.allocate(512);

      assert!(!a.is_null() && !b.is_null() && !c.is_null());

      fill(a, 512, 1);
      fill(b, 512, 2);
      fill(c, 512, 3);

      // Three 512-byte payloads ate most of the chunk; this request
      // needs an extension larger than what is left of the arena.
      let d = allocator.allocate(2048);
      assert!(d.is_null());

      assert!(holds(a, 512, 1));
      assert!(holds(b, 512, 2));
      assert!(holds(c, 512, 3));

      assert_ne!(a, b);
      assert_ne!(b, c);
      assert_ne!(a, c);

      // Small requests still fit in what is left of the chunk.
      let small = allocator.allocate(128);
      assert!(!small.is_null());
    }

    allocator.check_heap(false);
  }

  #[test]
  fn reallocate_failure_leaves_the_original_untouched() {
    let mut allocator = fresh(BOOTSTRAP);

    unsafe {
      let p = allocator.allocate(256);
      fill(p, 256, 77);

      // The arena is exactly bootstrap-sized; a grown copy cannot exist.
      let grown = allocator.reallocate(p, 4096);

      assert!(grown.is_null());
      assert!(holds(p, 256, 77));

      allocator.free(p);
    }

    allocator.check_heap(false);
  }

  #[test]
  fn mixed_workout_keeps_the_heap_consistent() {
    let mut allocator = fresh(1 << 20);

    // Deterministic pseudo-random operation mix.
    let mut state: usize = 0x2545_F491_4F6C_DD1D;
    let mut next = move || {
      state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
      state >> 33
    };

    let mut live: Vec<(*mut u8, usize, u8)> = Vec::new();

    unsafe {
      for round in 0..300 {
        match next() % 3 {
          0 => {
            let size = next() % 500 + 1;
            let bp = allocator.allocate(size);
            assert!(!bp.is_null());

            let seed = round as u8;
            fill(bp, size, seed);
            live.push((bp, size, seed));
          }
          1 => {
            if !live.is_empty() {
              let (bp, size, seed) = live.swap_remove(next() % live.len());
              assert!(holds(bp, size, seed), "payload damaged before free");
              allocator.free(bp);
            }
          }
          _ => {
            if !live.is_empty() {
              let slot = next() % live.len();
              let (bp, size, seed) = live[slot];
              let new_size = next() % 500 + 1;

              let moved = allocator.reallocate(bp, new_size);
              assert!(!moved.is_null());
              assert!(holds(moved, size.min(new_size), seed));

              let new_seed = round as u8;
              fill(moved, new_size, new_seed);
              live[slot] = (moved, new_size, new_seed);
            }
          }
        }

        allocator.check_heap(false);
      }

      for (bp, size, seed) in live {
        assert!(holds(bp, size, seed));
        allocator.free(bp);
      }
    }

    allocator.check_heap(false);
  }
}
