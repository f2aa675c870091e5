//! # Heap Consistency Checker
//!
//! A full sweep over the managed region and the free lists. Violations are
//! programmer errors, so every check is a hard assertion; there is nothing
//! to recover.
//!
//! The sweep verifies, in order:
//!
//! 1. the prologue is allocated and the epilogue is a zero-size allocated
//!    header,
//! 2. every block is word aligned, header and footer agree, and no two
//!    adjacent blocks are both free,
//! 3. every free block found during the walk is reachable from its
//!    size-class list,
//! 4. every list node is free, sits in the class its size maps to, and is
//!    stitched to its neighbours in both directions,
//! 5. the walk and the lists agree on the number of free blocks.
//!
//! With the `check` feature enabled the allocator runs this after every
//! public operation; tests call it directly.

use crate::seglist::SegAllocator;
use crate::source::HeapSource;
use crate::tags::{
  NUM_CLASSES, WSIZE, footer, get, get_alloc, get_size, header, next_block, next_free, prev_free,
};

impl<S: HeapSource> SegAllocator<S> {
  /// Checks every invariant of the heap, panicking on the first
  /// violation. With `verbose` each block and list is printed on the way.
  pub fn check_heap(
    &self,
    verbose: bool,
  ) {
    unsafe {
      let prologue = self.heap_listp;

      if verbose {
        println!("Heap ({prologue:?}):");
      }

      assert!(
        get_alloc(header(prologue)),
        "bad prologue header: unallocated"
      );

      let mut free_in_walk = 0usize;
      let mut prev_was_free = false;

      let mut bp = prologue;
      while get_size(header(bp)) > 0 {
        if verbose {
          print_block(bp);
        }

        self.check_block(bp);

        let is_free = !get_alloc(header(bp));
        assert!(
          !(prev_was_free && is_free),
          "adjacent free blocks at {bp:?}"
        );

        if is_free {
          free_in_walk += 1;
        }
        prev_was_free = is_free;

        bp = next_block(bp);
      }

      if verbose {
        print_block(bp);
      }

      assert!(
        get_size(header(bp)) == 0 && get_alloc(header(bp)),
        "bad epilogue header at {bp:?}"
      );

      let mut free_in_lists = 0usize;

      for class in 0..NUM_CLASSES {
        let head = get(self.head_slot(class)) as *mut u8;
        if head.is_null() {
          continue;
        }

        if verbose {
          println!("Free list {class}:");
        }

        let mut prev = prev_free(head);
        let mut p = head;

        loop {
          if verbose {
            print_block(p);
          }

          assert!(
            !get_alloc(header(p)),
            "allocated block {p:?} on free list {class}"
          );
          assert_eq!(
            self.bucket_for(get_size(header(p))),
            self.head_slot(class),
            "block {p:?} of size {} is in the wrong class",
            get_size(header(p))
          );
          assert_eq!(prev_free(p), prev, "broken prev link at {p:?}");
          assert_eq!(next_free(prev), p, "broken next link at {prev:?}");

          free_in_lists += 1;
          prev = p;
          p = next_free(p);

          if p == head {
            break;
          }
        }
      }

      assert_eq!(
        free_in_walk, free_in_lists,
        "free blocks in the heap walk and on the lists disagree"
      );
    }
  }

  /// Minimal per-block check: alignment, tag agreement, and (for free
  /// blocks) membership in the list for their size.
  fn check_block(
    &self,
    bp: *mut u8,
  ) {
    unsafe {
      assert!(bp as usize % WSIZE == 0, "{bp:?} is not word aligned");
      assert_eq!(
        get(header(bp)),
        get(footer(bp)),
        "header does not match footer at {bp:?}"
      );

      if !get_alloc(header(bp)) {
        let head = get(self.bucket_for(get_size(header(bp)))) as *mut u8;
        assert!(
          !head.is_null(),
          "free block {bp:?} has an empty size-class list"
        );

        let mut p = head;
        let mut found = false;

        loop {
          if p == bp {
            found = true;
            break;
          }

          p = next_free(p);
          if p == head {
            break;
          }
        }

        assert!(found, "free block {bp:?} is not in its free list");
      }
    }
  }
}

/// Prints one block: payload address, both tags, and the link words.
fn print_block(bp: *mut u8) {
  unsafe {
    let hsize = get_size(header(bp));
    let halloc = get_alloc(header(bp));

    if hsize == 0 {
      println!("{bp:?}: end of heap");
      return;
    }

    let fsize = get_size(footer(bp));
    let falloc = get_alloc(footer(bp));

    println!(
      "{bp:?}: header: [{hsize}:{}] footer: [{fsize}:{}] next: ({:?}) prev: ({:?})",
      if halloc { 'a' } else { 'f' },
      if falloc { 'a' } else { 'f' },
      next_free(bp),
      prev_free(bp),
    );
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::source::ArenaSource;
  use crate::tags::{put, set_tags};

  fn fresh() -> SegAllocator<ArenaSource> {
    unsafe { SegAllocator::init(ArenaSource::with_capacity(1 << 16)).expect("init") }
  }

  #[test]
  fn a_fresh_heap_passes() {
    fresh().check_heap(false);
  }

  #[test]
  fn a_busy_heap_passes() {
    let mut allocator = fresh();

    unsafe {
      let a = allocator.allocate(24);
      let _b = allocator.allocate(300);
      allocator.free(a);
    }

    allocator.check_heap(false);
  }

  #[test]
  #[should_panic(expected = "header does not match footer")]
  fn a_corrupted_footer_is_caught() {
    let mut allocator = fresh();

    unsafe {
      let bp = allocator.allocate(24);
      // Stomp the footer the way a payload overrun would.
      put(footer(bp), 0xDEAD);
    }

    allocator.check_heap(false);
  }

  #[test]
  #[should_panic(expected = "is not in its free list")]
  fn a_stranded_free_block_is_caught() {
    let mut allocator = fresh();

    unsafe {
      let a = allocator.allocate(24);
      let b = allocator.allocate(24);
      let _c = allocator.allocate(24);

      // Put one block of the same class on its list, then clear the
      // alloc bit of another behind the allocator's back: that block is
      // free but on no list.
      allocator.free(b);

      let size = get_size(header(a));
      set_tags(a, size, false);
    }

    allocator.check_heap(false);
  }
}
