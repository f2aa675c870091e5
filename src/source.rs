//! # Heap Sources
//!
//! The allocator never talks to the operating system directly; it asks a
//! [`HeapSource`] for more bytes. A source hands out one contiguous,
//! monotonically growing region:
//!
//! ```text
//!   extend(n)                 extend(m)
//!      │                         │
//!      ▼                         ▼
//!   ┌──────────────────┬──────────────────┬─────────────
//!   │   first n bytes  │   next m bytes   │   ...
//!   └──────────────────┴──────────────────┴─────────────
//!   ▲                  ▲
//!   └─ returned first  └─ returned second (== first + n)
//! ```
//!
//! Two implementations are provided:
//!
//! - [`SbrkSource`] moves the program break with `sbrk(2)`, the same
//!   primitive a traditional `malloc` sits on. Use it when the allocator
//!   should manage real process memory.
//! - [`ArenaSource`] carves a fixed-capacity owned buffer. Use it for
//!   deterministic tests: every allocator gets its own private region, and
//!   exhaustion can be provoked at an exact byte count.

use std::ptr;

use libc::{c_void, intptr_t, sbrk};

use crate::tags::WSIZE;

/// A primitive that grows the managed region.
///
/// # Contract
///
/// - `extend(n)` returns the address of the first of `n` newly usable
///   bytes, or null when the source refuses to grow.
/// - Successive successful calls return contiguous addresses: the second
///   region starts exactly where the first ended.
/// - Returned addresses are word-aligned.
/// - The region never shrinks and is never handed out twice.
pub trait HeapSource {
  /// Grows the region by `incr` bytes.
  ///
  /// Returns the address of the first new byte, or null on failure. A
  /// failed call must leave the region unchanged.
  ///
  /// # Safety
  ///
  /// The caller must uphold single-threaded, non-reentrant use; the region
  /// behind the returned pointer is only valid for as long as the source
  /// itself is alive.
  unsafe fn extend(
    &mut self,
    incr: usize,
  ) -> *mut u8;
}

/// Grows the heap by moving the program break with `sbrk(2)`.
///
/// The contiguity contract holds only while nothing else in the process
/// moves the break; do not mix this source with another brk-based
/// allocator in the same process.
pub struct SbrkSource;

impl HeapSource for SbrkSource {
  unsafe fn extend(
    &mut self,
    incr: usize,
  ) -> *mut u8 {
    // sbrk returns the OLD program break (start of new memory) and
    // (void *)-1 on failure.
    let old_break = unsafe { sbrk(incr as intptr_t) };
    if old_break == usize::MAX as *mut c_void {
      return ptr::null_mut();
    }

    old_break as *mut u8
  }
}

/// Carves a fixed-capacity buffer owned by the source itself.
///
/// The buffer is allocated once up front; `extend` merely advances a
/// break offset through it and refuses requests past the end. Word-backed
/// storage keeps every returned address word-aligned.
pub struct ArenaSource {
  storage: Box<[usize]>,

  /// Bytes handed out so far; the arena's private program break.
  brk: usize,
}

impl ArenaSource {
  /// Creates an arena able to hand out at most `capacity` bytes
  /// (rounded up to a whole number of words).
  pub fn with_capacity(capacity: usize) -> Self {
    let words = capacity.div_ceil(WSIZE);

    Self {
      storage: vec![0usize; words].into_boxed_slice(),
      brk: 0,
    }
  }

  /// Total bytes this arena can hand out.
  pub fn capacity(&self) -> usize {
    self.storage.len() * WSIZE
  }

  /// Bytes handed out so far.
  pub fn in_use(&self) -> usize {
    self.brk
  }
}

impl HeapSource for ArenaSource {
  unsafe fn extend(
    &mut self,
    incr: usize,
  ) -> *mut u8 {
    if self.brk + incr > self.capacity() {
      return ptr::null_mut();
    }

    let first_new = unsafe { self.storage.as_mut_ptr().cast::<u8>().add(self.brk) };
    self.brk += incr;

    first_new
  }
}
