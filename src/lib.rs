//! # segalloc - A Segregated Free-List Memory Allocator
//!
//! This crate provides a classic **segregated free-list allocator** with
//! boundary-tag coalescing, managing one contiguous region obtained from a
//! pluggable heap source (`sbrk` in production, an owned arena in tests).
//!
//! ## Overview
//!
//! Freed memory is recycled through sixteen size-class lists before the
//! region is ever grown:
//!
//! ```text
//!   Segregated Free Lists Concept:
//!
//!   ┌──────────────────────────────────────────────────────────────────────┐
//!   │                         MANAGED REGION                               │
//!   │                                                                      │
//!   │   ┌────────┬──────┬──────┬──────┬──────┬──────┬──────────┬────────┐  │
//!   │   │prologue│ A1   │ free │ A2   │ free │ A3   │   free   │epilogue│  │
//!   │   │+ table │      │  ▲   │      │  ▲   │      │    ▲     │        │  │
//!   │   └────────┴──────┴──┼───┴──────┴──┼───┴──────┴────┼─────┴────────┘  │
//!   │        │             │             │               │                 │
//!   │        │        ┌────┴─────────────┴───┐      ┌────┴────┐            │
//!   │        └───────►│ class 5: 32..63 B    │      │ class 9 │            │
//!   │                 └──────────────────────┘      └─────────┘            │
//!   │                                                                      │
//!   │   Free blocks are the list nodes; the class table lives in the       │
//!   │   prologue block.                                                    │
//!   └──────────────────────────────────────────────────────────────────────┘
//!
//!   Allocation: index by size class, detach a fit, split the remainder.
//!   Free: flip the tags, merge with free neighbours, re-insert. All O(1)
//!   except the first-fit scan of the saturating top class.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   segalloc
//!   ├── align      - Alignment macros (align!, align_to!)
//!   ├── tags       - Boundary-tag words and block arithmetic (unsafe core)
//!   ├── source     - HeapSource trait, SbrkSource, ArenaSource
//!   ├── seglist    - SegAllocator: allocate / free / reallocate
//!   └── check      - Heap consistency checker (feature "check")
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use segalloc::{ArenaSource, SegAllocator};
//!
//! fn main() {
//!     unsafe {
//!         // One megabyte of private heap.
//!         let source = ArenaSource::with_capacity(1 << 20);
//!         let mut allocator = SegAllocator::init(source).unwrap();
//!
//!         let ptr = allocator.allocate(64) as *mut u64;
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!
//!         // Grow it; the allocator absorbs a neighbour or moves the bytes.
//!         let ptr = allocator.reallocate(ptr as *mut u8, 256);
//!
//!         allocator.free(ptr);
//!     }
//! }
//! ```
//!
//! ## How It Works
//!
//! Every block carries a header and a footer word packing `size | alloc`:
//!
//! ```text
//!   Single Block:
//!   ┌────────┬────────┬───────────────────────────┬────────┬────────┐
//!   │ header │  link  │         payload           │ footer │  prev  │
//!   │ size|a │ (next) │                           │ size|a │  link  │
//!   └────────┴────────┴───────────────────────────┴────────┴────────┘
//!                     ▲
//!                     └── Pointer returned to the user (word aligned)
//! ```
//!
//! The mirrored footer lets the allocator step to the *previous* block in
//! O(1), which is what makes immediate boundary-tag coalescing cheap. While
//! a block is free, its link words thread it onto the circular
//! doubly-linked list of its size class; while it is allocated, those words
//! are dead storage and the payload owns the space.
//!
//! Growth is delegated to a [`HeapSource`]:
//!
//! ```text
//!   Program Memory Layout (SbrkSource):
//!
//!   High Address ┌─────────────────────┐
//!                │       Stack         │ ↓ grows down
//!                │         │           │
//!                │         ▼           │
//!                │                     │
//!                │         ▲           │
//!                │         │           │
//!                │       Heap          │ ↑ grows up (sbrk)
//!                ├─────────────────────┤ ← Program Break
//!                │   Uninitialized     │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │   Initialized       │
//!                │       Data          │
//!                ├─────────────────────┤
//!                │       Text          │
//!   Low Address  └─────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Segregated fits**: sixteen size classes indexed by `⌊log₂(size)⌋`
//! - **Boundary-tag coalescing**: freed blocks merge with free neighbours
//!   immediately, in O(1)
//! - **In-place reallocation**: growth absorbs free neighbours before it
//!   ever copies
//! - **Pluggable heap source**: `sbrk` for real heaps, an owned arena for
//!   deterministic tests
//! - **Consistency checker**: a full heap and free-list audit behind the
//!   `check` feature
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives
//! - **Memory is never returned**: the region grows monotonically
//! - **`SbrkSource` is Unix-only**: requires `libc` and `sbrk`, and nothing
//!   else in the process may move the program break
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All allocation and deallocation operations require `unsafe` blocks.

pub mod align;
mod check;
mod seglist;
mod source;
mod tags;

pub use seglist::SegAllocator;
pub use source::{ArenaSource, HeapSource, SbrkSource};
pub use tags::{CHUNKSIZE, DSIZE, MIN_BLOCK, NUM_CLASSES, WSIZE};
