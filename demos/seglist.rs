use std::io::Read;

use libc::sbrk;
use segalloc::{SbrkSource, SegAllocator};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break using `sbrk(0)`.
/// The program break is the upper boundary of the heap managed via brk/sbrk.
unsafe fn print_program_break(label: &str) {
  println!(
    "[{}] PID = {}, program break (sbrk(0)) = {:?}",
    label,
    std::process::id(),
    unsafe { sbrk(0) },
  );
}

fn main() {
  unsafe {
    // Initial heap state, before the allocator claims anything.
    print_program_break("start");
    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 0) Initialize: prologue with the size-class table, epilogue, and one
    //    2 KiB chunk carved out of the program break.
    // --------------------------------------------------------------------
    let mut allocator = SegAllocator::init(SbrkSource).expect("sbrk refused to grow the heap");
    println!("\n[0] Heap initialized");
    print_program_break("after init");
    allocator.check_heap(true);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 1) Allocate 24 bytes and write a pattern to show the block is usable.
    // --------------------------------------------------------------------
    let first = allocator.allocate(24);
    println!("\n[1] Allocate 24 bytes -> {first:?}");

    let first_words = first as *mut u64;
    first_words.write(0xDEADBEEF);
    println!("[1] Value written to first block = 0x{:X}", first_words.read());

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 2) Allocate two more blocks. All three come from the initial chunk,
    //    so the program break does not move.
    // --------------------------------------------------------------------
    let second = allocator.allocate(100);
    let third = allocator.allocate(48);
    println!("\n[2] Allocate 100 bytes -> {second:?}");
    println!("[2] Allocate 48 bytes  -> {third:?}");
    print_program_break("after three allocations");
    allocator.check_heap(true);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 3) Free the middle block. It lands on the free list of its size
    //    class and waits there for a matching request.
    // --------------------------------------------------------------------
    allocator.free(second);
    println!("\n[3] Freed the 100-byte block at {second:?}");
    allocator.check_heap(true);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 4) Allocate 100 bytes again and watch the freed block come back.
    // --------------------------------------------------------------------
    let reused = allocator.allocate(100);
    println!("\n[4] Allocate 100 bytes -> {reused:?}");
    println!(
      "[4] reused == second? {}",
      if reused == second {
        "Yes, the freed block was recycled"
      } else {
        "No, it was placed somewhere else"
      }
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 5) Grow the last block in place: its right neighbour is the free
    //    tail of the chunk, so no bytes move.
    // --------------------------------------------------------------------
    let third_words = third as *mut u64;
    third_words.write(0x1122334455667788);

    let grown = allocator.reallocate(third, 200);
    println!("\n[5] Reallocate 48 -> 200 bytes: {third:?} -> {grown:?}");
    println!(
      "[5] Payload preserved = 0x{:X}, grown in place: {}",
      (grown as *mut u64).read(),
      grown == third,
    );

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 6) Allocate a large block to observe heap growth.
    //    This changes the result of `sbrk(0)`.
    // --------------------------------------------------------------------
    print_program_break("before large alloc");

    let big = allocator.allocate(64 * 1024);
    println!("\n[6] Allocate large 64 KiB block -> {big:?}");

    print_program_break("after large alloc");
    allocator.check_heap(true);

    block_until_enter_pressed();

    // --------------------------------------------------------------------
    // 7) End of demo.
    //
    //    The allocator never returns memory to the OS; the region is
    //    reclaimed when the process exits.
    // --------------------------------------------------------------------
    println!("\n[7] End of example. Process will exit and the OS will reclaim all memory.");
  }
}
