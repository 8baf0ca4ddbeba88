//! H16 text format round-trips through the public API.

use vm16::Vm;

#[test]
fn round_trips_multiple_sparse_blocks() {
    let mut vm = Vm::new(1); // 128 words, 16 blocks of 8
    vm.poke(0, 0x1111);
    vm.poke(100, 0x2222);
    vm.poke(127, 0x3333);
    let text = vm.to_h16();
    assert!(text.ends_with(":00000FF"));

    let mut restored = Vm::new(1);
    restored.load_h16(&text).unwrap();
    assert_eq!(restored.peek(0), 0x1111);
    assert_eq!(restored.peek(100), 0x2222);
    assert_eq!(restored.peek(127), 0x3333);
    assert_eq!(restored.peek(50), 0);
}

#[test]
fn an_all_zero_vm_produces_only_the_terminator_line() {
    let vm = Vm::new(0);
    assert_eq!(vm.to_h16(), ":00000FF");
}

#[test]
fn buffer_len_upper_bounds_the_rendered_text() {
    let mut vm = Vm::new(0);
    for addr in 0..64u16 {
        vm.poke(addr, addr);
    }
    let text = vm.to_h16();
    assert!(text.len() <= vm.h16_buffer_len());
}

#[test]
fn trailing_garbage_after_the_terminator_is_ignored() {
    let mut vm = Vm::new(0);
    vm.load_h16(":00000FF\n:8000000deadbeef0000000000000000000000000\n").unwrap();
    assert_eq!(vm.peek(0), 0);
}
