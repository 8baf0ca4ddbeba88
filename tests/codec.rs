//! Whole-VM snapshot round-trips through the public API, covering a VM
//! that has actually executed a few instructions rather than a freshly
//! constructed one.

use vm16::{RunStatus, Vm};

fn word(opcode: u8, mode1: u8, mode2: u8) -> u16 {
    ((opcode as u16) << 10) | ((mode1 as u16) << 5) | mode2 as u16
}

#[test]
fn binary_snapshot_preserves_a_mid_run_vm() {
    let mut vm = Vm::new(1);
    vm.poke(0, word(0x08, 0x00, 0x10)); // MOVE A, CNST
    vm.poke(1, 0x4242);
    vm.poke(2, word(0x1A, 0x10, 0)); // PUSH CNST
    vm.poke(3, 0x0007);
    vm.run(2);

    let snapshot = vm.to_snapshot_bytes();
    let mut restored = Vm::new(1);
    restored.from_snapshot_bytes(&snapshot).unwrap();

    assert_eq!(restored.a(), vm.a());
    assert_eq!(restored.sp(), vm.sp());
    assert_eq!(restored.get_pc(), vm.get_pc());
    assert_eq!(restored.peek(0), vm.peek(0));
}

#[test]
fn hex_snapshot_is_restorable_into_a_fresh_vm_of_the_same_size() {
    let mut vm = Vm::new(2);
    vm.poke(5, 0x9999);
    vm.set_pc(5);
    let hex = vm.to_snapshot_hex();

    let mut restored = Vm::new(2);
    restored.from_snapshot_hex(&hex).unwrap();
    assert_eq!(restored.get_pc(), 5);
    assert_eq!(restored.peek(5), 0x9999);
}

#[test]
fn restoring_into_a_differently_sized_vm_is_rejected() {
    let vm = Vm::new(0);
    let snapshot = vm.to_snapshot_bytes();

    let mut bigger = Vm::new(1);
    let err = bigger.from_snapshot_bytes(&snapshot).unwrap_err();
    assert!(err.to_string().contains("expected"));
}

#[test]
fn restore_always_resets_the_in_destination_to_a() {
    let mut vm = Vm::new(0);
    // IN B, CNST 0x01 latches p_in_dest on B.
    vm.poke(0, word(0x18, 0x01, 0x10));
    vm.poke(1, 0x01);
    let (status, _) = vm.run(1);
    assert_eq!(status, RunStatus::In);

    let snapshot = vm.to_snapshot_bytes();
    let mut restored = Vm::new(0);
    restored.from_snapshot_bytes(&snapshot).unwrap();
    // After restore, delivering input always lands in A, not B.
    restored.write_input(0x55);
    assert_eq!(restored.a(), 0x55);
    assert_eq!(restored.b(), 0);
}
