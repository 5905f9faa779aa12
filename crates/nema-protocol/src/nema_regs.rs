//! NEMA register window and board memory map.

use crate::nema_cmd::NEMA_CMD_LIST_SIZE_BYTES;

/// Base of the NEMA device region in guest physical memory.
pub const NEMA_MEM_BASE: u64 = 0x2200_0000;

/// Size of the RAM-backed framebuffer window at the start of the device region.
pub const NEMA_FB_SIZE: u64 = 2 * 1024 * 1024;

/// Size of the NEMA register window, which follows the framebuffer.
pub const NEMA_MMIO_SIZE: u64 = 0x1000;

/// Guest physical address of the register window.
pub const NEMA_MMIO_BASE: u64 = NEMA_MEM_BASE + NEMA_FB_SIZE;

/// Guest physical address of the command list block, right after the registers.
pub const NEMA_CMD_LIST_BASE: u64 = NEMA_MMIO_BASE + NEMA_MMIO_SIZE;

/// Size of the command list window.
pub const NEMA_CMD_LIST_WINDOW_SIZE: u64 = 0x4000;

const _: () = {
    assert!(NEMA_CMD_LIST_BASE == 0x2220_1000);
    assert!(NEMA_CMD_LIST_SIZE_BYTES as u64 <= NEMA_CMD_LIST_WINDOW_SIZE);
};

// Registers (byte offsets into the register window).
pub const REG_OP: u64 = 0x00;
pub const REG_SIG: u64 = 0x01;

// REG_OP values.
/// Single-command submission. Reserved; the device ignores it.
pub const OP_SUBMIT_CMD: u8 = 1;
pub const OP_SUBMIT_CMD_LIST: u8 = 2;

// REG_SIG values.
/// Acknowledge completion and lower the interrupt line.
pub const SIG_ACK: u8 = 3;

/// Exclusive lower bound of the read-only asset window.
pub const NEMA_ASSET_WINDOW_START: u64 = 0x1000_0000;
/// Exclusive upper bound of the read-only asset window.
pub const NEMA_ASSET_WINDOW_END: u64 = 0x2000_0000;
