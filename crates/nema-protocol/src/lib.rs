//! NEMA GPU guest/host ABI.
//!
//! Source of truth is the guest driver's command encoder: records are little-endian with natural
//! C alignment, and a command list is a fixed array of records followed by a one-byte count.
#![forbid(unsafe_code)]

pub mod cmd_writer;
pub mod nema_cmd;
pub mod nema_regs;

pub use cmd_writer::NemaCmdListWriter;
pub use nema_cmd::{
    decode_cmd_list_le, NemaBlendFlags, NemaBlendTarget, NemaCmdDecodeError, NemaCmdList,
    NemaCmdOpcode, NemaCmdRecord, NemaCommand, NemaRegion, NemaTexSlot, NEMA_CMD_LIST_COUNT_OFFSET,
    NEMA_CMD_LIST_SIZE_BYTES, NEMA_MAX_CMD_COUNT,
};
