//! NEMA command record and command list layouts.

use core::fmt;
use core::mem::{offset_of, size_of};

use bitflags::bitflags;
use thiserror::Error;

/// Maximum number of records in one command list.
pub const NEMA_MAX_CMD_COUNT: usize = 250;

/// One guest command record, laid out exactly as the driver's C struct.
///
/// Field meaning depends on [`NemaCmdRecord::op`]; see [`NemaCommand::decode`].
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NemaCmdRecord {
    pub op: u8,
    pub addr_a: u32,
    pub addr_b: u32,
    pub u8_a: u8,
    pub u32_a: u32,
    pub u32_b: u32,
    pub u32_c: u32,
    pub i32_a: i32,
    pub i32_b: i32,
    pub i32_c: i32,
    pub i32_d: i32,
}

pub const CMD_OP_OFFSET: usize = offset_of!(NemaCmdRecord, op);
pub const CMD_ADDR_A_OFFSET: usize = offset_of!(NemaCmdRecord, addr_a);
pub const CMD_ADDR_B_OFFSET: usize = offset_of!(NemaCmdRecord, addr_b);
pub const CMD_U8_A_OFFSET: usize = offset_of!(NemaCmdRecord, u8_a);
pub const CMD_U32_A_OFFSET: usize = offset_of!(NemaCmdRecord, u32_a);
pub const CMD_U32_B_OFFSET: usize = offset_of!(NemaCmdRecord, u32_b);
pub const CMD_U32_C_OFFSET: usize = offset_of!(NemaCmdRecord, u32_c);
pub const CMD_I32_A_OFFSET: usize = offset_of!(NemaCmdRecord, i32_a);
pub const CMD_I32_B_OFFSET: usize = offset_of!(NemaCmdRecord, i32_b);
pub const CMD_I32_C_OFFSET: usize = offset_of!(NemaCmdRecord, i32_c);
pub const CMD_I32_D_OFFSET: usize = offset_of!(NemaCmdRecord, i32_d);

/// Offset of the valid-count byte that follows the record array.
pub const NEMA_CMD_LIST_COUNT_OFFSET: usize = NEMA_MAX_CMD_COUNT * NemaCmdRecord::SIZE_BYTES;

/// Size of the command list block the device snapshots on every submission.
pub const NEMA_CMD_LIST_SIZE_BYTES: usize = (NEMA_CMD_LIST_COUNT_OFFSET + 1).next_multiple_of(4);

// Compile-time layout assertions against the driver ABI.
const _: () = {
    assert!(size_of::<NemaCmdRecord>() == NemaCmdRecord::SIZE_BYTES);
    assert!(CMD_ADDR_A_OFFSET == 4);
    assert!(CMD_U8_A_OFFSET == 12);
    assert!(CMD_U32_A_OFFSET == 16);
    assert!(CMD_I32_D_OFFSET == 40);
    assert!(NEMA_CMD_LIST_SIZE_BYTES == 11_004);
};

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([buf[offset], buf[offset + 1], buf[offset + 2], buf[offset + 3]])
}

#[inline]
fn write_u32(buf: &mut [u8], offset: usize, v: u32) {
    buf[offset..offset + 4].copy_from_slice(&v.to_le_bytes());
}

impl NemaCmdRecord {
    pub const SIZE_BYTES: usize = 44;

    pub fn decode_from_le_bytes(buf: &[u8]) -> Result<Self, NemaCmdDecodeError> {
        if buf.len() < Self::SIZE_BYTES {
            return Err(NemaCmdDecodeError::BufferTooSmall {
                needed: Self::SIZE_BYTES,
                found: buf.len(),
            });
        }

        Ok(Self {
            op: buf[CMD_OP_OFFSET],
            addr_a: read_u32(buf, CMD_ADDR_A_OFFSET),
            addr_b: read_u32(buf, CMD_ADDR_B_OFFSET),
            u8_a: buf[CMD_U8_A_OFFSET],
            u32_a: read_u32(buf, CMD_U32_A_OFFSET),
            u32_b: read_u32(buf, CMD_U32_B_OFFSET),
            u32_c: read_u32(buf, CMD_U32_C_OFFSET),
            i32_a: read_u32(buf, CMD_I32_A_OFFSET) as i32,
            i32_b: read_u32(buf, CMD_I32_B_OFFSET) as i32,
            i32_c: read_u32(buf, CMD_I32_C_OFFSET) as i32,
            i32_d: read_u32(buf, CMD_I32_D_OFFSET) as i32,
        })
    }

    /// Encode into `out[..SIZE_BYTES]`. Padding bytes are zeroed.
    pub fn encode_le(&self, out: &mut [u8]) {
        let out = &mut out[..Self::SIZE_BYTES];
        out.fill(0);
        out[CMD_OP_OFFSET] = self.op;
        write_u32(out, CMD_ADDR_A_OFFSET, self.addr_a);
        write_u32(out, CMD_ADDR_B_OFFSET, self.addr_b);
        out[CMD_U8_A_OFFSET] = self.u8_a;
        write_u32(out, CMD_U32_A_OFFSET, self.u32_a);
        write_u32(out, CMD_U32_B_OFFSET, self.u32_b);
        write_u32(out, CMD_U32_C_OFFSET, self.u32_c);
        write_u32(out, CMD_I32_A_OFFSET, self.i32_a as u32);
        write_u32(out, CMD_I32_B_OFFSET, self.i32_b as u32);
        write_u32(out, CMD_I32_C_OFFSET, self.i32_c as u32);
        write_u32(out, CMD_I32_D_OFFSET, self.i32_d as u32);
    }
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NemaCmdOpcode {
    BindTex = 1,
    SetClip = 2,
    SetBlendBlit = 3,
    SetBlendFill = 4,
    SetConstColor = 5,
    DrawLine = 6,
    Blit = 7,
    FillRect = 8,
    DrawRect = 9,
    FillRectRounded = 10,
    DrawRectRounded = 11,
}

impl NemaCmdOpcode {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::BindTex),
            2 => Some(Self::SetClip),
            3 => Some(Self::SetBlendBlit),
            4 => Some(Self::SetBlendFill),
            5 => Some(Self::SetConstColor),
            6 => Some(Self::DrawLine),
            7 => Some(Self::Blit),
            8 => Some(Self::FillRect),
            9 => Some(Self::DrawRect),
            10 => Some(Self::FillRectRounded),
            11 => Some(Self::DrawRectRounded),
            _ => None,
        }
    }

    /// Whether the opcode consumes the pipeline bindings.
    pub const fn is_draw(self) -> bool {
        matches!(
            self,
            Self::DrawLine
                | Self::Blit
                | Self::FillRect
                | Self::DrawRect
                | Self::FillRectRounded
                | Self::DrawRectRounded
        )
    }
}

/// Texture unit selected by `BIND_TEX`.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NemaTexSlot {
    /// Render target, ARGB8888.
    Destination = 0,
    /// Blit source, ARGB8888.
    Source = 1,
    /// Coverage mask, A8.
    Mask = 3,
}

impl NemaTexSlot {
    pub const fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(Self::Destination),
            1 => Some(Self::Source),
            3 => Some(Self::Mask),
            _ => None,
        }
    }
}

bitflags! {
    /// Blend mode bits set by `SET_BLEND_FILL` / `SET_BLEND_BLIT`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct NemaBlendFlags: u32 {
        const SIMPLE = 0x1;
        const HAS_MASK = 0x2;
        const HAS_OPACITY = 0x4;
    }
}

/// Which blend command last configured the pipeline.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NemaBlendTarget {
    #[default]
    Fill,
    Blit,
}

/// Axis-aligned region in destination pixel coordinates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NemaRegion {
    pub x: i32,
    pub y: i32,
    pub w: u32,
    pub h: u32,
}

impl NemaRegion {
    pub const fn new(x: i32, y: i32, w: u32, h: u32) -> Self {
        Self { x, y, w, h }
    }
}

impl fmt::Display for NemaRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@({},{})", self.w, self.h, self.x, self.y)
    }
}

/// A record validated against the closed opcode / slot vocabularies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NemaCommand {
    BindTex {
        slot: NemaTexSlot,
        paddr: u32,
        width: u32,
        height: u32,
        stride: i32,
    },
    SetClip(NemaRegion),
    SetBlend {
        target: NemaBlendTarget,
        flags: NemaBlendFlags,
    },
    SetConstColor {
        argb: u32,
    },
    DrawLine {
        x0: i32,
        y0: i32,
        x1: i32,
        y1: i32,
        width: u32,
        argb: u32,
    },
    Blit,
    FillRect {
        rect: NemaRegion,
        argb: u32,
    },
    DrawRect {
        rect: NemaRegion,
        argb: u32,
    },
    FillRectRounded {
        rect: NemaRegion,
        radius: i32,
        argb: u32,
    },
    DrawRectRounded {
        rect: NemaRegion,
        radius: i32,
        argb: u32,
    },
}

impl NemaCommand {
    pub fn decode(rec: &NemaCmdRecord) -> Result<Self, NemaCmdDecodeError> {
        let opcode = NemaCmdOpcode::from_u8(rec.op)
            .ok_or(NemaCmdDecodeError::UnknownOpcode { found: rec.op })?;
        let rect = NemaRegion::new(rec.i32_a, rec.i32_b, rec.u32_a, rec.u32_b);

        Ok(match opcode {
            NemaCmdOpcode::BindTex => Self::BindTex {
                slot: NemaTexSlot::from_u8(rec.u8_a)
                    .ok_or(NemaCmdDecodeError::InvalidTexSlot { found: rec.u8_a })?,
                paddr: rec.addr_a,
                width: rec.u32_a,
                height: rec.u32_b,
                stride: rec.i32_a,
            },
            NemaCmdOpcode::SetClip => Self::SetClip(rect),
            NemaCmdOpcode::SetBlendBlit => Self::SetBlend {
                target: NemaBlendTarget::Blit,
                flags: NemaBlendFlags::from_bits_retain(rec.u32_a),
            },
            NemaCmdOpcode::SetBlendFill => Self::SetBlend {
                target: NemaBlendTarget::Fill,
                flags: NemaBlendFlags::from_bits_retain(rec.u32_a),
            },
            NemaCmdOpcode::SetConstColor => Self::SetConstColor { argb: rec.u32_a },
            NemaCmdOpcode::DrawLine => Self::DrawLine {
                x0: rec.i32_a,
                y0: rec.i32_b,
                x1: rec.i32_c,
                y1: rec.i32_d,
                width: rec.u32_a,
                argb: rec.u32_b,
            },
            NemaCmdOpcode::Blit => Self::Blit,
            NemaCmdOpcode::FillRect => Self::FillRect {
                rect,
                argb: rec.u32_c,
            },
            NemaCmdOpcode::DrawRect => Self::DrawRect {
                rect,
                argb: rec.u32_c,
            },
            NemaCmdOpcode::FillRectRounded => Self::FillRectRounded {
                rect,
                radius: rec.i32_c,
                argb: rec.u32_c,
            },
            NemaCmdOpcode::DrawRectRounded => Self::DrawRectRounded {
                rect,
                radius: rec.i32_c,
                argb: rec.u32_c,
            },
        })
    }

    pub fn opcode(&self) -> NemaCmdOpcode {
        match self {
            Self::BindTex { .. } => NemaCmdOpcode::BindTex,
            Self::SetClip(_) => NemaCmdOpcode::SetClip,
            Self::SetBlend {
                target: NemaBlendTarget::Blit,
                ..
            } => NemaCmdOpcode::SetBlendBlit,
            Self::SetBlend {
                target: NemaBlendTarget::Fill,
                ..
            } => NemaCmdOpcode::SetBlendFill,
            Self::SetConstColor { .. } => NemaCmdOpcode::SetConstColor,
            Self::DrawLine { .. } => NemaCmdOpcode::DrawLine,
            Self::Blit => NemaCmdOpcode::Blit,
            Self::FillRect { .. } => NemaCmdOpcode::FillRect,
            Self::DrawRect { .. } => NemaCmdOpcode::DrawRect,
            Self::FillRectRounded { .. } => NemaCmdOpcode::FillRectRounded,
            Self::DrawRectRounded { .. } => NemaCmdOpcode::DrawRectRounded,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum NemaCmdDecodeError {
    #[error("buffer too small: needed {needed} bytes, found {found}")]
    BufferTooSmall { needed: usize, found: usize },
    #[error("unknown opcode {found}")]
    UnknownOpcode { found: u8 },
    #[error("invalid texture slot {found}")]
    InvalidTexSlot { found: u8 },
    #[error("command list count {count} exceeds capacity {NEMA_MAX_CMD_COUNT}")]
    TooManyCommands { count: usize },
}

/// The valid prefix of a snapshotted command list block.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NemaCmdList {
    pub records: Vec<NemaCmdRecord>,
}

impl NemaCmdList {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Decode a full command list block (`NEMA_CMD_LIST_SIZE_BYTES`).
///
/// Only the first `count` records are decoded; stale records past the count are never looked at.
pub fn decode_cmd_list_le(buf: &[u8]) -> Result<NemaCmdList, NemaCmdDecodeError> {
    if buf.len() < NEMA_CMD_LIST_SIZE_BYTES {
        return Err(NemaCmdDecodeError::BufferTooSmall {
            needed: NEMA_CMD_LIST_SIZE_BYTES,
            found: buf.len(),
        });
    }

    let count = usize::from(buf[NEMA_CMD_LIST_COUNT_OFFSET]);
    if count > NEMA_MAX_CMD_COUNT {
        return Err(NemaCmdDecodeError::TooManyCommands { count });
    }

    let records = buf[..count * NemaCmdRecord::SIZE_BYTES]
        .chunks_exact(NemaCmdRecord::SIZE_BYTES)
        .map(NemaCmdRecord::decode_from_le_bytes)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(NemaCmdList { records })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_record() -> NemaCmdRecord {
        NemaCmdRecord {
            op: NemaCmdOpcode::DrawLine as u8,
            addr_a: 0x2200_0000,
            addr_b: 0xdead_beef,
            u8_a: 3,
            u32_a: 2,
            u32_b: 0xff00_ff00,
            u32_c: 7,
            i32_a: -1,
            i32_b: 2,
            i32_c: -3,
            i32_d: 4,
        }
    }

    #[test]
    fn record_fields_land_at_driver_offsets() {
        let mut buf = [0xAAu8; NemaCmdRecord::SIZE_BYTES];
        sample_record().encode_le(&mut buf);

        assert_eq!(buf[0], 6);
        assert_eq!(&buf[1..4], &[0, 0, 0], "padding after op is zeroed");
        assert_eq!(&buf[4..8], &0x2200_0000u32.to_le_bytes());
        assert_eq!(buf[12], 3);
        assert_eq!(&buf[28..32], &(-1i32).to_le_bytes());
        assert_eq!(&buf[40..44], &4i32.to_le_bytes());

        assert_eq!(NemaCmdRecord::decode_from_le_bytes(&buf).unwrap(), sample_record());
    }

    #[test]
    fn draw_line_fields_map_to_endpoints() {
        let cmd = NemaCommand::decode(&sample_record()).unwrap();
        assert_eq!(
            cmd,
            NemaCommand::DrawLine {
                x0: -1,
                y0: 2,
                x1: -3,
                y1: 4,
                width: 2,
                argb: 0xff00_ff00,
            }
        );
        assert_eq!(cmd.opcode(), NemaCmdOpcode::DrawLine);
    }

    #[test]
    fn unknown_opcodes_and_slots_are_rejected() {
        for op in [0u8, 12, 0xff] {
            let rec = NemaCmdRecord {
                op,
                ..Default::default()
            };
            assert_eq!(
                NemaCommand::decode(&rec),
                Err(NemaCmdDecodeError::UnknownOpcode { found: op })
            );
        }

        for slot in [2u8, 4, 0xff] {
            let rec = NemaCmdRecord {
                op: NemaCmdOpcode::BindTex as u8,
                u8_a: slot,
                ..Default::default()
            };
            assert_eq!(
                NemaCommand::decode(&rec),
                Err(NemaCmdDecodeError::InvalidTexSlot { found: slot })
            );
        }
    }

    #[test]
    fn blend_flags_keep_unknown_bits() {
        let rec = NemaCmdRecord {
            op: NemaCmdOpcode::SetBlendBlit as u8,
            u32_a: 0x6 | 0x100,
            ..Default::default()
        };
        let NemaCommand::SetBlend { target, flags } = NemaCommand::decode(&rec).unwrap() else {
            panic!("expected SetBlend");
        };
        assert_eq!(target, NemaBlendTarget::Blit);
        assert!(flags.contains(NemaBlendFlags::HAS_MASK | NemaBlendFlags::HAS_OPACITY));
        assert!(!flags.contains(NemaBlendFlags::SIMPLE));
        assert_eq!(flags.bits(), 0x106);
    }

    #[test]
    fn list_decode_reads_only_the_valid_prefix() {
        let mut block = vec![0u8; NEMA_CMD_LIST_SIZE_BYTES];
        sample_record().encode_le(&mut block[0..]);
        // A garbage record past the count must never be decoded.
        block[NemaCmdRecord::SIZE_BYTES] = 0xff;
        block[NEMA_CMD_LIST_COUNT_OFFSET] = 1;

        let list = decode_cmd_list_le(&block).unwrap();
        assert_eq!(list.records, vec![sample_record()]);
    }

    #[test]
    fn list_decode_bounds() {
        let mut block = vec![0u8; NEMA_CMD_LIST_SIZE_BYTES];
        assert!(decode_cmd_list_le(&block).unwrap().is_empty());

        block[NEMA_CMD_LIST_COUNT_OFFSET] = 250;
        assert_eq!(decode_cmd_list_le(&block).unwrap().len(), 250);

        block[NEMA_CMD_LIST_COUNT_OFFSET] = 251;
        assert_eq!(
            decode_cmd_list_le(&block),
            Err(NemaCmdDecodeError::TooManyCommands { count: 251 })
        );

        assert!(matches!(
            decode_cmd_list_le(&block[..100]),
            Err(NemaCmdDecodeError::BufferTooSmall { .. })
        ));
    }
}
