//! Safe command list builder for NEMA.
//!
//! Intended for tests, fixtures and host tooling that need to emit canonical list blocks: records
//! at their driver offsets, zeroed padding, and the valid-count byte.

use crate::nema_cmd::{
    NemaBlendFlags, NemaCmdOpcode, NemaCmdRecord, NemaRegion, NemaTexSlot,
    NEMA_CMD_LIST_COUNT_OFFSET, NEMA_CMD_LIST_SIZE_BYTES, NEMA_MAX_CMD_COUNT,
};

#[derive(Debug, Default, Clone)]
pub struct NemaCmdListWriter {
    records: Vec<NemaCmdRecord>,
    count_override: Option<u8>,
}

impl NemaCmdListWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a raw record. Panics if the list is already full.
    pub fn push_record(&mut self, rec: NemaCmdRecord) {
        assert!(
            self.records.len() < NEMA_MAX_CMD_COUNT,
            "command list full ({NEMA_MAX_CMD_COUNT} records)"
        );
        self.records.push(rec);
    }

    /// Write `count` into the count byte instead of the number of pushed records.
    ///
    /// Lets fixtures describe malformed lists (e.g. a count past capacity).
    pub fn with_count_override(mut self, count: u8) -> Self {
        self.count_override = Some(count);
        self
    }

    fn push(&mut self, opcode: NemaCmdOpcode, f: impl FnOnce(&mut NemaCmdRecord)) {
        let mut rec = NemaCmdRecord {
            op: opcode as u8,
            ..Default::default()
        };
        f(&mut rec);
        self.push_record(rec);
    }

    pub fn bind_tex(&mut self, slot: NemaTexSlot, paddr: u32, width: u32, height: u32, stride: i32) {
        self.push(NemaCmdOpcode::BindTex, |r| {
            r.addr_a = paddr;
            r.u8_a = slot as u8;
            r.u32_a = width;
            r.u32_b = height;
            r.i32_a = stride;
        });
    }

    pub fn set_clip(&mut self, clip: NemaRegion) {
        self.push(NemaCmdOpcode::SetClip, |r| set_region(r, clip));
    }

    pub fn set_blend_fill(&mut self, flags: NemaBlendFlags) {
        self.push(NemaCmdOpcode::SetBlendFill, |r| r.u32_a = flags.bits());
    }

    pub fn set_blend_blit(&mut self, flags: NemaBlendFlags) {
        self.push(NemaCmdOpcode::SetBlendBlit, |r| r.u32_a = flags.bits());
    }

    pub fn set_const_color(&mut self, argb: u32) {
        self.push(NemaCmdOpcode::SetConstColor, |r| r.u32_a = argb);
    }

    pub fn draw_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, width: u32, argb: u32) {
        self.push(NemaCmdOpcode::DrawLine, |r| {
            r.i32_a = x0;
            r.i32_b = y0;
            r.i32_c = x1;
            r.i32_d = y1;
            r.u32_a = width;
            r.u32_b = argb;
        });
    }

    pub fn blit(&mut self) {
        self.push(NemaCmdOpcode::Blit, |_| {});
    }

    pub fn fill_rect(&mut self, rect: NemaRegion, argb: u32) {
        self.push(NemaCmdOpcode::FillRect, |r| {
            set_region(r, rect);
            r.u32_c = argb;
        });
    }

    pub fn draw_rect(&mut self, rect: NemaRegion, argb: u32) {
        self.push(NemaCmdOpcode::DrawRect, |r| {
            set_region(r, rect);
            r.u32_c = argb;
        });
    }

    pub fn fill_rect_rounded(&mut self, rect: NemaRegion, radius: i32, argb: u32) {
        self.push(NemaCmdOpcode::FillRectRounded, |r| {
            set_region(r, rect);
            r.i32_c = radius;
            r.u32_c = argb;
        });
    }

    pub fn draw_rect_rounded(&mut self, rect: NemaRegion, radius: i32, argb: u32) {
        self.push(NemaCmdOpcode::DrawRectRounded, |r| {
            set_region(r, rect);
            r.i32_c = radius;
            r.u32_c = argb;
        });
    }

    /// Emit the full `NEMA_CMD_LIST_SIZE_BYTES` block.
    pub fn finish(self) -> Vec<u8> {
        let mut buf = vec![0u8; NEMA_CMD_LIST_SIZE_BYTES];
        for (i, rec) in self.records.iter().enumerate() {
            rec.encode_le(&mut buf[i * NemaCmdRecord::SIZE_BYTES..]);
        }
        buf[NEMA_CMD_LIST_COUNT_OFFSET] = self
            .count_override
            .unwrap_or(self.records.len() as u8);
        buf
    }
}

fn set_region(r: &mut NemaCmdRecord, region: NemaRegion) {
    r.i32_a = region.x;
    r.i32_b = region.y;
    r.u32_a = region.w;
    r.u32_b = region.h;
}
