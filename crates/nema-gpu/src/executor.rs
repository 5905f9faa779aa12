//! Command list dispatch.

use nema_protocol::{NemaCmdList, NemaCmdRecord, NemaCommand};

use crate::clip::ClipState;
use crate::compositor;
use crate::device::NemaStats;
use crate::error::{ListFault, NemaError};
use crate::pipeline::{DrawBindings, PipelineContext};
use crate::surface::SurfaceAcquirer;
use crate::vector::{self, PaintColor};

/// Runs one command list against a fresh [`PipelineContext`].
pub struct CommandListExecutor<'a> {
    acquirer: SurfaceAcquirer<'a>,
    clip: &'a mut ClipState,
    stats: &'a mut NemaStats,
    ctx: PipelineContext,
}

impl<'a> CommandListExecutor<'a> {
    pub fn new(acquirer: SurfaceAcquirer<'a>, clip: &'a mut ClipState, stats: &'a mut NemaStats) -> Self {
        Self {
            acquirer,
            clip,
            stats,
            ctx: PipelineContext::new(),
        }
    }

    /// Execute every record in order, stopping at the first fault.
    ///
    /// Effects of records before the faulting one stay committed.
    pub fn run(mut self, list: &NemaCmdList) -> Result<(), ListFault> {
        for (index, rec) in list.records.iter().enumerate() {
            if let Err(error) = self.execute_record(rec) {
                if let Err(err) = self.ctx.release_bindings() {
                    tracing::warn!(%err, "releasing bindings after fault failed");
                }
                return Err(ListFault::record(index, rec.op, error));
            }
            self.stats.records_executed += 1;
        }
        self.ctx.release_bindings().map_err(ListFault::list)
    }

    fn execute_record(&mut self, rec: &NemaCmdRecord) -> Result<(), NemaError> {
        let cmd = NemaCommand::decode(rec)?;
        self.execute(cmd)
    }

    pub fn execute(&mut self, cmd: NemaCommand) -> Result<(), NemaError> {
        match cmd {
            NemaCommand::BindTex {
                slot,
                paddr,
                width,
                height,
                stride,
            } => {
                let surface = self.acquirer.acquire(slot, paddr, width, height, stride)?;
                self.ctx.bind(slot, surface)
            }
            NemaCommand::SetClip(region) => {
                self.clip.set(region);
                Ok(())
            }
            NemaCommand::SetBlend { target, flags } => {
                tracing::trace!(?target, ?flags, "blend mode");
                self.ctx.set_blend(target, flags);
                Ok(())
            }
            NemaCommand::SetConstColor { argb } => {
                self.ctx.set_const_color(argb);
                Ok(())
            }
            draw => {
                let bindings = self.ctx.take_for_draw(self.clip)?;
                self.stats.draw_calls += 1;
                draw_with(bindings, draw)
            }
        }
    }
}

fn draw_with(mut b: DrawBindings, cmd: NemaCommand) -> Result<(), NemaError> {
    match cmd {
        NemaCommand::Blit => {
            let src = b.src.take().ok_or(NemaError::SourceNotBound)?;
            let mask = opacity_mask(&mut b);
            compositor::blit(&mut b.dst, b.clip, &src, mask.as_ref());
        }
        NemaCommand::FillRect { rect, argb } => {
            let mask = opacity_mask(&mut b);
            compositor::fill_rect(&mut b.dst, b.clip, rect, argb, mask.as_ref());
        }
        NemaCommand::DrawLine {
            x0,
            y0,
            x1,
            y1,
            width,
            argb,
        } => {
            let color = path_color(&b, argb, b.opacity)?;
            if let Some(mut target) = b.dst.drawable() {
                vector::draw_line(&mut target, b.clip, (x0, y0), (x1, y1), width, color);
            }
        }
        NemaCommand::DrawRect { rect, argb } => {
            let color = path_color(&b, argb, None)?;
            if let Some(mut target) = b.dst.drawable() {
                vector::draw_rect(&mut target, b.clip, rect, color);
            }
        }
        NemaCommand::FillRectRounded { rect, radius, argb } => {
            let color = path_color(&b, argb, None)?;
            if let Some(mut target) = b.dst.drawable() {
                vector::fill_rect_rounded(&mut target, b.clip, rect, radius, color);
            }
        }
        NemaCommand::DrawRectRounded { rect, radius, argb } => {
            let color = path_color(&b, argb, None)?;
            if let Some(mut target) = b.dst.drawable() {
                vector::draw_rect_rounded(&mut target, b.clip, rect, radius, color);
            }
        }
        NemaCommand::BindTex { .. }
        | NemaCommand::SetClip(_)
        | NemaCommand::SetBlend { .. }
        | NemaCommand::SetConstColor { .. } => {}
    }
    b.release()
}

fn opacity_mask(b: &mut DrawBindings) -> Option<crate::surface::Surface> {
    let mask = b.mask.take();
    match b.opacity {
        Some(opacity) => Some(compositor::apply_opacity(b.dst.layout(), mask, opacity)),
        None => mask,
    }
}

/// Only `DRAW_LINE` takes the opacity byte; rectangle shapes paint the command color as-is.
fn path_color(b: &DrawBindings, argb: u32, opacity: Option<u8>) -> Result<PaintColor, NemaError> {
    if b.mask.is_some() {
        return Err(NemaError::MaskedPathUnsupported);
    }
    Ok(PaintColor::new(argb, opacity))
}

/// Dump a command list record by record at TRACE level.
pub fn trace_cmd_list(list: &NemaCmdList) {
    tracing::trace!(count = list.len(), "command list");
    for (index, rec) in list.records.iter().enumerate() {
        tracing::trace!(
            index,
            op = rec.op,
            addr_a = format_args!("0x{:x}", rec.addr_a),
            addr_b = format_args!("0x{:x}", rec.addr_b),
            u8_a = rec.u8_a,
            u32_a = rec.u32_a,
            u32_b = rec.u32_b,
            u32_c = rec.u32_c,
            i32_a = rec.i32_a,
            i32_b = rec.i32_b,
            i32_c = rec.i32_c,
            i32_d = rec.i32_d,
            "command"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AssetWindow;
    use nema_protocol::{NemaBlendFlags, NemaCmdListWriter, NemaRegion, NemaTexSlot};
    use slate_memory::{shared, GuestMemory, MemoryView, SharedGuestMemory, SparseMemory};

    const DST: u32 = 0x1000;

    fn memory() -> (SharedGuestMemory, MemoryView, MemoryView) {
        let mem = shared(SparseMemory::new(0x10_0000).unwrap());
        let assets = MemoryView::new(shared(SparseMemory::new(0x1000).unwrap()));
        (mem.clone(), MemoryView::new(mem), assets)
    }

    fn run(
        primary: &MemoryView,
        assets: &MemoryView,
        clip: &mut ClipState,
        w: NemaCmdListWriter,
    ) -> (Result<(), ListFault>, NemaStats) {
        let list = nema_protocol::decode_cmd_list_le(&w.finish()).unwrap();
        let mut stats = NemaStats::default();
        let acquirer = SurfaceAcquirer::new(primary, assets, AssetWindow::default(), false);
        let result = CommandListExecutor::new(acquirer, clip, &mut stats).run(&list);
        (result, stats)
    }

    #[test]
    fn blend_state_carries_across_draws_in_one_list() {
        let (mem, primary, assets) = memory();
        let mut w = NemaCmdListWriter::new();
        w.set_clip(NemaRegion::new(0, 0, 2, 1));
        w.set_blend_fill(NemaBlendFlags::SIMPLE);
        w.bind_tex(NemaTexSlot::Destination, DST, 2, 1, 8);
        w.fill_rect(NemaRegion::new(0, 0, 1, 1), 0xff00_00ff);
        w.bind_tex(NemaTexSlot::Destination, DST, 2, 1, 8);
        w.fill_rect(NemaRegion::new(1, 0, 1, 1), 0xff00_ff00);

        let (result, stats) = run(&primary, &assets, &mut ClipState::new(), w);
        result.unwrap();
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.records_executed, 6);

        let mem = mem.borrow();
        assert_eq!(mem.read_u32_le(u64::from(DST)).unwrap(), 0xff00_00ff);
        assert_eq!(mem.read_u32_le(u64::from(DST) + 4).unwrap(), 0xff00_ff00);
    }

    #[test]
    fn bindings_do_not_survive_a_draw() {
        let (_mem, primary, assets) = memory();
        let mut w = NemaCmdListWriter::new();
        w.set_clip(NemaRegion::new(0, 0, 2, 2));
        w.bind_tex(NemaTexSlot::Destination, DST, 2, 2, 8);
        w.fill_rect(NemaRegion::new(0, 0, 2, 2), 0xffff_ffff);
        w.fill_rect(NemaRegion::new(0, 0, 2, 2), 0xffff_ffff);

        let (result, _) = run(&primary, &assets, &mut ClipState::new(), w);
        let fault = result.unwrap_err();
        assert_eq!(fault.index, Some(3));
        assert_eq!(fault.error, NemaError::DestinationNotBound);
    }

    #[test]
    fn blit_requires_a_source() {
        let (_mem, primary, assets) = memory();
        let mut w = NemaCmdListWriter::new();
        w.set_clip(NemaRegion::new(0, 0, 2, 2));
        w.bind_tex(NemaTexSlot::Destination, DST, 2, 2, 8);
        w.blit();

        let (result, stats) = run(&primary, &assets, &mut ClipState::new(), w);
        assert_eq!(result.unwrap_err().error, NemaError::SourceNotBound);
        assert_eq!(stats.records_executed, 2);
    }

    #[test]
    fn masked_path_drawing_is_rejected() {
        let (_mem, primary, assets) = memory();
        let mut w = NemaCmdListWriter::new();
        w.set_clip(NemaRegion::new(0, 0, 4, 4));
        w.set_blend_fill(NemaBlendFlags::HAS_MASK);
        w.bind_tex(NemaTexSlot::Destination, DST, 4, 4, 16);
        w.bind_tex(NemaTexSlot::Mask, 0x8000, 4, 4, 4);
        w.draw_line(0, 0, 3, 3, 1, 0xffff_ffff);

        let (result, _) = run(&primary, &assets, &mut ClipState::new(), w);
        assert_eq!(result.unwrap_err().error, NemaError::MaskedPathUnsupported);
    }

    #[test]
    fn clip_written_by_a_list_is_visible_to_the_caller() {
        let (_mem, primary, assets) = memory();
        let mut clip = ClipState::new();
        let mut w = NemaCmdListWriter::new();
        w.set_clip(NemaRegion::new(1, 2, 3, 4));

        let (result, _) = run(&primary, &assets, &mut clip, w);
        result.unwrap();
        assert_eq!(clip.region(), Some(NemaRegion::new(1, 2, 3, 4)));
    }
}
