use nema_protocol::{NemaBlendFlags, NemaBlendTarget, NemaRegion, NemaTexSlot};

use crate::clip::ClipState;
use crate::error::NemaError;
use crate::surface::Surface;

/// Mutable state for one command list.
///
/// Bindings are consumed by each draw; blend flags and the constant color carry over to later
/// draws in the same list.
#[derive(Debug, Default)]
pub struct PipelineContext {
    dst: Option<Surface>,
    src: Option<Surface>,
    mask: Option<Surface>,
    blend: NemaBlendFlags,
    blend_target: NemaBlendTarget,
    const_color: Option<u32>,
}

/// Bindings taken out of the context for one draw.
#[derive(Debug)]
pub struct DrawBindings {
    pub dst: Surface,
    pub src: Option<Surface>,
    pub mask: Option<Surface>,
    pub clip: NemaRegion,
    /// Opacity byte, present when the opacity flag is set.
    pub opacity: Option<u8>,
}

impl DrawBindings {
    /// Commit the destination back to guest memory.
    pub fn release(self) -> Result<(), NemaError> {
        self.dst.release()
    }
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `surface` to `slot`, releasing whatever was bound there before.
    pub fn bind(&mut self, slot: NemaTexSlot, surface: Surface) -> Result<(), NemaError> {
        let prev = match slot {
            NemaTexSlot::Destination => self.dst.replace(surface),
            NemaTexSlot::Source => self.src.replace(surface),
            NemaTexSlot::Mask => self.mask.replace(surface),
        };
        match prev {
            Some(prev) => prev.release(),
            None => Ok(()),
        }
    }

    pub fn set_blend(&mut self, target: NemaBlendTarget, flags: NemaBlendFlags) {
        self.blend_target = target;
        self.blend = flags;
    }

    pub fn set_const_color(&mut self, argb: u32) {
        self.const_color = Some(argb);
    }

    pub fn blend(&self) -> (NemaBlendTarget, NemaBlendFlags) {
        (self.blend_target, self.blend)
    }

    pub fn const_color(&self) -> Option<u32> {
        self.const_color
    }

    pub fn is_bound(&self, slot: NemaTexSlot) -> bool {
        match slot {
            NemaTexSlot::Destination => self.dst.is_some(),
            NemaTexSlot::Source => self.src.is_some(),
            NemaTexSlot::Mask => self.mask.is_some(),
        }
    }

    /// Check draw readiness against the current bindings and clip.
    pub fn validate(&self, clip: &ClipState) -> Result<NemaRegion, NemaError> {
        if self.dst.is_none() {
            return Err(NemaError::DestinationNotBound);
        }

        let mask_flag = self.blend.contains(NemaBlendFlags::HAS_MASK);
        if mask_flag != self.mask.is_some() {
            return Err(NemaError::MaskBindingMismatch {
                flag: mask_flag,
                bound: self.mask.is_some(),
            });
        }

        let opacity_flag = self.blend.contains(NemaBlendFlags::HAS_OPACITY);
        if opacity_flag != self.const_color.is_some() {
            return Err(NemaError::OpacityBindingMismatch {
                flag: opacity_flag,
                set: self.const_color.is_some(),
            });
        }

        clip.require()
    }

    /// Validate, then move every binding out for a draw.
    ///
    /// On failure the bindings stay in place; they are released with the context.
    pub fn take_for_draw(&mut self, clip: &ClipState) -> Result<DrawBindings, NemaError> {
        let clip = self.validate(clip)?;
        let dst = self.dst.take().ok_or(NemaError::DestinationNotBound)?;
        let opacity = self
            .blend
            .contains(NemaBlendFlags::HAS_OPACITY)
            .then(|| self.const_color.map(|c| (c >> 24) as u8))
            .flatten();
        Ok(DrawBindings {
            dst,
            src: self.src.take(),
            mask: self.mask.take(),
            clip,
            opacity,
        })
    }

    /// Release every binding, committing the destination. Blend state is kept.
    pub fn release_bindings(&mut self) -> Result<(), NemaError> {
        self.src = None;
        self.mask = None;
        match self.dst.take() {
            Some(dst) => dst.release(),
            None => Ok(()),
        }
    }
}
