//! Device-lifetime clip rectangle shared by both rendering backends.

use nema_protocol::NemaRegion;

use crate::error::NemaError;

/// The clip rectangle last set by `SET_CLIP`.
///
/// Unlike the pipeline bindings this survives across command lists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClipState {
    region: Option<NemaRegion>,
}

impl ClipState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, region: NemaRegion) {
        self.region = Some(region);
    }

    pub fn region(&self) -> Option<NemaRegion> {
        self.region
    }

    pub fn is_set(&self) -> bool {
        self.region.is_some()
    }

    pub fn require(&self) -> Result<NemaRegion, NemaError> {
        self.region.ok_or(NemaError::ClipNotSet)
    }
}

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBounds {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl PixelBounds {
    pub fn from_region(r: NemaRegion) -> Self {
        let x0 = i64::from(r.x);
        let y0 = i64::from(r.y);
        Self {
            x0,
            y0,
            x1: x0 + i64::from(r.w),
            y1: y0 + i64::from(r.h),
        }
    }

    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            x0: 0,
            y0: 0,
            x1: i64::from(width),
            y1: i64::from(height),
        }
    }

    pub fn intersect(self, other: Self) -> Self {
        Self {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_is_unset_until_written() {
        let mut clip = ClipState::new();
        assert_eq!(clip.require(), Err(NemaError::ClipNotSet));

        clip.set(NemaRegion::new(1, 2, 3, 4));
        assert!(clip.is_set());
        assert_eq!(clip.require(), Ok(NemaRegion::new(1, 2, 3, 4)));
    }

    #[test]
    fn intersection_handles_negative_origins() {
        let clip = PixelBounds::from_region(NemaRegion::new(-5, -5, 10, 10));
        let dst = PixelBounds::from_size(8, 8);
        assert_eq!(
            clip.intersect(dst),
            PixelBounds {
                x0: 0,
                y0: 0,
                x1: 5,
                y1: 5
            }
        );

        let disjoint = PixelBounds::from_region(NemaRegion::new(20, 0, 4, 4));
        assert!(disjoint.intersect(dst).is_empty());
        assert!(PixelBounds::from_region(NemaRegion::new(0, 0, 0, 4)).is_empty());
    }
}
