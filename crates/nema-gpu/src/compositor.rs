//! Rectangle fill and blit: premultiplied `src IN mask OVER dst` at 8 bits per channel.

use nema_protocol::NemaRegion;

use crate::clip::PixelBounds;
use crate::surface::{PixelFormat, PixelView, Surface, SurfaceLayout};

/// `a * b / 255`, rounded.
#[inline]
pub fn mul_un8(a: u8, b: u8) -> u8 {
    let t = u32::from(a) * u32::from(b) + 0x80;
    (((t >> 8) + t) >> 8) as u8
}

#[inline]
fn map_channels(px: u32, f: impl Fn(u8) -> u8) -> u32 {
    let b = px.to_le_bytes();
    u32::from_le_bytes([f(b[0]), f(b[1]), f(b[2]), f(b[3])])
}

/// Premultiply a straight-alpha `0xAARRGGBB` color.
pub fn premultiply(argb: u32) -> u32 {
    let a = (argb >> 24) as u8;
    let rgb = map_channels(argb & 0x00ff_ffff, |c| mul_un8(c, a));
    (u32::from(a) << 24) | rgb
}

/// One pixel of `src IN coverage OVER dst`.
#[inline]
pub fn over(src: u32, coverage: u8, dst: u32) -> u32 {
    let src = match coverage {
        0 => return dst,
        0xff => src,
        m => map_channels(src, |c| mul_un8(c, m)),
    };
    let inv = 0xff - (src >> 24) as u8;
    match inv {
        0 => src,
        0xff => dst,
        _ => {
            let s = src.to_le_bytes();
            let d = dst.to_le_bytes();
            u32::from_le_bytes(core::array::from_fn(|i| s[i].saturating_add(mul_un8(d[i], inv))))
        }
    }
}

/// Fold the opacity byte into the mask.
///
/// Without a mask, the result is a destination-sized `A8` mask filled with `opacity`. With one,
/// every byte is scaled by `opacity / 256`.
pub fn apply_opacity(dst: SurfaceLayout, mask: Option<Surface>, opacity: u8) -> Surface {
    match mask {
        Some(mut mask) => {
            for b in mask.bytes_mut() {
                *b = ((u32::from(*b) * u32::from(opacity)) >> 8) as u8;
            }
            mask
        }
        None => {
            let layout = SurfaceLayout {
                width: dst.width,
                height: dst.height,
                stride: (dst.width as usize).next_multiple_of(4),
                format: PixelFormat::A8,
            };
            Surface::owned(layout, vec![opacity; layout.byte_len()])
        }
    }
}

enum Source<'a> {
    Solid(u32),
    Image(PixelView<'a>),
}

/// Composite over `area` of the destination, restricted to the clip and destination bounds.
///
/// Source and mask are sampled relative to the area origin.
fn composite(dst: &mut Surface, clip: NemaRegion, area: NemaRegion, src: Source<'_>, mask: Option<PixelView<'_>>) {
    let layout = dst.layout();
    let bounds = PixelBounds::from_region(area)
        .intersect(PixelBounds::from_region(clip))
        .intersect(PixelBounds::from_size(layout.width, layout.height));
    if bounds.is_empty() {
        return;
    }

    let ox = i64::from(area.x);
    let oy = i64::from(area.y);
    let mut pixels = dst.pixels_mut();
    for y in bounds.y0..bounds.y1 {
        for x in bounds.x0..bounds.x1 {
            let s = match &src {
                Source::Solid(c) => *c,
                Source::Image(view) => view.argb(x - ox, y - oy),
            };
            let m = mask.map_or(0xff, |m| m.coverage(x - ox, y - oy));
            let d = pixels.argb(x, y);
            let out = over(s, m, d);
            if out != d {
                pixels.put_argb(x, y, out);
            }
        }
    }
}

/// `FILL_RECT`: solid `argb` (straight alpha) over `rect`.
pub fn fill_rect(dst: &mut Surface, clip: NemaRegion, rect: NemaRegion, argb: u32, mask: Option<&Surface>) {
    composite(
        dst,
        clip,
        rect,
        Source::Solid(premultiply(argb)),
        mask.map(Surface::pixels),
    );
}

/// `BLIT`: `src` over the whole destination.
pub fn blit(dst: &mut Surface, clip: NemaRegion, src: &Surface, mask: Option<&Surface>) {
    let layout = dst.layout();
    let area = NemaRegion::new(0, 0, layout.width, layout.height);
    composite(dst, clip, area, Source::Image(src.pixels()), mask.map(Surface::pixels));
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn argb_surface(width: u32, height: u32, fill: u32) -> Surface {
        let layout = SurfaceLayout::validate(width, height, (width * 4) as i32, PixelFormat::Argb8888).unwrap();
        let data = fill.to_le_bytes().repeat((width * height) as usize);
        Surface::owned(layout, data)
    }

    fn a8_surface(width: u32, height: u32, data: Vec<u8>) -> Surface {
        let layout = SurfaceLayout::validate(width, height, width as i32, PixelFormat::A8).unwrap();
        Surface::owned(layout, data)
    }

    fn pixels(s: &Surface) -> Vec<u32> {
        s.bytes()
            .chunks_exact(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect()
    }

    #[test]
    fn mul_un8_is_exact_at_the_ends() {
        for v in 0..=255u8 {
            assert_eq!(mul_un8(v, 255), v);
            assert_eq!(mul_un8(v, 0), 0);
        }
        assert_eq!(mul_un8(128, 128), 64);
    }

    #[test]
    fn premultiply_scales_color_channels_only() {
        assert_eq!(premultiply(0xffff_0000), 0xffff_0000);
        assert_eq!(premultiply(0x80ff_ff00), 0x8080_8000);
        assert_eq!(premultiply(0x00ff_ffff), 0);
    }

    #[test]
    fn fill_is_clipped_to_clip_and_destination() {
        let mut dst = argb_surface(4, 4, 0);
        fill_rect(
            &mut dst,
            NemaRegion::new(1, 1, 10, 10),
            NemaRegion::new(-2, 0, 8, 2),
            0xff00_00ff,
            None,
        );

        let px = pixels(&dst);
        assert_eq!(&px[0..4], &[0, 0, 0, 0]);
        assert_eq!(&px[4..8], &[0, 0xff00_00ff, 0xff00_00ff, 0xff00_00ff]);
        assert!(px[8..].iter().all(|&p| p == 0));
    }

    #[test]
    fn half_transparent_fill_blends() {
        let mut dst = argb_surface(1, 1, 0xff00_00ff);
        fill_rect(
            &mut dst,
            NemaRegion::new(0, 0, 1, 1),
            NemaRegion::new(0, 0, 1, 1),
            0x80ff_0000,
            None,
        );
        // 0x80 red premultiplied plus 0x7f/0xff of opaque blue.
        assert_eq!(pixels(&dst), vec![0xff80_007f]);
    }

    #[test]
    fn mask_is_sampled_relative_to_the_fill_origin() {
        let mut dst = argb_surface(4, 1, 0);
        let mask = a8_surface(2, 1, vec![0xff, 0x00]);
        fill_rect(
            &mut dst,
            NemaRegion::new(0, 0, 4, 1),
            NemaRegion::new(2, 0, 2, 1),
            0xffff_ffff,
            Some(&mask),
        );
        assert_eq!(pixels(&dst), vec![0, 0, 0xffff_ffff, 0]);
    }

    #[test]
    fn blit_reads_transparent_outside_the_source() {
        let mut dst = argb_surface(3, 1, 0xff11_1111);
        let src = argb_surface(2, 1, 0xff22_2222);
        blit(&mut dst, NemaRegion::new(0, 0, 3, 1), &src, None);
        assert_eq!(pixels(&dst), vec![0xff22_2222, 0xff22_2222, 0xff11_1111]);
    }

    #[test]
    fn synthesized_opacity_mask_covers_the_destination() {
        let dst = argb_surface(3, 2, 0);
        let mask = apply_opacity(dst.layout(), None, 0x40);
        assert_eq!(mask.layout().stride, 4);
        assert_eq!(mask.layout().width, 3);
        assert!(mask.bytes().iter().all(|&b| b == 0x40));
    }

    #[test]
    fn opacity_scales_an_existing_mask() {
        let dst = argb_surface(2, 1, 0);
        let mask = a8_surface(2, 1, vec![0xff, 0x80]);
        let mask = apply_opacity(dst.layout(), Some(mask), 0x80);
        assert_eq!(mask.bytes(), &[0x7f, 0x40]);
    }

    #[test]
    fn zero_opacity_leaves_destination_untouched() {
        let mut dst = argb_surface(2, 2, 0x8040_2010);
        let before = pixels(&dst);
        let mask = apply_opacity(dst.layout(), None, 0);
        let src = argb_surface(2, 2, 0xffff_ffff);
        blit(&mut dst, NemaRegion::new(0, 0, 2, 2), &src, Some(&mask));
        assert_eq!(pixels(&dst), before);
    }
}
