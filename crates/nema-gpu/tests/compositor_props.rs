#![cfg(not(target_arch = "wasm32"))]

use nema_gpu::compositor::{apply_opacity, fill_rect, mul_un8, over};
use nema_gpu::surface::pad_mask_rows;
use nema_gpu::{PixelFormat, Surface, SurfaceLayout};
use nema_protocol::NemaRegion;
use proptest::prelude::*;

fn argb_surface(width: u32, height: u32, pixels: &[u32]) -> Surface {
    let layout = SurfaceLayout::validate(width, height, (width * 4) as i32, PixelFormat::Argb8888).unwrap();
    let data = pixels.iter().flat_map(|p| p.to_le_bytes()).collect();
    Surface::owned(layout, data)
}

fn premultiplied() -> impl Strategy<Value = u32> {
    (any::<u8>(), any::<[u8; 3]>()).prop_map(|(a, [r, g, b])| {
        u32::from_le_bytes([mul_un8(b, a), mul_un8(g, a), mul_un8(r, a), a])
    })
}

proptest! {
    #[test]
    fn padded_mask_rows_keep_bytes_and_zero_the_tail(
        stride in 1usize..24,
        height in 0u32..8,
        seed in any::<u8>(),
    ) {
        let data: Vec<u8> = (0..stride * height as usize)
            .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
            .collect();

        match pad_mask_rows(&data, stride, height) {
            None => prop_assert_eq!(stride % 4, 0),
            Some((padded, padded_stride)) => {
                prop_assert_eq!(padded_stride % 4, 0);
                prop_assert!(padded_stride > stride && padded_stride < stride + 4);
                prop_assert_eq!(padded.len(), padded_stride * height as usize);
                for (src, dst) in data.chunks_exact(stride).zip(padded.chunks_exact(padded_stride)) {
                    prop_assert_eq!(&dst[..stride], src);
                    prop_assert!(dst[stride..].iter().all(|&b| b == 0));
                }
            }
        }
    }

    #[test]
    fn zero_coverage_is_identity(src in any::<u32>(), dst in any::<u32>()) {
        prop_assert_eq!(over(src, 0, dst), dst);
    }

    #[test]
    fn opaque_source_replaces_destination(rgb in 0u32..0x0100_0000, dst in any::<u32>()) {
        let src = 0xff00_0000 | rgb;
        prop_assert_eq!(over(src, 0xff, dst), src);
    }

    #[test]
    fn over_keeps_premultiplied_pixels_valid(src in premultiplied(), dst in premultiplied(), m in any::<u8>()) {
        let [b, g, r, a] = over(src, m, dst).to_le_bytes();
        prop_assert!(b <= a && g <= a && r <= a);
    }

    #[test]
    fn full_opacity_mask_matches_unmasked_fill(
        pixels in proptest::collection::vec(premultiplied(), 16),
        color in any::<u32>(),
        // Rects at or right of the origin, so the synthesized mask is sampled in bounds.
        x in 0i32..4,
        y in 0i32..4,
        w in 0u32..6,
        h in 0u32..6,
    ) {
        let rect = NemaRegion::new(x, y, w, h);
        let clip = NemaRegion::new(0, 0, 4, 4);

        let mut plain = argb_surface(4, 4, &pixels);
        fill_rect(&mut plain, clip, rect, color, None);

        let mut masked = argb_surface(4, 4, &pixels);
        let mask = apply_opacity(masked.layout(), None, 0xff);
        fill_rect(&mut masked, clip, rect, color, Some(&mask));

        prop_assert_eq!(masked.bytes(), plain.bytes());
    }
}
