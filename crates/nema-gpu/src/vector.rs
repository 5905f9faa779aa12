//! Path rendering for lines, rectangle outlines and rounded rectangles.
//!
//! Geometry is built with `kurbo` and rasterized anti-aliased with `tiny-skia`, clipped by a
//! rectangular mask. The destination is `0xAARRGGBB` little-endian (BGRA bytes) while tiny-skia
//! works in RGBA, so the target is swizzled in and out around each draw.

use std::f64::consts::{FRAC_PI_2, PI};

use kurbo::{Arc, BezPath, PathEl, Point, Shape, Vec2};
use nema_protocol::NemaRegion;
use tiny_skia::{FillRule, LineCap, Mask, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::surface::Drawable;

/// Line width used for rectangle outlines.
pub const OUTLINE_WIDTH: f32 = 2.0;

const ARC_TOLERANCE: f64 = 0.1;
const MITER_LIMIT: f32 = 10.0;

/// Straight-alpha paint color with an optional opacity multiplier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PaintColor {
    pub argb: u32,
    pub opacity: Option<u8>,
}

impl PaintColor {
    pub fn new(argb: u32, opacity: Option<u8>) -> Self {
        Self { argb, opacity }
    }

    fn to_paint(self) -> Paint<'static> {
        let [b, g, r, a] = self.argb.to_le_bytes();
        let a = match self.opacity {
            Some(o) => ((u32::from(a) * u32::from(o) + 127) / 255) as u8,
            None => a,
        };
        let mut paint = Paint::default();
        paint.set_color_rgba8(r, g, b, a);
        paint.anti_alias = true;
        paint
    }
}

enum Raster {
    Fill,
    Stroke(Stroke),
}

fn outline(width: f32, line_cap: LineCap) -> Stroke {
    Stroke {
        width,
        line_cap,
        miter_limit: MITER_LIMIT,
        ..Stroke::default()
    }
}

/// Appends an arc the way a current-point based path API does: connect from the current point
/// (or start a new subpath) to the arc start. A non-positive radius collapses the arc to its
/// center.
fn append_arc(path: &mut BezPath, center: Point, radius: f64, start: f64, end: f64) {
    let has_current = !path.elements().is_empty();
    if radius <= 0.0 {
        if has_current {
            path.line_to(center);
        } else {
            path.move_to(center);
        }
        return;
    }

    let arc = Arc {
        center,
        radii: Vec2::new(radius, radius),
        start_angle: start,
        sweep_angle: end - start,
        x_rotation: 0.0,
    };
    let from = center + Vec2::from_angle(start) * radius;
    if has_current {
        path.line_to(from);
    } else {
        path.move_to(from);
    }
    for el in arc.append_iter(ARC_TOLERANCE) {
        path.push(el);
    }
}

/// Rounded rectangle outline built from four quarter arcs.
///
/// The corner radius is divided by the rectangle's aspect ratio (`width / height`), so it only
/// matches `corner_radius` for square rectangles. Returns `None` when that radius is not finite.
pub fn rounded_rect_path(rect: NemaRegion, corner_radius: i32) -> Option<BezPath> {
    let x = f64::from(rect.x);
    let y = f64::from(rect.y);
    let w = f64::from(rect.w);
    let h = f64::from(rect.h);
    let radius = f64::from(corner_radius) / (w / h);
    if !radius.is_finite() {
        return None;
    }

    let mut path = BezPath::new();
    append_arc(&mut path, Point::new(x + w - radius, y + radius), radius, -FRAC_PI_2, 0.0);
    append_arc(&mut path, Point::new(x + w - radius, y + h - radius), radius, 0.0, FRAC_PI_2);
    append_arc(&mut path, Point::new(x + radius, y + h - radius), radius, FRAC_PI_2, PI);
    append_arc(&mut path, Point::new(x + radius, y + radius), radius, PI, PI + FRAC_PI_2);
    path.close_path();
    Some(path)
}

fn to_skia_path(path: &BezPath) -> Option<tiny_skia::Path> {
    let mut pb = PathBuilder::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => pb.move_to(p.x as f32, p.y as f32),
            PathEl::LineTo(p) => pb.line_to(p.x as f32, p.y as f32),
            PathEl::QuadTo(p1, p2) => pb.quad_to(p1.x as f32, p1.y as f32, p2.x as f32, p2.y as f32),
            PathEl::CurveTo(p1, p2, p3) => pb.cubic_to(
                p1.x as f32,
                p1.y as f32,
                p2.x as f32,
                p2.y as f32,
                p3.x as f32,
                p3.y as f32,
            ),
            PathEl::ClosePath => pb.close(),
        }
    }
    pb.finish()
}

fn clip_mask(width: u32, height: u32, clip: NemaRegion) -> Option<Mask> {
    let rect = Rect::from_xywh(clip.x as f32, clip.y as f32, clip.w as f32, clip.h as f32)?;
    let mut mask = Mask::new(width, height)?;
    mask.fill_path(&PathBuilder::from_rect(rect), FillRule::Winding, false, Transform::identity());
    Some(mask)
}

fn load_pixmap(target: &Drawable<'_>) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(target.width, target.height)?;
    let row_bytes = target.width as usize * 4;
    for (dst, src) in pixmap
        .data_mut()
        .chunks_exact_mut(row_bytes)
        .zip(target.data.chunks(target.stride))
    {
        for (d, s) in dst.chunks_exact_mut(4).zip(src[..row_bytes].chunks_exact(4)) {
            d.copy_from_slice(&[s[2], s[1], s[0], s[3]]);
        }
    }
    Some(pixmap)
}

fn store_pixmap(pixmap: &Pixmap, target: &mut Drawable<'_>) {
    let row_bytes = target.width as usize * 4;
    for (src, dst) in pixmap
        .data()
        .chunks_exact(row_bytes)
        .zip(target.data.chunks_mut(target.stride))
    {
        for (s, d) in src.chunks_exact(4).zip(dst[..row_bytes].chunks_exact_mut(4)) {
            d.copy_from_slice(&[s[2], s[1], s[0], s[3]]);
        }
    }
}

fn render(target: &mut Drawable<'_>, clip: NemaRegion, path: &BezPath, raster: Raster, color: PaintColor) {
    if let Raster::Stroke(stroke) = &raster {
        if stroke.width <= 0.0 {
            return;
        }
    }
    let Some(path) = to_skia_path(path) else {
        return;
    };
    let Some(mask) = clip_mask(target.width, target.height, clip) else {
        return;
    };
    let Some(mut pixmap) = load_pixmap(target) else {
        return;
    };

    let paint = color.to_paint();
    match raster {
        Raster::Fill => pixmap.fill_path(&path, &paint, FillRule::Winding, Transform::identity(), Some(&mask)),
        Raster::Stroke(stroke) => {
            pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), Some(&mask))
        }
    }
    store_pixmap(&pixmap, target);
}

/// `DRAW_LINE`: round-capped segment from `(x0, y0)` to `(x1, y1)`.
pub fn draw_line(
    target: &mut Drawable<'_>,
    clip: NemaRegion,
    from: (i32, i32),
    to: (i32, i32),
    width: u32,
    color: PaintColor,
) {
    let mut path = BezPath::new();
    path.move_to((f64::from(from.0), f64::from(from.1)));
    path.line_to((f64::from(to.0), f64::from(to.1)));
    render(target, clip, &path, Raster::Stroke(outline(width as f32, LineCap::Round)), color);
}

/// `DRAW_RECT`: outline of `rect`.
pub fn draw_rect(target: &mut Drawable<'_>, clip: NemaRegion, rect: NemaRegion, color: PaintColor) {
    let r = kurbo::Rect::new(
        f64::from(rect.x),
        f64::from(rect.y),
        f64::from(rect.x) + f64::from(rect.w),
        f64::from(rect.y) + f64::from(rect.h),
    );
    let path = r.to_path(ARC_TOLERANCE);
    render(target, clip, &path, Raster::Stroke(outline(OUTLINE_WIDTH, LineCap::Butt)), color);
}

/// `FILL_RECT_ROUNDED`.
pub fn fill_rect_rounded(
    target: &mut Drawable<'_>,
    clip: NemaRegion,
    rect: NemaRegion,
    corner_radius: i32,
    color: PaintColor,
) {
    if let Some(path) = rounded_rect_path(rect, corner_radius) {
        render(target, clip, &path, Raster::Fill, color);
    }
}

/// `DRAW_RECT_ROUNDED`.
pub fn draw_rect_rounded(
    target: &mut Drawable<'_>,
    clip: NemaRegion,
    rect: NemaRegion,
    corner_radius: i32,
    color: PaintColor,
) {
    if let Some(path) = rounded_rect_path(rect, corner_radius) {
        render(
            target,
            clip,
            &path,
            Raster::Stroke(outline(OUTLINE_WIDTH, LineCap::Butt)),
            color,
        );
    }
}
