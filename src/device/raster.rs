use kurbo::Shape as _;
use rayon::prelude::*;

use crate::{
    device::{
        headless::{ContentPixels, ContentSource, Scene, VisualState},
        types::{SamplingFilter, VisualId},
    },
    foundation::core::{Affine, PixelSize, Point, Rect, Rgba8Premul, RoundedRect},
    foundation::math::over,
    ink::renderer::InkTrail,
};

/// Clip state inherited down the visual tree, in frame space.
#[derive(Clone, Debug)]
struct ClipState {
    bounds: Rect,
    rounded: Vec<(Affine, RoundedRect)>,
}

impl ClipState {
    fn accepts(&self, p: Point) -> bool {
        if !self.bounds.contains(p) {
            return false;
        }
        self.rounded
            .iter()
            .all(|(frame_to_local, rr)| rr.contains(*frame_to_local * p))
    }
}

pub(crate) fn compose(
    scene: &Scene,
    source: &dyn ContentSource,
    size: PixelSize,
    clear: Rgba8Premul,
) -> image::RgbaImage {
    let mut out = image::RgbaImage::from_pixel(size.width, size.height, image::Rgba(clear.to_array()));
    let Some(root) = scene.root else {
        return out;
    };
    let clip = ClipState {
        bounds: Rect::from_origin_size(Point::ORIGIN, size.to_size()),
        rounded: Vec::new(),
    };
    draw_visual(scene, source, root, Affine::IDENTITY, 1.0, &clip, &mut out, 0);
    out
}

// Cycles cannot be built through `add_visual`, but the depth bound keeps a corrupt tree finite.
const MAX_DEPTH: usize = 64;

#[allow(clippy::too_many_arguments)]
fn draw_visual(
    scene: &Scene,
    source: &dyn ContentSource,
    id: VisualId,
    parent_to_frame: Affine,
    parent_opacity: f32,
    parent_clip: &ClipState,
    out: &mut image::RgbaImage,
    depth: usize,
) {
    if depth > MAX_DEPTH {
        return;
    }
    let Some(node) = scene.visuals.get(&id) else {
        return;
    };

    let local_to_frame = parent_to_frame * Affine::translate(node.offset) * node.transform;
    let opacity = parent_opacity * node.opacity.clamp(0.0, 1.0);
    if opacity <= 0.0 {
        return;
    }

    let mut clip = parent_clip.clone();
    if let Some(rect) = node.clip {
        clip.bounds = clip.bounds.intersect(local_to_frame.transform_rect_bbox(rect));
    }
    if let Some(rr) = node.rounded_clip
        && local_to_frame.determinant().abs() > f64::EPSILON
    {
        clip.bounds = clip
            .bounds
            .intersect(local_to_frame.transform_rect_bbox(rr.rect()));
        clip.rounded.push((local_to_frame.inverse(), rr));
    }
    if clip.bounds.width() <= 0.0 || clip.bounds.height() <= 0.0 {
        return;
    }

    if let Some(content) = node.content
        && let Some(pixels) = source.content_pixels(content)
    {
        draw_content(&pixels, node, local_to_frame, opacity, &clip, out);
    }
    if let Some(trail) = &node.ink {
        draw_ink(trail, local_to_frame, opacity, &clip, out);
    }

    for child in &node.children {
        draw_visual(
            scene,
            source,
            *child,
            local_to_frame,
            opacity,
            &clip,
            out,
            depth + 1,
        );
    }
}

/// Rows of `out` touched by `bounds`, clamped to the frame.
fn row_span(bounds: Rect, height: u32) -> (u32, u32) {
    let y0 = bounds.y0.floor().max(0.0) as u32;
    let y1 = (bounds.y1.ceil().max(0.0) as u32).min(height);
    (y0.min(height), y1)
}

fn for_each_pixel<F>(out: &mut image::RgbaImage, bounds: Rect, shade: F)
where
    F: Fn(Point) -> Option<([u8; 4], f32)> + Sync,
{
    let width = out.width();
    let (y0, y1) = row_span(bounds, out.height());
    let x0 = bounds.x0.floor().max(0.0) as u32;
    let x1 = (bounds.x1.ceil().max(0.0) as u32).min(width);
    if y0 >= y1 || x0 >= x1 {
        return;
    }
    let stride = width as usize * 4;
    out.par_chunks_mut(stride)
        .enumerate()
        .skip(y0 as usize)
        .take((y1 - y0) as usize)
        .for_each(|(y, row)| {
            for x in x0..x1 {
                let p = Point::new(f64::from(x) + 0.5, f64::from(y as u32) + 0.5);
                if let Some((src, opacity)) = shade(p) {
                    let i = x as usize * 4;
                    let dst = [row[i], row[i + 1], row[i + 2], row[i + 3]];
                    row[i..i + 4].copy_from_slice(&over(dst, src, opacity));
                }
            }
        });
}

fn draw_content(
    pixels: &ContentPixels<'_>,
    node: &VisualState,
    local_to_frame: Affine,
    opacity: f32,
    clip: &ClipState,
    out: &mut image::RgbaImage,
) {
    if local_to_frame.determinant().abs() <= f64::EPSILON {
        return;
    }
    let (w, h) = match pixels {
        ContentPixels::Image(img) => (img.width(), img.height()),
        ContentPixels::Solid(_) => (1, 1),
    };
    if w == 0 || h == 0 {
        return;
    }
    let local = Rect::new(0.0, 0.0, f64::from(w), f64::from(h));
    let bounds = local_to_frame.transform_rect_bbox(local).intersect(clip.bounds);
    let frame_to_local = local_to_frame.inverse();
    let filter = node.filter;

    for_each_pixel(out, bounds, |p| {
        if !clip.accepts(p) {
            return None;
        }
        let lp = frame_to_local * p;
        if !local.contains(lp) {
            return None;
        }
        let src = match pixels {
            ContentPixels::Solid(color) => color.to_array(),
            ContentPixels::Image(img) => sample(img, lp, filter),
        };
        Some((src, opacity))
    });
}

fn draw_ink(
    trail: &InkTrail,
    local_to_frame: Affine,
    opacity: f32,
    clip: &ClipState,
    out: &mut image::RgbaImage,
) {
    if trail.points.is_empty() || trail.diameter <= 0.0 {
        return;
    }
    let radius = f64::from(trail.diameter) / 2.0;
    let frame_points: Vec<Point> = trail.points.iter().map(|p| local_to_frame * *p).collect();
    let mut bounds = Rect::from_points(frame_points[0], frame_points[0]);
    for p in &frame_points {
        bounds = bounds.union_pt(*p);
    }
    let bounds = bounds.inflate(radius, radius).intersect(clip.bounds);
    let color = trail.color.to_array();

    for_each_pixel(out, bounds, |p| {
        if !clip.accepts(p) {
            return None;
        }
        let hit = if frame_points.len() == 1 {
            frame_points[0].distance(p) <= radius
        } else {
            frame_points
                .windows(2)
                .any(|seg| distance_to_segment(p, seg[0], seg[1]) <= radius)
        };
        hit.then_some((color, opacity))
    });
}

fn distance_to_segment(p: Point, a: Point, b: Point) -> f64 {
    let ab = b - a;
    let len2 = ab.hypot2();
    if len2 <= f64::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

fn texel(img: &image::RgbaImage, x: i64, y: i64) -> [u8; 4] {
    let x = x.clamp(0, i64::from(img.width()) - 1) as u32;
    let y = y.clamp(0, i64::from(img.height()) - 1) as u32;
    img.get_pixel(x, y).0
}

fn sample(img: &image::RgbaImage, p: Point, filter: SamplingFilter) -> [u8; 4] {
    match filter {
        SamplingFilter::NearestNeighbor => texel(img, p.x.floor() as i64, p.y.floor() as i64),
        SamplingFilter::Linear => {
            let fx = p.x - 0.5;
            let fy = p.y - 0.5;
            let x0 = fx.floor();
            let y0 = fy.floor();
            let tx = fx - x0;
            let ty = fy - y0;
            let (x0, y0) = (x0 as i64, y0 as i64);
            let c00 = texel(img, x0, y0);
            let c10 = texel(img, x0 + 1, y0);
            let c01 = texel(img, x0, y0 + 1);
            let c11 = texel(img, x0 + 1, y0 + 1);
            let mut px = [0u8; 4];
            for i in 0..4 {
                let top = f64::from(c00[i]) * (1.0 - tx) + f64::from(c10[i]) * tx;
                let bottom = f64::from(c01[i]) * (1.0 - tx) + f64::from(c11[i]) * tx;
                px[i] = (top * (1.0 - ty) + bottom * ty).round().clamp(0.0, 255.0) as u8;
            }
            px
        }
    }
}

/// Nearest-neighbour scale of `src_rect` of `src` onto all of `dst`.
pub(crate) fn scale_into(src: &image::RgbaImage, src_rect: Rect, dst: &mut image::RgbaImage) {
    let (dw, dh) = (dst.width(), dst.height());
    if dw == 0 || dh == 0 || src.width() == 0 || src.height() == 0 {
        return;
    }
    let sx = src_rect.width() / f64::from(dw);
    let sy = src_rect.height() / f64::from(dh);
    for (x, y, px) in dst.enumerate_pixels_mut() {
        let u = src_rect.x0 + (f64::from(x) + 0.5) * sx;
        let v = src_rect.y0 + (f64::from(y) + 0.5) * sy;
        px.0 = texel(src, u.floor() as i64, v.floor() as i64);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/device/raster.rs"]
mod tests;
