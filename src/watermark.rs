//! Branding badge stamped onto the source before decomposition.
//!
//! A 60×20 rounded dark badge with a "Picgle" label, anchored near the
//! bottom-right corner. If no system font can be loaded the badge degrades
//! to a plain translucent rectangle (smaller, matching the legacy overlay)
//! and the run continues.

use ab_glyph::{Font, FontArc, ScaleFont, point};
use image::{Rgba, RgbaImage};
use std::sync::OnceLock;

use crate::canvas::{self, BlendMode};

const BADGE_W: u32 = 60;
const BADGE_H: u32 = 20;
const CORNER_RADIUS: f32 = 3.0;
const LABEL: &str = "Picgle";
const LABEL_SIZE: f32 = 10.0;

/// Return a copy of `source` with the badge composited near the
/// bottom-right corner. The input is never modified.
pub fn stamp(source: &RgbaImage) -> RgbaImage {
    let mut out = source.clone();
    let (w, h) = out.dimensions();

    match badge_font() {
        Some(font) => {
            let badge = render_badge(font);
            draw_over(&mut out, &badge, w as i64 - 65, h as i64 - 25);
        }
        None => {
            log_warn!("No system font available, using the built-in watermark glyphs");
            let mut rect = RgbaImage::from_pixel(50, 15, Rgba([0, 0, 0, 179]));
            draw_fallback_label(&mut rect, 5, 4);
            draw_over(&mut out, &rect, w as i64 - 60, h as i64 - 25);
        }
    }
    out
}

/// Composite `src` onto `dest` source-over at (`ox`, `oy`), clipping
/// whatever falls outside the destination.
fn draw_over(dest: &mut RgbaImage, src: &RgbaImage, ox: i64, oy: i64) {
    let (dw, dh) = dest.dimensions();
    for (sx, sy, &px) in src.enumerate_pixels() {
        let dx = ox + sx as i64;
        let dy = oy + sy as i64;
        if dx < 0 || dy < 0 || dx >= dw as i64 || dy >= dh as i64 {
            continue;
        }
        let (dx, dy) = (dx as u32, dy as u32);
        let base = *dest.get_pixel(dx, dy);
        dest.put_pixel(dx, dy, canvas::blend_pixel(base, px, BlendMode::Normal));
    }
}

/// Rounded 60×20 badge: black fading left-to-right from 80% to 40% alpha,
/// with the label centered in white.
fn render_badge(font: &FontArc) -> RgbaImage {
    let mut badge = RgbaImage::from_fn(BADGE_W, BADGE_H, |x, y| {
        if outside_rounded_rect(x, y) {
            Rgba([0, 0, 0, 0])
        } else {
            let t = x as f32 / (BADGE_W - 1) as f32;
            let alpha = 0.8 + (0.4 - 0.8) * t;
            Rgba([0, 0, 0, (alpha * 255.0).round() as u8])
        }
    });
    draw_label(&mut badge, font);
    badge
}

fn outside_rounded_rect(x: u32, y: u32) -> bool {
    let r = CORNER_RADIUS;
    let fx = x as f32 + 0.5;
    let fy = y as f32 + 0.5;
    let cx = fx.clamp(r, BADGE_W as f32 - r);
    let cy = fy.clamp(r, BADGE_H as f32 - r);
    let dx = fx - cx;
    let dy = fy - cy;
    dx * dx + dy * dy > r * r
}

/// Lay out the label centered at x=30 with the baseline at y=14, then
/// rasterize white glyphs with coverage as alpha.
fn draw_label(badge: &mut RgbaImage, font: &FontArc) {
    let scaled = font.as_scaled(LABEL_SIZE);

    let mut glyphs = Vec::new();
    let mut cursor = 0.0f32;
    let mut prev = None;
    for ch in LABEL.chars() {
        let id = font.glyph_id(ch);
        if let Some(p) = prev {
            cursor += scaled.kern(p, id);
        }
        glyphs.push((id, cursor));
        cursor += scaled.h_advance(id);
        prev = Some(id);
    }

    let origin_x = BADGE_W as f32 / 2.0 - cursor / 2.0;
    let baseline = 14.0f32;

    for (id, gx) in glyphs {
        let glyph = id.with_scale_and_position(LABEL_SIZE, point(origin_x + gx, baseline));
        if let Some(outlined) = font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|px, py, cov| {
                let bx = bounds.min.x as i32 + px as i32;
                let by = bounds.min.y as i32 + py as i32;
                if bx < 0 || by < 0 || bx >= BADGE_W as i32 || by >= BADGE_H as i32 {
                    return;
                }
                let (bx, by) = (bx as u32, by as u32);
                let base = *badge.get_pixel(bx, by);
                let ink = Rgba([255, 255, 255, (cov * 255.0).round() as u8]);
                badge.put_pixel(bx, by, canvas::blend_pixel(base, ink, BlendMode::Normal));
            });
        }
    }
}

// 3x5 bitmaps for the fallback label, one row per byte (low 3 bits used)
const FALLBACK_GLYPHS: [[u8; 5]; 6] = [
    [0b111, 0b101, 0b111, 0b100, 0b100], // P
    [0b010, 0b000, 0b010, 0b010, 0b010], // i
    [0b011, 0b100, 0b100, 0b100, 0b011], // c
    [0b111, 0b101, 0b111, 0b001, 0b111], // g
    [0b010, 0b010, 0b010, 0b010, 0b010], // l
    [0b011, 0b101, 0b110, 0b100, 0b011], // e
];

/// Stamp "Picgle" in white pixel glyphs, top-left corner at (`ox`, `oy`).
fn draw_fallback_label(dest: &mut RgbaImage, ox: u32, oy: u32) {
    let (dw, dh) = dest.dimensions();
    for (g, rows) in FALLBACK_GLYPHS.iter().enumerate() {
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..3u32 {
                if bits >> (2 - col) & 1 == 0 {
                    continue;
                }
                let x = ox + g as u32 * 4 + col;
                let y = oy + row as u32;
                if x < dw && y < dh {
                    dest.put_pixel(x, y, Rgba([255, 255, 255, 255]));
                }
            }
        }
    }
}

fn badge_font() -> Option<&'static FontArc> {
    static FONT: OnceLock<Option<FontArc>> = OnceLock::new();
    FONT.get_or_init(load_bold_sans).as_ref()
}

fn load_bold_sans() -> Option<FontArc> {
    use font_kit::family_name::FamilyName;
    use font_kit::properties::{Properties, Weight};
    use font_kit::source::SystemSource;

    let mut props = Properties::new();
    props.weight = Weight::BOLD;
    let handle = SystemSource::new()
        .select_best_match(&[FamilyName::SansSerif], &props)
        .ok()?;
    let font = handle.load().ok()?;
    let bytes: Vec<u8> = (*font.copy_font_data()?).clone();
    FontArc::try_from_vec(bytes).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stamp_leaves_input_untouched() {
        let src = RgbaImage::from_pixel(200, 100, Rgba([255, 255, 255, 255]));
        let before = src.clone();
        let _ = stamp(&src);
        assert_eq!(src.as_raw(), before.as_raw());
    }

    #[test]
    fn stamp_only_touches_the_corner_region() {
        let (w, h) = (200u32, 100u32);
        let src = RgbaImage::from_pixel(w, h, Rgba([255, 255, 255, 255]));
        let out = stamp(&src);

        // The badge (either variant) stays inside [w-65, w-5) x [h-25, h-5)
        for (x, y, px) in out.enumerate_pixels() {
            let in_region = x >= w - 65 && x < w - 5 && y >= h - 25 && y < h - 5;
            if !in_region {
                assert_eq!(px, src.get_pixel(x, y), "pixel ({x},{y}) changed");
            }
        }

        // Both badge variants cover this pixel (above the label) with dark
        // ink over white
        let probe = out.get_pixel(w - 55, h - 24);
        assert!(probe[0] < 255, "badge not drawn");
    }

    #[test]
    fn stamp_on_tiny_image_does_not_panic() {
        let src = RgbaImage::from_pixel(10, 8, Rgba([0, 0, 0, 255]));
        let out = stamp(&src);
        assert_eq!(out.dimensions(), (10, 8));
    }
}
