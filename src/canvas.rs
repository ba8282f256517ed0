use image::{Rgba, RgbaImage};
use rayon::prelude::*;

// ============================================================================
// BACKGROUND FILLS
// ============================================================================

/// Background used to initialize layer and preview buffers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Background {
    /// All-zero pixels (alpha 0).
    Transparent,
    /// An opaque fill color (alpha forced to 255).
    Solid([u8; 3]),
}

impl Background {
    pub const WHITE: Background = Background::Solid([255, 255, 255]);
    pub const BLACK: Background = Background::Solid([0, 0, 0]);
    /// The page gray the original blend preview used.
    pub const PREVIEW_GRAY: Background = Background::Solid([229, 231, 235]);

    /// The pixel value every buffer position starts at.
    pub fn fill_pixel(&self) -> Rgba<u8> {
        match self {
            Background::Transparent => Rgba([0, 0, 0, 0]),
            Background::Solid([r, g, b]) => Rgba([*r, *g, *b, 255]),
        }
    }

    pub fn is_transparent(&self) -> bool {
        matches!(self, Background::Transparent)
    }
}

/// Allocate a `width × height` buffer with every pixel set to `background`.
pub fn new_filled(width: u32, height: u32, background: Background) -> RgbaImage {
    RgbaImage::from_pixel(width, height, background.fill_pixel())
}

// ============================================================================
// BLEND MODES
// ============================================================================

/// Separable blend modes matching the platform composite operators the
/// original preview offered, plus `Overwrite` for plain source copies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
    Screen,
    Overlay,
    Darken,
    Lighten,
    ColorDodge,
    ColorBurn,
    HardLight,
    SoftLight,
    Difference,
    Exclusion,
    Overwrite,
}

impl BlendMode {
    /// All user-selectable modes, in menu order (`Overwrite` is internal).
    pub fn all() -> &'static [BlendMode] {
        &[
            BlendMode::Normal,
            BlendMode::Multiply,
            BlendMode::Screen,
            BlendMode::Overlay,
            BlendMode::Darken,
            BlendMode::Lighten,
            BlendMode::ColorDodge,
            BlendMode::ColorBurn,
            BlendMode::HardLight,
            BlendMode::SoftLight,
            BlendMode::Difference,
            BlendMode::Exclusion,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            BlendMode::Normal => "normal",
            BlendMode::Multiply => "multiply",
            BlendMode::Screen => "screen",
            BlendMode::Overlay => "overlay",
            BlendMode::Darken => "darken",
            BlendMode::Lighten => "lighten",
            BlendMode::ColorDodge => "color-dodge",
            BlendMode::ColorBurn => "color-burn",
            BlendMode::HardLight => "hard-light",
            BlendMode::SoftLight => "soft-light",
            BlendMode::Difference => "difference",
            BlendMode::Exclusion => "exclusion",
            BlendMode::Overwrite => "overwrite",
        }
    }

    /// Parse a mode name as the CLI accepts it (hyphenated, case-insensitive).
    pub fn from_name(name: &str) -> Option<BlendMode> {
        let lower = name.to_lowercase();
        BlendMode::all().iter().copied().find(|m| m.name() == lower)
    }
}

/// Blend `top` onto `base` with the given mode.
///
/// Straight-alpha "over" compositing: the blended RGB replaces the top
/// color where the backdrop is opaque, then the result is composited by
/// the top pixel's alpha, exactly like the platform composite operators
/// the original relied on.
pub fn blend_pixel(base: Rgba<u8>, top: Rgba<u8>, mode: BlendMode) -> Rgba<u8> {
    if mode == BlendMode::Overwrite {
        return top;
    }
    // Fast path: fully transparent top pixel — nothing to blend
    if top[3] == 0 {
        return base;
    }
    // Fast path: Normal blend with a fully opaque top pixel — just overwrite
    if mode == BlendMode::Normal && top[3] == 255 {
        return top;
    }

    let base_r = base[0] as f32 / 255.0;
    let base_g = base[1] as f32 / 255.0;
    let base_b = base[2] as f32 / 255.0;
    let base_a = base[3] as f32 / 255.0;

    let top_r = top[0] as f32 / 255.0;
    let top_g = top[1] as f32 / 255.0;
    let top_b = top[2] as f32 / 255.0;
    let top_a = top[3] as f32 / 255.0;

    let (r, g, b) = match mode {
        BlendMode::Normal => (top_r, top_g, top_b),
        BlendMode::Multiply => (base_r * top_r, base_g * top_g, base_b * top_b),
        BlendMode::Screen => (
            1.0 - (1.0 - base_r) * (1.0 - top_r),
            1.0 - (1.0 - base_g) * (1.0 - top_g),
            1.0 - (1.0 - base_b) * (1.0 - top_b),
        ),
        BlendMode::Overlay => (
            overlay_channel(base_r, top_r),
            overlay_channel(base_g, top_g),
            overlay_channel(base_b, top_b),
        ),
        BlendMode::Darken => (base_r.min(top_r), base_g.min(top_g), base_b.min(top_b)),
        BlendMode::Lighten => (base_r.max(top_r), base_g.max(top_g), base_b.max(top_b)),
        BlendMode::ColorDodge => (
            color_dodge_channel(base_r, top_r),
            color_dodge_channel(base_g, top_g),
            color_dodge_channel(base_b, top_b),
        ),
        BlendMode::ColorBurn => (
            color_burn_channel(base_r, top_r),
            color_burn_channel(base_g, top_g),
            color_burn_channel(base_b, top_b),
        ),
        BlendMode::HardLight => (
            overlay_channel(top_r, base_r),
            overlay_channel(top_g, base_g),
            overlay_channel(top_b, base_b),
        ),
        BlendMode::SoftLight => (
            soft_light_channel(base_r, top_r),
            soft_light_channel(base_g, top_g),
            soft_light_channel(base_b, top_b),
        ),
        BlendMode::Difference => (
            (base_r - top_r).abs(),
            (base_g - top_g).abs(),
            (base_b - top_b).abs(),
        ),
        BlendMode::Exclusion => (
            base_r + top_r - 2.0 * base_r * top_r,
            base_g + top_g - 2.0 * base_g * top_g,
            base_b + top_b - 2.0 * base_b * top_b,
        ),
        BlendMode::Overwrite => unreachable!(),
    };

    let out_a = top_a + base_a * (1.0 - top_a);
    if out_a == 0.0 {
        return Rgba([0, 0, 0, 0]);
    }

    // The blended color only takes effect where the backdrop is opaque;
    // over a transparent backdrop the top color shows through as-is.
    let r = r * base_a + top_r * (1.0 - base_a);
    let g = g * base_a + top_g * (1.0 - base_a);
    let b = b * base_a + top_b * (1.0 - base_a);

    let out_r = (r * top_a + base_r * base_a * (1.0 - top_a)) / out_a;
    let out_g = (g * top_a + base_g * base_a * (1.0 - top_a)) / out_a;
    let out_b = (b * top_a + base_b * base_a * (1.0 - top_a)) / out_a;

    Rgba([
        (out_r * 255.0).clamp(0.0, 255.0).round() as u8,
        (out_g * 255.0).clamp(0.0, 255.0).round() as u8,
        (out_b * 255.0).clamp(0.0, 255.0).round() as u8,
        (out_a * 255.0).clamp(0.0, 255.0).round() as u8,
    ])
}

// Blend mode channel helpers
fn overlay_channel(base: f32, top: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * top
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - top)
    }
}

fn color_burn_channel(base: f32, top: f32) -> f32 {
    if top == 0.0 {
        0.0
    } else {
        (1.0 - (1.0 - base) / top).max(0.0)
    }
}

fn color_dodge_channel(base: f32, top: f32) -> f32 {
    if top >= 1.0 {
        1.0
    } else {
        (base / (1.0 - top)).min(1.0)
    }
}

/// W3C Soft Light formula.
fn soft_light_channel(base: f32, top: f32) -> f32 {
    if top <= 0.5 {
        base - (1.0 - 2.0 * top) * base * (1.0 - base)
    } else {
        let d = if base <= 0.25 {
            ((16.0 * base - 12.0) * base + 4.0) * base
        } else {
            base.sqrt()
        };
        base + (2.0 * top - 1.0) * (d - base)
    }
}

// ============================================================================
// COMPOSITING
// ============================================================================

/// Draw `src` onto `dest` in place using `mode`. Both buffers must share
/// dimensions. Rows are processed in parallel; the per-pixel result does
/// not depend on processing order.
pub fn composite_over(dest: &mut RgbaImage, src: &RgbaImage, mode: BlendMode) {
    debug_assert_eq!(dest.dimensions(), src.dimensions());
    let row_len = dest.width() as usize * 4;
    if row_len == 0 {
        return;
    }

    dest.par_chunks_exact_mut(row_len)
        .zip(src.as_raw().par_chunks_exact(row_len))
        .for_each(|(dest_row, src_row)| {
            for (d, s) in dest_row.chunks_exact_mut(4).zip(src_row.chunks_exact(4)) {
                let out = blend_pixel(
                    Rgba([d[0], d[1], d[2], d[3]]),
                    Rgba([s[0], s[1], s[2], s[3]]),
                    mode,
                );
                d.copy_from_slice(&out.0);
            }
        });
}

/// Composite an ordered layer stack back into one preview buffer.
///
/// The destination starts at `background` and every layer is drawn in
/// sequence order with `mode`. Unlike a shared canvas context there is no
/// composite-operator state left behind — each call starts clean.
pub fn recombine(
    layers: &[RgbaImage],
    width: u32,
    height: u32,
    background: Background,
    mode: BlendMode,
) -> RgbaImage {
    let mut dest = new_filled(width, height, background);
    for layer in layers {
        composite_over(&mut dest, layer, mode);
    }
    dest
}

// ============================================================================
// COLOR INVERSION
// ============================================================================

/// `255 - v` on each of R, G, B; alpha passes through unchanged.
#[inline]
pub fn invert_pixel(px: Rgba<u8>) -> Rgba<u8> {
    Rgba([255 - px[0], 255 - px[1], 255 - px[2], px[3]])
}

/// Invert every pixel's RGB in place (alpha untouched).
pub fn invert_in_place(img: &mut RgbaImage) {
    for px in img.pixels_mut() {
        *px = invert_pixel(*px);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invert_round_trips_every_channel_value() {
        for v in 0..=255u8 {
            let px = Rgba([v, 255 - v, v, v]);
            assert_eq!(invert_pixel(invert_pixel(px)), px);
        }
    }

    #[test]
    fn invert_leaves_alpha_alone() {
        let px = Rgba([10, 20, 30, 77]);
        assert_eq!(invert_pixel(px)[3], 77);
    }

    #[test]
    fn multiply_on_opaque_pixels() {
        let base = Rgba([255, 128, 0, 255]);
        let top = Rgba([128, 128, 128, 255]);
        let out = blend_pixel(base, top, BlendMode::Multiply);
        assert_eq!(out[0], 128);
        assert_eq!(out[1], 64);
        assert_eq!(out[2], 0);
        assert_eq!(out[3], 255);
    }

    #[test]
    fn screen_of_black_is_identity() {
        let base = Rgba([40, 90, 200, 255]);
        let out = blend_pixel(base, Rgba([0, 0, 0, 255]), BlendMode::Screen);
        assert_eq!(out, base);
    }

    #[test]
    fn transparent_top_is_a_noop() {
        let base = Rgba([1, 2, 3, 4]);
        for &mode in BlendMode::all() {
            assert_eq!(blend_pixel(base, Rgba([9, 9, 9, 0]), mode), base);
        }
    }

    #[test]
    fn overwrite_ignores_base_entirely() {
        let out = blend_pixel(Rgba([1, 2, 3, 255]), Rgba([9, 8, 7, 0]), BlendMode::Overwrite);
        assert_eq!(out, Rgba([9, 8, 7, 0]));
    }

    #[test]
    fn blend_over_transparent_backdrop_keeps_top_color() {
        // Multiply against a transparent backdrop must not darken toward
        // the meaningless backdrop RGB — the top color shows through.
        let out = blend_pixel(Rgba([0, 0, 0, 0]), Rgba([200, 100, 50, 255]), BlendMode::Multiply);
        assert_eq!(out, Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn recombine_is_deterministic() {
        let a = RgbaImage::from_pixel(4, 3, Rgba([200, 10, 10, 255]));
        let b = RgbaImage::from_pixel(4, 3, Rgba([10, 200, 10, 128]));
        let layers = vec![a, b];
        let first = recombine(&layers, 4, 3, Background::WHITE, BlendMode::Multiply);
        let second = recombine(&layers, 4, 3, Background::WHITE, BlendMode::Multiply);
        assert_eq!(first.as_raw(), second.as_raw());
    }

    #[test]
    fn recombine_transparent_background_starts_clear() {
        let out = recombine(&[], 2, 2, Background::Transparent, BlendMode::Normal);
        assert!(out.pixels().all(|p| p[3] == 0));
    }

    #[test]
    fn mode_names_round_trip() {
        for &mode in BlendMode::all() {
            assert_eq!(BlendMode::from_name(mode.name()), Some(mode));
        }
        assert_eq!(BlendMode::from_name("COLOR-DODGE"), Some(BlendMode::ColorDodge));
        assert_eq!(BlendMode::from_name("plasma"), None);
    }
}
