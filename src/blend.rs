//! Layered blend compositing — stacking uploaded images into one canvas.
//!
//! Layers are kept top-first: index 0 is the topmost layer, the last entry
//! is the bottom of the stack. Rendering walks the stack bottom-up onto a
//! filled canvas; the bottommost layer (or a sole layer) is always drawn as
//! a plain copy so the configured blend mode only mixes the layers above it.

use image::imageops::{self, FilterType};
use image::RgbaImage;
use uuid::Uuid;

use crate::canvas::{self, Background, BlendMode};
use crate::error::PicgleError;
use crate::progress::ProgressReporter;
use crate::watermark;

pub const DEFAULT_WIDTH: u32 = 700;
pub const DEFAULT_HEIGHT: u32 = 525;

/// One stacked image with its per-layer settings.
pub struct ImageLayer {
    pub id: String,
    pub name: String,
    pub image: RgbaImage,
    pub invert: bool,
}

impl ImageLayer {
    pub fn new(name: impl Into<String>, image: RgbaImage) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            image,
            invert: false,
        }
    }
}

/// Blend mode plus the backdrop the stack composites onto.
#[derive(Clone, Copy, Debug)]
pub struct BlendConfig {
    pub mode: BlendMode,
    pub background: Background,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            mode: BlendMode::Normal,
            background: Background::PREVIEW_GRAY,
        }
    }
}

#[derive(Default)]
pub struct BlendStack {
    layers: Vec<ImageLayer>,
    pub config: BlendConfig,
    pub global_invert: bool,
    pub include_watermark: bool,
}

impl BlendStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layers(&self) -> &[ImageLayer] {
        &self.layers
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Add a batch of images on top of the stack. Within the batch the
    /// first image ends up bottommost of the new ones, so a multi-file
    /// upload reads top-to-bottom in its selection order.
    pub fn add_images(&mut self, batch: impl IntoIterator<Item = ImageLayer>) {
        let mut incoming: Vec<ImageLayer> = batch.into_iter().collect();
        incoming.reverse();
        incoming.append(&mut self.layers);
        self.layers = incoming;
    }

    /// Move the layer at `from` so it sits at `to` (positions after the
    /// removal, clamped to the stack length).
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<(), PicgleError> {
        if from >= self.layers.len() {
            return Err(PicgleError::State(format!(
                "no layer at position {}",
                from
            )));
        }
        let layer = self.layers.remove(from);
        let to = to.min(self.layers.len());
        self.layers.insert(to, layer);
        Ok(())
    }

    pub fn toggle_invert(&mut self, id: &str) -> Result<(), PicgleError> {
        match self.layers.iter_mut().find(|l| l.id == id) {
            Some(layer) => {
                layer.invert = !layer.invert;
                Ok(())
            }
            None => Err(PicgleError::State(format!("no layer with id {}", id))),
        }
    }

    /// Drop every layer and restore the default mode and backdrop.
    pub fn clear(&mut self) {
        self.layers.clear();
        self.config = BlendConfig::default();
        self.global_invert = false;
    }

    /// Quick preset: white backdrop, multiply mixing.
    pub fn set_white_multiply(&mut self) {
        self.config = BlendConfig {
            mode: BlendMode::Multiply,
            background: Background::WHITE,
        };
    }

    /// Quick preset: black backdrop, screen mixing.
    pub fn set_black_screen(&mut self) {
        self.config = BlendConfig {
            mode: BlendMode::Screen,
            background: Background::BLACK,
        };
    }

    /// Composite the stack onto a `width × height` canvas.
    ///
    /// Each layer is scaled to fit (aspect preserved) and centered. The
    /// bottommost layer lands as a plain copy; the rest use the configured
    /// mode. The watermark and the global inversion apply last, in that
    /// order.
    pub fn render(
        &self,
        width: u32,
        height: u32,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<RgbaImage, PicgleError> {
        if self.layers.is_empty() {
            return Err(PicgleError::State("no images to blend".to_string()));
        }

        let mut dest = canvas::new_filled(width, height, self.config.background);
        let count = self.layers.len();

        for (drawn, layer) in self.layers.iter().rev().enumerate() {
            progress.report(
                drawn as f64 / count as f64 * 90.0,
                &format!("Processing layer {}...", drawn + 1),
            );

            let mut source = layer.image.clone();
            if layer.invert {
                canvas::invert_in_place(&mut source);
            }

            // drawn == 0 is the bottom of the stack
            let mode = if drawn == 0 || count == 1 {
                BlendMode::Normal
            } else {
                self.config.mode
            };
            draw_fitted(&mut dest, &source, mode);
        }

        if self.include_watermark {
            dest = watermark::stamp(&dest);
        }

        if self.global_invert {
            progress.report(95.0, "Applying global inversion...");
            canvas::invert_in_place(&mut dest);
        }

        Ok(dest)
    }
}

/// Scale `src` to fit inside `dest` (aspect preserved), center it, and
/// composite with `mode`.
fn draw_fitted(dest: &mut RgbaImage, src: &RgbaImage, mode: BlendMode) {
    let (dw, dh) = dest.dimensions();
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 || dw == 0 || dh == 0 {
        return;
    }

    let ratio = (dw as f64 / sw as f64).min(dh as f64 / sh as f64);
    let draw_w = ((sw as f64 * ratio).round() as u32).max(1);
    let draw_h = ((sh as f64 * ratio).round() as u32).max(1);
    let off_x = (dw - draw_w.min(dw)) / 2;
    let off_y = (dh - draw_h.min(dh)) / 2;

    let scaled = if (draw_w, draw_h) == (sw, sh) {
        src.clone()
    } else {
        imageops::resize(src, draw_w, draw_h, FilterType::Triangle)
    };

    for (sx, sy, &px) in scaled.enumerate_pixels() {
        let dx = off_x + sx;
        let dy = off_y + sy;
        if dx >= dw || dy >= dh {
            continue;
        }
        let base = *dest.get_pixel(dx, dy);
        dest.put_pixel(dx, dy, canvas::blend_pixel(base, px, mode));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use image::Rgba;

    fn solid(w: u32, h: u32, rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(w, h, Rgba(rgba))
    }

    fn render(stack: &BlendStack, w: u32, h: u32) -> RgbaImage {
        let mut sink = NullSink;
        let mut progress = ProgressReporter::new(&mut sink);
        stack.render(w, h, &mut progress).unwrap()
    }

    #[test]
    fn batch_upload_prepends_reversed() {
        let mut stack = BlendStack::new();
        stack.add_images(vec![
            ImageLayer::new("a", solid(1, 1, [0, 0, 0, 255])),
            ImageLayer::new("b", solid(1, 1, [0, 0, 0, 255])),
            ImageLayer::new("c", solid(1, 1, [0, 0, 0, 255])),
        ]);
        let names: Vec<&str> = stack.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["c", "b", "a"]);

        stack.add_images(vec![ImageLayer::new("d", solid(1, 1, [0, 0, 0, 255]))]);
        let names: Vec<&str> = stack.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["d", "c", "b", "a"]);
    }

    #[test]
    fn move_layer_reorders() {
        let mut stack = BlendStack::new();
        stack.add_images(vec![
            ImageLayer::new("a", solid(1, 1, [0, 0, 0, 255])),
            ImageLayer::new("b", solid(1, 1, [0, 0, 0, 255])),
            ImageLayer::new("c", solid(1, 1, [0, 0, 0, 255])),
        ]);
        // [c, b, a] -> move c to the bottom
        stack.move_layer(0, 2).unwrap();
        let names: Vec<&str> = stack.layers().iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, ["b", "a", "c"]);
        assert!(stack.move_layer(9, 0).is_err());
    }

    #[test]
    fn sole_layer_ignores_blend_mode() {
        let mut stack = BlendStack::new();
        stack.config.mode = BlendMode::Multiply;
        stack.add_images(vec![ImageLayer::new("red", solid(8, 8, [255, 0, 0, 255]))]);
        let out = render(&stack, 8, 8);
        // Multiply against the gray backdrop would darken; a sole layer
        // must come through untouched.
        assert_eq!(*out.get_pixel(4, 4), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn upper_layers_use_the_configured_mode() {
        let mut stack = BlendStack::new();
        stack.config.mode = BlendMode::Multiply;
        // Upload order: white first (ends up bottom), then gray on top
        stack.add_images(vec![
            ImageLayer::new("white", solid(4, 4, [255, 255, 255, 255])),
            ImageLayer::new("gray", solid(4, 4, [128, 128, 128, 255])),
        ]);
        let out = render(&stack, 4, 4);
        // white drawn plain, gray multiplied over it -> gray
        assert_eq!(*out.get_pixel(2, 2), Rgba([128, 128, 128, 255]));
    }

    #[test]
    fn layers_scale_to_fit_centered() {
        let mut stack = BlendStack::new();
        stack.config.background = Background::WHITE;
        stack.add_images(vec![ImageLayer::new("wide", solid(4, 2, [0, 0, 255, 255]))]);
        let out = render(&stack, 10, 10);
        // 4x2 fits as 10x5, centered vertically; top rows stay backdrop
        assert_eq!(*out.get_pixel(5, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*out.get_pixel(5, 5), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn global_invert_flips_the_whole_canvas() {
        let mut stack = BlendStack::new();
        stack.global_invert = true;
        stack.add_images(vec![ImageLayer::new("black", solid(6, 6, [0, 0, 0, 255]))]);
        let out = render(&stack, 6, 6);
        assert_eq!(*out.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn per_layer_invert_applies_before_draw() {
        let mut stack = BlendStack::new();
        stack.add_images(vec![ImageLayer::new("black", solid(6, 6, [0, 0, 0, 255]))]);
        let id = stack.layers()[0].id.clone();
        stack.toggle_invert(&id).unwrap();
        let out = render(&stack, 6, 6);
        assert_eq!(*out.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn rendering_an_empty_stack_fails() {
        let stack = BlendStack::new();
        let mut sink = NullSink;
        let mut progress = ProgressReporter::new(&mut sink);
        assert!(stack.render(4, 4, &mut progress).is_err());
    }

    #[test]
    fn clear_restores_defaults() {
        let mut stack = BlendStack::new();
        stack.set_black_screen();
        stack.global_invert = true;
        stack.add_images(vec![ImageLayer::new("x", solid(1, 1, [9, 9, 9, 255]))]);
        stack.clear();
        assert!(stack.is_empty());
        assert_eq!(stack.config.mode, BlendMode::Normal);
        assert_eq!(stack.config.background, Background::PREVIEW_GRAY);
        assert!(!stack.global_invert);
    }
}
