//! Decomposition session — the lifecycle driver behind the CLI.
//!
//! Holds the loaded source, the layers of the most recent run, and the
//! recombined preview. A failed operation never clobbers the last good
//! state: new layers are committed only after the whole run succeeds.

use std::path::Path;

use image::RgbaImage;
use rand::Rng;

use crate::canvas;
use crate::config::{DecomposeConfig, BackgroundType, Shape};
use crate::decompose;
use crate::error::PicgleError;
use crate::progress::{ProgressReporter, ProgressSink};

#[derive(Default)]
pub struct DecomposeSession {
    name: Option<String>,
    source: Option<RgbaImage>,
    layers: Vec<RgbaImage>,
    preview: Option<RgbaImage>,
    last_shape: Option<Shape>,
    last_background: BackgroundType,
    advanced_unlocked: bool,
}

impl DecomposeSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode an image file and make it the session source. Any previous
    /// layers and preview are discarded.
    pub fn load_image(&mut self, path: &Path) -> Result<(), PicgleError> {
        let decoded = image::open(path).map_err(|e| PicgleError::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        log_info!(
            "Loaded '{}' ({}x{})",
            path.display(),
            decoded.width(),
            decoded.height()
        );
        self.set_image(name, decoded.into_rgba8());
        Ok(())
    }

    /// Install an already-decoded source, resetting prior run state.
    pub fn set_image(&mut self, name: impl Into<String>, image: RgbaImage) {
        self.name = Some(name.into());
        self.source = Some(image);
        self.layers.clear();
        self.preview = None;
        self.last_shape = None;
    }

    /// Permanently raise the piece-count ceiling for this session.
    pub fn unlock_advanced(&mut self) {
        if !self.advanced_unlocked {
            self.advanced_unlocked = true;
            log_info!("Advanced piece counts unlocked");
        }
    }

    pub fn advanced_unlocked(&self) -> bool {
        self.advanced_unlocked
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn source(&self) -> Option<&RgbaImage> {
        self.source.as_ref()
    }

    pub fn layers(&self) -> &[RgbaImage] {
        &self.layers
    }

    pub fn preview(&self) -> Option<&RgbaImage> {
        self.preview.as_ref()
    }

    pub fn last_shape(&self) -> Option<Shape> {
        self.last_shape
    }

    /// Run a full decomposition: validate, optionally stamp the watermark,
    /// partition, and rebuild the recombined preview. Replaces the layers
    /// of any previous run only on success.
    pub fn decompose(
        &mut self,
        cfg: &DecomposeConfig,
        rng: &mut impl Rng,
        sink: &mut dyn ProgressSink,
    ) -> Result<(), PicgleError> {
        cfg.validate(self.advanced_unlocked)?;
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| PicgleError::State("no image loaded".to_string()))?;

        let stamped;
        let input = if cfg.include_watermark {
            stamped = crate::watermark::stamp(source);
            &stamped
        } else {
            source
        };

        log_info!(
            "Decomposing ({}, {} pieces, background {})",
            cfg.shape.name(),
            cfg.num_pieces,
            cfg.background.name()
        );

        let mut progress = ProgressReporter::new(sink);
        progress.report(0.0, "Starting decomposition...");
        let fill = cfg.background.layer_fill();
        let layers = match cfg.shape {
            Shape::Blocks => decompose::decompose_blocks(
                input,
                cfg.num_pieces,
                cfg.block_size,
                fill,
                cfg.invert_colors,
                rng,
                &mut progress,
            ),
            Shape::Voronoi => decompose::decompose_voronoi(
                input,
                cfg.num_pieces,
                cfg.num_seeds,
                fill,
                cfg.invert_colors,
                rng,
                &mut progress,
            ),
        };
        progress.finish("Decomposition complete");

        self.layers = layers;
        self.last_shape = Some(cfg.shape);
        self.last_background = cfg.background;
        self.rebuild_preview(cfg.background);
        Ok(())
    }

    /// Re-render the recombined preview under a different backdrop without
    /// re-running the partition. The layers keep the backdrop they were
    /// decomposed with.
    pub fn recombine_preview(&mut self, background: BackgroundType) -> Result<(), PicgleError> {
        if self.layers.is_empty() {
            return Err(PicgleError::State("nothing decomposed yet".to_string()));
        }
        self.last_background = background;
        self.rebuild_preview(background);
        Ok(())
    }

    fn rebuild_preview(&mut self, background: BackgroundType) {
        let Some(source) = self.source.as_ref() else {
            return;
        };
        let (w, h) = source.dimensions();
        self.preview = Some(canvas::recombine(
            &self.layers,
            w,
            h,
            background.layer_fill(),
            background.recombine_mode(),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullSink;
    use image::Rgba;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn session_with_image(w: u32, h: u32) -> DecomposeSession {
        let mut s = DecomposeSession::new();
        let img = RgbaImage::from_fn(w, h, |x, y| {
            Rgba([(x * 13 % 256) as u8, (y * 7 % 256) as u8, 99, 255])
        });
        s.set_image("test", img);
        s
    }

    fn plain_cfg() -> DecomposeConfig {
        DecomposeConfig {
            include_watermark: false,
            ..DecomposeConfig::default()
        }
    }

    #[test]
    fn decompose_requires_an_image() {
        let mut s = DecomposeSession::new();
        let mut rng = StdRng::seed_from_u64(0);
        let err = s
            .decompose(&plain_cfg(), &mut rng, &mut NullSink)
            .unwrap_err();
        assert!(matches!(err, PicgleError::State(_)));
    }

    #[test]
    fn decompose_produces_layers_and_preview() {
        let mut s = session_with_image(20, 20);
        let mut rng = StdRng::seed_from_u64(1);
        s.decompose(&plain_cfg(), &mut rng, &mut NullSink).unwrap();
        assert_eq!(s.layers().len(), 5);
        assert!(s.preview().is_some());
        assert_eq!(s.last_shape(), Some(Shape::Blocks));
    }

    #[test]
    fn transparent_layers_recombine_into_the_source() {
        // With a transparent backdrop every preview pixel is exactly one
        // layer's pixel multiplied against untouched (transparent) spots,
        // which reproduces the source bit-for-bit.
        let mut s = session_with_image(16, 12);
        let mut rng = StdRng::seed_from_u64(2);
        s.decompose(&plain_cfg(), &mut rng, &mut NullSink).unwrap();
        let preview = s.preview().unwrap();
        assert_eq!(preview.as_raw(), s.source().unwrap().as_raw());
    }

    #[test]
    fn validation_failure_keeps_previous_layers() {
        let mut s = session_with_image(10, 10);
        let mut rng = StdRng::seed_from_u64(3);
        s.decompose(&plain_cfg(), &mut rng, &mut NullSink).unwrap();
        let before = s.layers().len();

        let mut bad = plain_cfg();
        bad.num_pieces = 2;
        assert!(s.decompose(&bad, &mut rng, &mut NullSink).is_err());
        assert_eq!(s.layers().len(), before);
    }

    #[test]
    fn unlock_is_a_latch() {
        let mut s = session_with_image(10, 10);
        let mut cfg = plain_cfg();
        cfg.num_pieces = 30;
        let mut rng = StdRng::seed_from_u64(4);
        assert!(s.decompose(&cfg, &mut rng, &mut NullSink).is_err());

        s.unlock_advanced();
        s.unlock_advanced();
        assert!(s.advanced_unlocked());
        s.decompose(&cfg, &mut rng, &mut NullSink).unwrap();
        assert_eq!(s.layers().len(), 30);
    }

    #[test]
    fn loading_a_new_image_discards_run_state() {
        let mut s = session_with_image(10, 10);
        let mut rng = StdRng::seed_from_u64(5);
        s.decompose(&plain_cfg(), &mut rng, &mut NullSink).unwrap();
        s.set_image("other", RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])));
        assert!(s.layers().is_empty());
        assert!(s.preview().is_none());
        assert_eq!(s.last_shape(), None);
    }

    #[test]
    fn preview_can_switch_backdrop_without_repartitioning() {
        let mut s = session_with_image(10, 10);
        let mut rng = StdRng::seed_from_u64(6);
        s.decompose(&plain_cfg(), &mut rng, &mut NullSink).unwrap();
        let layers_before: Vec<Vec<u8>> =
            s.layers().iter().map(|l| l.as_raw().clone()).collect();

        s.recombine_preview(BackgroundType::Black).unwrap();
        let layers_after: Vec<Vec<u8>> =
            s.layers().iter().map(|l| l.as_raw().clone()).collect();
        assert_eq!(layers_before, layers_after);
        assert!(s.preview().is_some());
    }

    #[test]
    fn recombine_preview_needs_a_prior_run() {
        let mut s = session_with_image(10, 10);
        assert!(s.recombine_preview(BackgroundType::White).is_err());
    }
}
