//! PNG encoding and artifact packaging for decomposition runs.
//!
//! The export driver hands named PNG blobs to an [`ArtifactWriter`]; the
//! zip writer packs them into a `{base}_{shape}_layers.zip` archive, the
//! directory writer drops them as loose files. Layer encoding runs in
//! parallel, writing stays sequential so archive entry order is stable.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::RgbaImage;
use image::codecs::png::PngEncoder;
use rayon::prelude::*;
use zip::ZipWriter;
use zip::write::FileOptions;

use crate::error::PicgleError;
use crate::progress::ProgressReporter;
use crate::session::DecomposeSession;

/// Encode an RGBA buffer as PNG into memory.
pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, PicgleError> {
    let mut bytes = Vec::new();
    let encoder = PngEncoder::new(&mut bytes);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    Ok(bytes)
}

/// Encode and write one image straight to a file.
pub fn write_png(image: &RgbaImage, path: &Path) -> Result<(), PicgleError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    let encoder = PngEncoder::new(&mut writer);
    #[allow(deprecated)]
    encoder.encode(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::Rgba8,
    )?;
    writer.flush()?;
    Ok(())
}

/// Destination for the named blobs an export run produces.
pub trait ArtifactWriter {
    fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), PicgleError>;
    /// Flush and finalize. Called exactly once, after the last blob.
    fn finish(&mut self) -> Result<(), PicgleError>;
}

/// Packs blobs into a single zip archive under one folder entry.
pub struct ZipArchiveWriter {
    inner: Option<ZipWriter<BufWriter<File>>>,
    folder: String,
}

impl ZipArchiveWriter {
    pub fn create(path: &Path, folder: &str) -> Result<Self, PicgleError> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Some(ZipWriter::new(BufWriter::new(file))),
            folder: folder.to_string(),
        })
    }
}

impl ArtifactWriter for ZipArchiveWriter {
    fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), PicgleError> {
        let zip = self
            .inner
            .as_mut()
            .ok_or_else(|| PicgleError::Export("archive already finalized".to_string()))?;
        let options =
            FileOptions::default().compression_method(zip::CompressionMethod::Deflated);
        zip.start_file(format!("{}/{}", self.folder, name), options)?;
        zip.write_all(bytes)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PicgleError> {
        if let Some(mut zip) = self.inner.take() {
            zip.finish()?;
        }
        Ok(())
    }
}

/// Drops blobs as loose files inside a directory.
pub struct DirArtifactWriter {
    dir: PathBuf,
}

impl DirArtifactWriter {
    pub fn create(dir: &Path) -> Result<Self, PicgleError> {
        fs::create_dir_all(dir)?;
        Ok(Self { dir: dir.to_path_buf() })
    }
}

impl ArtifactWriter for DirArtifactWriter {
    fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), PicgleError> {
        fs::write(self.dir.join(name), bytes)?;
        Ok(())
    }

    fn finish(&mut self) -> Result<(), PicgleError> {
        Ok(())
    }
}

/// The folder (and default archive stem) a run exports into.
pub fn export_folder_name(base: &str, shape: &str) -> String {
    format!("{}_{}_layers", base, shape)
}

/// Write a finished run out as named PNGs: the original, every piece
/// (1-based), and the merged preview.
pub fn export_session(
    session: &DecomposeSession,
    writer: &mut dyn ArtifactWriter,
    progress: &mut ProgressReporter<'_>,
) -> Result<(), PicgleError> {
    if session.layers().is_empty() {
        return Err(PicgleError::Export(
            "no decomposed layers to export".to_string(),
        ));
    }
    let base = session.name().unwrap_or("image");
    let shape = session
        .last_shape()
        .map(|s| s.name())
        .unwrap_or("blocks");

    // Encode everything up front; the pieces in parallel
    let encoded: Vec<Vec<u8>> = session
        .layers()
        .par_iter()
        .map(encode_png)
        .collect::<Result<_, _>>()?;

    if let Some(source) = session.source() {
        progress.report(10.0, "Adding original image...");
        writer.write_blob(&format!("{}_original.png", base), &encode_png(source)?)?;
    }

    let count = encoded.len();
    for (i, bytes) in encoded.iter().enumerate() {
        progress.report_window(
            10.0,
            80.0,
            i as f64 / count as f64,
            &format!("Adding layer {}...", i + 1),
        );
        writer.write_blob(&format!("{}_{}_piece_{}.png", base, shape, i + 1), bytes)?;
    }

    if let Some(preview) = session.preview() {
        progress.report(80.0, "Adding merged preview...");
        writer.write_blob(
            &format!("{}_{}_merged.png", base, shape),
            &encode_png(preview)?,
        )?;
    }

    progress.report(90.0, "Generating ZIP file...");
    writer.finish()?;
    progress.finish("Export complete");

    log_info!("Exported {} pieces for '{}'", count, base);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecomposeConfig;
    use crate::progress::NullSink;
    use image::Rgba;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    struct MemoryWriter {
        blobs: Vec<(String, Vec<u8>)>,
        finished: bool,
    }

    impl MemoryWriter {
        fn new() -> Self {
            Self { blobs: Vec::new(), finished: false }
        }
    }

    impl ArtifactWriter for MemoryWriter {
        fn write_blob(&mut self, name: &str, bytes: &[u8]) -> Result<(), PicgleError> {
            self.blobs.push((name.to_string(), bytes.to_vec()));
            Ok(())
        }

        fn finish(&mut self) -> Result<(), PicgleError> {
            self.finished = true;
            Ok(())
        }
    }

    fn decomposed_session() -> DecomposeSession {
        let mut s = DecomposeSession::new();
        s.set_image(
            "photo",
            RgbaImage::from_pixel(12, 12, Rgba([50, 100, 150, 255])),
        );
        let cfg = DecomposeConfig {
            include_watermark: false,
            ..DecomposeConfig::default()
        };
        let mut rng = StdRng::seed_from_u64(9);
        s.decompose(&cfg, &mut rng, &mut NullSink).unwrap();
        s
    }

    #[test]
    fn export_names_follow_the_layer_scheme() {
        let s = decomposed_session();
        let mut writer = MemoryWriter::new();
        let mut sink = NullSink;
        let mut progress = ProgressReporter::new(&mut sink);
        export_session(&s, &mut writer, &mut progress).unwrap();

        let names: Vec<&str> = writer.blobs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names[0], "photo_original.png");
        assert_eq!(names[1], "photo_blocks_piece_1.png");
        assert_eq!(names[5], "photo_blocks_piece_5.png");
        assert_eq!(*names.last().unwrap(), "photo_blocks_merged.png");
        assert!(writer.finished);
    }

    #[test]
    fn exported_blobs_are_valid_png() {
        let s = decomposed_session();
        let mut writer = MemoryWriter::new();
        let mut sink = NullSink;
        let mut progress = ProgressReporter::new(&mut sink);
        export_session(&s, &mut writer, &mut progress).unwrap();

        for (name, bytes) in &writer.blobs {
            let decoded = image::load_from_memory(bytes)
                .unwrap_or_else(|e| panic!("{name} did not decode: {e}"));
            assert_eq!(decoded.width(), 12);
            assert_eq!(decoded.height(), 12);
        }
    }

    #[test]
    fn export_without_a_run_fails() {
        let s = DecomposeSession::new();
        let mut writer = MemoryWriter::new();
        let mut sink = NullSink;
        let mut progress = ProgressReporter::new(&mut sink);
        assert!(export_session(&s, &mut writer, &mut progress).is_err());
        assert!(writer.blobs.is_empty());
    }

    #[test]
    fn folder_name_combines_base_and_shape() {
        assert_eq!(export_folder_name("pic", "voronoi"), "pic_voronoi_layers");
    }
}
