//! Page rasterisation: PDF pages to PNG files via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state; it must not run on the
//! async workers. Every call here moves the pdfium work onto the blocking
//! pool with `tokio::task::spawn_blocking`, and every blocking task opens
//! its **own** document handle — handles are never shared across tasks, so
//! no assumption about pdfium's thread-safety is ever load-bearing.
//!
//! ## Output
//!
//! PNG (lossless — compression artefacts on stamped marginalia are exactly
//! what makes markings unreadable), rendered at a fixed DPI with alpha
//! flattened onto white, written 0600 into the run's scratch directory at
//! deterministic paths: `page-{N}.png` and `page-{N}-enhanced.png`,
//! 1-indexed.

use futures::stream::{self, StreamExt, TryStreamExt};
use image::{DynamicImage, RgbImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use super::state::{worker_count, EnhanceSettings};

/// Rendering failures. Wrapped into `WorkflowError::RenderFailed` or
/// `EnhanceFailed` by the stage that hit them.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to open PDF '{path}': {detail}")]
    Open { path: PathBuf, detail: String },

    #[error("page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("rasterisation failed for page {page}: {detail}")]
    Rasterisation { page: usize, detail: String },

    #[error("PNG encoding failed for page {page}: {source}")]
    Encode {
        page: usize,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write image '{path}': {source}")]
    ImageWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("render task panicked: {0}")]
    TaskPanicked(String),
}

/// Path of a page's initial render inside the scratch directory.
pub fn page_image_path(dir: &Path, page_number: usize) -> PathBuf {
    dir.join(format!("page-{page_number}.png"))
}

/// Path of a page's enhancement re-render inside the scratch directory.
pub fn enhanced_image_path(dir: &Path, page_number: usize) -> PathBuf {
    dir.join(format!("page-{page_number}-enhanced.png"))
}

/// Renders PDF pages to PNG files.
pub struct PageRenderer {
    dpi: u32,
}

impl PageRenderer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Count the pages of a PDF without rendering anything.
    pub async fn page_count(&self, pdf_path: &Path) -> Result<usize, RenderError> {
        let path = pdf_path.to_path_buf();
        spawn_render(move || {
            let pdfium = Pdfium::default();
            let document = open_document(&pdfium, &path)?;
            Ok(document.pages().len() as usize)
        })
        .await
    }

    /// Render every page with the default configuration, writing
    /// `page-{N}.png` files into `out_dir`. Returns the page count.
    ///
    /// Pages render concurrently under the worker-count rule; the first
    /// failure cancels the remaining renders.
    pub async fn render_all(&self, pdf_path: &Path, out_dir: &Path) -> Result<usize, RenderError> {
        let total = self.page_count(pdf_path).await?;
        let workers = worker_count(total);
        debug!(pages = total, workers, "rendering document");

        stream::iter(1..=total)
            .map(|page_number| {
                let pdf = pdf_path.to_path_buf();
                let out = page_image_path(out_dir, page_number);
                let dpi = self.dpi;
                async move {
                    spawn_render(move || render_page_blocking(&pdf, page_number, &out, dpi, None))
                        .await
                }
            })
            .buffer_unordered(workers)
            .try_collect::<Vec<()>>()
            .await?;

        Ok(total)
    }

    /// Re-render a single page with per-page adjustments, writing
    /// `page-{N}-enhanced.png`. Returns the written path.
    pub async fn render_page_with_settings(
        &self,
        pdf_path: &Path,
        page_number: usize,
        out_dir: &Path,
        settings: &EnhanceSettings,
    ) -> Result<PathBuf, RenderError> {
        let pdf = pdf_path.to_path_buf();
        let out = enhanced_image_path(out_dir, page_number);
        let dpi = self.dpi;
        let settings = settings.clone();

        let written = out.clone();
        spawn_render(move || render_page_blocking(&pdf, page_number, &out, dpi, Some(&settings)))
            .await?;
        Ok(written)
    }
}

/// Run a blocking pdfium job on the blocking pool.
async fn spawn_render<T, F>(job: F) -> Result<T, RenderError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RenderError> + Send + 'static,
{
    tokio::task::spawn_blocking(job)
        .await
        .map_err(|e| RenderError::TaskPanicked(e.to_string()))?
}

fn open_document<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, RenderError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| RenderError::Open {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })
}

/// Blocking body: open a fresh handle, rasterise one page, post-process,
/// write the PNG.
fn render_page_blocking(
    pdf_path: &Path,
    page_number: usize,
    out_path: &Path,
    dpi: u32,
    settings: Option<&EnhanceSettings>,
) -> Result<(), RenderError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, pdf_path)?;
    let pages = document.pages();
    let total = pages.len() as usize;

    if page_number < 1 || page_number > total {
        return Err(RenderError::PageOutOfRange {
            page: page_number,
            total,
        });
    }

    let page = pages
        .get((page_number - 1) as u16)
        .map_err(|e| RenderError::Rasterisation {
            page: page_number,
            detail: format!("{e:?}"),
        })?;

    // Scale the page's point size (1/72 inch) to the target DPI.
    let width_px = (page.width().value * dpi as f32 / 72.0).round().max(1.0) as i32;
    let height_px = (page.height().value * dpi as f32 / 72.0).round().max(1.0) as i32;
    let render_config = PdfRenderConfig::new()
        .set_target_width(width_px)
        .set_maximum_height(height_px);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| RenderError::Rasterisation {
            page: page_number,
            detail: format!("{e:?}"),
        })?;

    let mut image = DynamicImage::ImageRgb8(flatten_to_white(&bitmap.as_image()));
    if let Some(settings) = settings {
        image = apply_settings(image, settings);
    }

    write_png(&image, out_path, page_number)?;
    debug!(page = page_number, path = %out_path.display(), "page rendered");
    Ok(())
}

/// Composite the rendered RGBA bitmap onto a white background.
fn flatten_to_white(image: &DynamicImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (src, dst) in rgba.pixels().zip(rgb.pixels_mut()) {
        let alpha = src.0[3] as u32;
        for c in 0..3 {
            let value = (src.0[c] as u32 * alpha + 255 * (255 - alpha)) / 255;
            dst.0[c] = value as u8;
        }
    }
    rgb
}

/// Apply the model-requested adjustments.
///
/// Brightness and saturation are percentages (100 = unchanged); contrast is
/// a signed offset (0 = unchanged) fed to the image crate's contrast curve.
fn apply_settings(image: DynamicImage, settings: &EnhanceSettings) -> DynamicImage {
    let mut image = image;

    if let Some(brightness) = settings.brightness {
        if brightness != 100 {
            let factor = brightness.max(0) as f32 / 100.0;
            let mut rgb = image.to_rgb8();
            for pixel in rgb.pixels_mut() {
                for c in pixel.0.iter_mut() {
                    *c = (*c as f32 * factor).round().clamp(0.0, 255.0) as u8;
                }
            }
            image = DynamicImage::ImageRgb8(rgb);
        }
    }

    if let Some(contrast) = settings.contrast {
        if contrast != 0 {
            image = image.adjust_contrast(contrast as f32);
        }
    }

    if let Some(saturation) = settings.saturation {
        if saturation != 100 {
            let factor = saturation.max(0) as f32 / 100.0;
            let mut rgb = image.to_rgb8();
            for pixel in rgb.pixels_mut() {
                let [r, g, b] = pixel.0;
                let luma = 0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32;
                for (c, original) in pixel.0.iter_mut().zip([r, g, b]) {
                    *c = (luma + (original as f32 - luma) * factor)
                        .round()
                        .clamp(0.0, 255.0) as u8;
                }
            }
            image = DynamicImage::ImageRgb8(rgb);
        }
    }

    image
}

/// Encode to PNG and write with owner-only permissions.
fn write_png(image: &DynamicImage, path: &Path, page_number: usize) -> Result<(), RenderError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| RenderError::Encode {
            page: page_number,
            source: e,
        })?;

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    use std::io::Write;
    let io_err = |e| RenderError::ImageWrite {
        path: path.to_path_buf(),
        source: e,
    };
    let mut file = options.open(path).map_err(io_err)?;
    file.write_all(&buf).map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn solid(r: u8, g: u8, b: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(4, 4, Rgb([r, g, b])))
    }

    fn pixel(image: &DynamicImage) -> [u8; 3] {
        image.to_rgb8().get_pixel(0, 0).0
    }

    #[test]
    fn deterministic_page_paths() {
        let dir = Path::new("/scratch/run");
        assert_eq!(
            page_image_path(dir, 3),
            PathBuf::from("/scratch/run/page-3.png")
        );
        assert_eq!(
            enhanced_image_path(dir, 3),
            PathBuf::from("/scratch/run/page-3-enhanced.png")
        );
    }

    #[test]
    fn neutral_settings_change_nothing() {
        let settings = EnhanceSettings {
            brightness: Some(100),
            contrast: Some(0),
            saturation: Some(100),
        };
        let adjusted = apply_settings(solid(120, 80, 40), &settings);
        assert_eq!(pixel(&adjusted), [120, 80, 40]);
    }

    #[test]
    fn brightness_scales_and_clamps() {
        let settings = EnhanceSettings {
            brightness: Some(150),
            contrast: None,
            saturation: None,
        };
        let adjusted = apply_settings(solid(100, 200, 10), &settings);
        assert_eq!(pixel(&adjusted), [150, 255, 15]);
    }

    #[test]
    fn zero_saturation_produces_grayscale() {
        let settings = EnhanceSettings {
            brightness: None,
            contrast: None,
            saturation: Some(0),
        };
        let adjusted = apply_settings(solid(200, 40, 40), &settings);
        let [r, g, b] = pixel(&adjusted);
        assert_eq!(r, g);
        assert_eq!(g, b);
    }

    #[test]
    fn alpha_flattens_onto_white() {
        let mut rgba = image::RgbaImage::new(1, 1);
        rgba.put_pixel(0, 0, image::Rgba([0, 0, 0, 0]));
        let flat = flatten_to_white(&DynamicImage::ImageRgba8(rgba));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255]);
    }

    #[test]
    fn written_png_is_owner_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = page_image_path(dir.path(), 1);
        write_png(&solid(1, 2, 3), &path, 1).unwrap();

        let loaded = image::open(&path).unwrap();
        assert_eq!(pixel(&loaded), [1, 2, 3]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
