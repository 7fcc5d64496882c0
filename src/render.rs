//! Subtitle compositing: text layout, outline rendering and re-encoding of
//! a single frame image.

use crate::project::Subtitle;
use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use parking_lot::Mutex;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Original setting, keeps the re-encode close to lossless.
const JPEG_QUALITY: u8 = 98;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("could not load subtitle font: {0}")]
    FontRead(#[source] std::io::Error),

    #[error("could not parse subtitle font: {0}")]
    FontParse(ab_glyph::InvalidFont),

    #[error("frame image i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not decode or encode frame image: {0}")]
    Image(#[from] image::ImageError),
}

/// Composites the subtitles active at one frame's timestamp onto that frame.
#[cfg_attr(test, mockall::automock)]
pub trait FrameRenderer: Send + Sync {
    fn render_frame(
        &self,
        frame: &Path,
        font_size: f32,
        subtitles: &[Subtitle],
    ) -> Result<(), RenderError>;
}

/// [`FrameRenderer`] drawing with a TTF font loaded from disk.
///
/// The font file is read once, on the first frame that actually has an
/// active subtitle.
pub struct SubtitleRenderer {
    font_file: PathBuf,
    font: Mutex<Option<Arc<FontVec>>>,
}

impl SubtitleRenderer {
    pub fn new(font_file: PathBuf) -> Self {
        Self {
            font_file,
            font: Mutex::new(None),
        }
    }

    fn font(&self) -> Result<Arc<FontVec>, RenderError> {
        let mut slot = self.font.lock();
        if let Some(font) = slot.as_ref() {
            return Ok(Arc::clone(font));
        }

        let data = std::fs::read(&self.font_file).map_err(RenderError::FontRead)?;
        let font = Arc::new(FontVec::try_from_vec(data).map_err(RenderError::FontParse)?);
        *slot = Some(Arc::clone(&font));
        Ok(font)
    }
}

impl FrameRenderer for SubtitleRenderer {
    fn render_frame(
        &self,
        frame: &Path,
        font_size: f32,
        subtitles: &[Subtitle],
    ) -> Result<(), RenderError> {
        let font = self.font()?;
        burn_subtitles(frame, font.as_ref(), font_size, subtitles)
    }
}

/// Draw `subtitles` over the image at `frame` and overwrite the file in its
/// original format.
pub fn burn_subtitles(
    frame: &Path,
    font: &FontVec,
    font_size: f32,
    subtitles: &[Subtitle],
) -> Result<(), RenderError> {
    let background = image::open(frame)?.to_rgba8();
    let (width, height) = background.dimensions();

    // Transparent layer holding only the glyphs.
    let mut text_layer = RgbaImage::new(width, height);
    let scale = PxScale::from(font_size);
    for subtitle in subtitles {
        draw_subtitle(&mut text_layer, font, scale, font_size, subtitle);
    }

    let outline = outline_layer(&text_layer, font_size);

    // Composite background, then outline, then text.
    let mut target = background;
    image::imageops::overlay(&mut target, &outline, 0, 0);
    image::imageops::overlay(&mut target, &text_layer, 0, 0);

    write_frame(frame, &target)
}

fn draw_subtitle(
    layer: &mut RgbaImage,
    font: &FontVec,
    scale: PxScale,
    font_size: f32,
    subtitle: &Subtitle,
) {
    let (width, height) = layer.dimensions();
    let margin_x = (width / 20) as f32;
    let margin_y = (height / 10) as f32;

    let color = resolve_color(&subtitle.color);
    let lines: Vec<&str> = subtitle.text.split('\n').collect();
    let first = first_baseline(
        &subtitle.position.y,
        height as f32,
        font_size,
        lines.len(),
        margin_y,
    );
    let ascent = font.as_scaled(scale).ascent();

    for (idx, line) in lines.iter().enumerate() {
        // Blank lines draw nothing but still occupy their vertical slot.
        if line.trim().is_empty() {
            continue;
        }

        let line_width = measure_line(font, scale, line);
        let x = line_start(&subtitle.position.x, width as f32, line_width, margin_x);
        let baseline = first + font_size * idx as f32;

        imageproc::drawing::draw_text_mut(
            layer,
            color,
            x.round() as i32,
            (baseline - ascent).round() as i32,
            scale,
            font,
            line,
        );
    }
}

/// Baseline of the first text line for a vertical anchor.
fn first_baseline(
    anchor: &str,
    frame_height: f32,
    font_size: f32,
    line_count: usize,
    margin_y: f32,
) -> f32 {
    match anchor {
        "top" => margin_y + font_size,
        "bottom" => frame_height - margin_y - font_size * (line_count - 1) as f32,
        // "center" and anything unknown.
        _ => (frame_height - font_size * line_count as f32) / 2.0 + font_size,
    }
}

/// Left edge of one text line for a horizontal anchor.
fn line_start(anchor: &str, frame_width: f32, line_width: f32, margin_x: f32) -> f32 {
    match anchor {
        "left" => margin_x,
        "right" => frame_width - margin_x - line_width,
        _ => (frame_width - line_width) / 2.0,
    }
}

/// Advance width of `text` at `scale`, including kerning.
fn measure_line(font: &FontVec, scale: PxScale, text: &str) -> f32 {
    let scaled = font.as_scaled(scale);
    let mut width = 0.0;
    let mut previous = None;

    for c in text.chars() {
        let glyph = scaled.glyph_id(c);
        if let Some(previous) = previous {
            width += scaled.kern(previous, glyph);
        }
        width += scaled.h_advance(glyph);
        previous = Some(glyph);
    }

    width
}

fn parse_hex_color(hex: &str) -> Option<Rgba<u8>> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }

    let r = u8::from_str_radix(&digits[0..2], 16).ok()?;
    let g = u8::from_str_radix(&digits[2..4], 16).ok()?;
    let b = u8::from_str_radix(&digits[4..6], 16).ok()?;
    Some(Rgba([r, g, b, 255]))
}

fn resolve_color(hex: &str) -> Rgba<u8> {
    parse_hex_color(hex).unwrap_or(Rgba([255, 255, 255, 255]))
}

/// Soft dark halo behind the glyphs: blur the text layer and force every
/// pixel with remaining alpha to opaque black.
fn outline_layer(text_layer: &RgbaImage, font_size: f32) -> RgbaImage {
    let mut blurred = image::imageops::blur(text_layer, 0.025 * font_size);
    for pixel in blurred.pixels_mut() {
        *pixel = if pixel[3] > 0 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([0, 0, 0, 0])
        };
    }
    blurred
}

/// Truncate-and-rewrite the frame file in its original codec.
fn write_frame(path: &Path, frame: &RgbaImage) -> Result<(), RenderError> {
    let format = ImageFormat::from_path(path)?;
    let mut writer = BufWriter::new(File::create(path)?);

    match format {
        ImageFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(frame.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY).encode_image(&rgb)?;
        }
        other => DynamicImage::ImageRgba8(frame.clone()).write_to(&mut writer, other)?,
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Frame geometry from a 1000x500 frame: marginX = 50, marginY = 50,
    // font size = 500 / 16 = 31.25.
    const FONT_SIZE: f32 = 31.25;

    #[test]
    fn bottom_anchor_pins_last_line_to_bottom_margin() {
        let first = first_baseline("bottom", 500.0, FONT_SIZE, 2, 50.0);
        assert_eq!(first, 418.75);
        // The second line sits one font size below the first.
        assert_eq!(first + FONT_SIZE, 450.0);
    }

    #[test]
    fn top_anchor_starts_below_top_margin() {
        assert_eq!(first_baseline("top", 500.0, FONT_SIZE, 1, 50.0), 81.25);
        assert_eq!(first_baseline("top", 500.0, FONT_SIZE, 3, 50.0), 81.25);
    }

    #[test]
    fn vertical_center_is_the_default() {
        let centered = first_baseline("center", 500.0, FONT_SIZE, 2, 50.0);
        assert_eq!(centered, (500.0 - FONT_SIZE * 2.0) / 2.0 + FONT_SIZE);
        assert_eq!(first_baseline("", 500.0, FONT_SIZE, 2, 50.0), centered);
        assert_eq!(first_baseline("bogus", 500.0, FONT_SIZE, 2, 50.0), centered);
    }

    #[test]
    fn horizontal_anchors() {
        assert_eq!(line_start("left", 1000.0, 200.0, 50.0), 50.0);
        assert_eq!(line_start("right", 1000.0, 200.0, 50.0), 750.0);
        assert_eq!(line_start("center", 1000.0, 200.0, 50.0), 400.0);
        assert_eq!(line_start("", 1000.0, 200.0, 50.0), 400.0);
    }

    #[test]
    fn hex_colors_parse_with_white_fallback() {
        assert_eq!(parse_hex_color("#ffcc00"), Some(Rgba([255, 204, 0, 255])));
        assert_eq!(parse_hex_color("#000000"), Some(Rgba([0, 0, 0, 255])));
        assert_eq!(parse_hex_color("ffcc00"), None);
        assert_eq!(parse_hex_color("#ffcc0"), None);
        assert_eq!(parse_hex_color("#zzzzzz"), None);

        assert_eq!(resolve_color("not-a-color"), Rgba([255, 255, 255, 255]));
        assert_eq!(resolve_color(""), Rgba([255, 255, 255, 255]));
        assert_eq!(resolve_color("#102030"), Rgba([16, 32, 48, 255]));
    }

    #[test]
    fn outline_is_opaque_black_where_text_bleeds() {
        let mut text_layer = RgbaImage::new(16, 16);
        text_layer.put_pixel(8, 8, Rgba([255, 255, 255, 255]));

        let outline = outline_layer(&text_layer, 31.25);

        let center = outline.get_pixel(8, 8);
        assert_eq!(*center, Rgba([0, 0, 0, 255]));
        // The blur spreads alpha into neighbors, all thresholded to black.
        assert_eq!(*outline.get_pixel(8, 9), Rgba([0, 0, 0, 255]));
        // Far corners stay fully transparent.
        assert_eq!(*outline.get_pixel(0, 0), Rgba([0, 0, 0, 0]));
    }

    #[test]
    fn write_frame_overwrites_in_original_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame-000001.jpg");

        // Seed with a larger image so truncation is observable.
        image::RgbImage::from_pixel(64, 64, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let frame = RgbaImage::from_pixel(8, 8, Rgba([200, 100, 50, 255]));
        write_frame(&path, &frame).unwrap();

        let reloaded = image::open(&path).unwrap();
        assert_eq!(image::image_dimensions(&path).unwrap(), (8, 8));
        assert_eq!(ImageFormat::from_path(&path).unwrap(), ImageFormat::Jpeg);
        // JPEG is lossy; just check the dominant channel survived.
        let pixel = reloaded.to_rgb8().get_pixel(4, 4).0;
        assert!(pixel[0] > 150, "unexpected pixel {pixel:?}");
    }
}
