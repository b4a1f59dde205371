//! Wallpaper compositor
//!
//! Renders one decoded photograph onto a canvas of the requested size:
//! 1. Cover fit: scale so the canvas is fully covered, centered, overflow cropped
//! 2. Accent rectangle: solid `#5BC2E7`, 5–15% of each canvas axis, centered
//! 3. Encode: JPEG (quality 80) for previews, PNG (best compression) for exports
//! 4. Validate the encoded bytes before handing them out

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilterType, PngEncoder};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rand::Rng;
use thiserror::Error;

/// Accent rectangle fill
pub const ACCENT_COLOR: Rgb<u8> = Rgb([0x5B, 0xC2, 0xE7]);

/// Rectangle side as a fraction of the canvas: `MIN + u × SPAN`
const ACCENT_MIN_FRACTION: f64 = 0.05;
const ACCENT_SPAN_FRACTION: f64 = 0.10;

pub const PREVIEW_JPEG_QUALITY: u8 = 80;

/// Anything shorter cannot be a real encoded canvas
const MIN_ENCODED_LEN: usize = 64;

const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Compositor errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("Render surface unavailable: {0}")]
    SurfaceUnavailable(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Invalid encoded output: {0}")]
    InvalidOutput(String),
}

/// Scale and placement of the source image on the canvas
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverFit {
    pub scale: f64,
    pub scaled_width: f64,
    pub scaled_height: f64,
    /// Negative on the overflowing axis
    pub offset_x: f64,
    pub offset_y: f64,
}

impl CoverFit {
    pub fn compute(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
        let (sw, sh) = (f64::from(src_width), f64::from(src_height));
        let (dw, dh) = (f64::from(dst_width), f64::from(dst_height));

        let scale = (dw / sw).max(dh / sh);
        let scaled_width = sw * scale;
        let scaled_height = sh * scale;

        Self {
            scale,
            scaled_width,
            scaled_height,
            offset_x: (dw - scaled_width) / 2.0,
            offset_y: (dh - scaled_height) / 2.0,
        }
    }
}

/// Part of the source that remains visible after a cover fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl SourceRegion {
    /// Canvas size divided by the cover scale, centered in the source
    pub fn visible(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32) -> Self {
        let fit = CoverFit::compute(src_width, src_height, dst_width, dst_height);
        let extent = |dst: u32, src: u32| ((f64::from(dst) / fit.scale).round() as u32).clamp(1, src);

        let width = extent(dst_width, src_width);
        let height = extent(dst_height, src_height);
        Self {
            x: (src_width - width) / 2,
            y: (src_height - height) / 2,
            width,
            height,
        }
    }
}

/// The two uniform draws behind an accent rectangle, each in `[0, 1)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccentFractions {
    pub width: f64,
    pub height: f64,
}

impl AccentFractions {
    /// Values outside `[0, 1)` are clamped
    pub fn new(width: f64, height: f64) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0 - f64::EPSILON) } else { 0.0 };
        Self {
            width: clamp(width),
            height: clamp(height),
        }
    }

    pub fn sample<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            width: rng.gen::<f64>(),
            height: rng.gen::<f64>(),
        }
    }
}

/// Accent rectangle in canvas pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccentRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl AccentRect {
    /// Size from the draws, centered on the canvas
    pub fn from_fractions(canvas_width: u32, canvas_height: u32, fractions: AccentFractions) -> Self {
        let side = |extent: u32, u: f64| {
            (f64::from(extent) * (ACCENT_MIN_FRACTION + u * ACCENT_SPAN_FRACTION)).floor() as u32
        };
        let width = side(canvas_width, fractions.width).min(canvas_width);
        let height = side(canvas_height, fractions.height).min(canvas_height);

        Self {
            x: (canvas_width - width) / 2,
            y: (canvas_height - height) / 2,
            width,
            height,
        }
    }

    /// Fresh independent draws for this canvas only
    pub fn sample<R: Rng + ?Sized>(canvas_width: u32, canvas_height: u32, rng: &mut R) -> Self {
        Self::from_fractions(canvas_width, canvas_height, AccentFractions::sample(rng))
    }
}

/// Output encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Jpeg { quality: u8 },
    Png,
}

impl Encoding {
    /// Lossy preview encoding
    pub const fn preview() -> Self {
        Encoding::Jpeg {
            quality: PREVIEW_JPEG_QUALITY,
        }
    }

    /// Lossless export encoding
    pub const fn full_resolution() -> Self {
        Encoding::Png
    }

    pub fn extension(self) -> &'static str {
        match self {
            Encoding::Jpeg { .. } => "jpg",
            Encoding::Png => "png",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Encoding::Jpeg { .. } => "image/jpeg",
            Encoding::Png => "image/png",
        }
    }

    fn signature(self) -> &'static [u8] {
        match self {
            Encoding::Jpeg { .. } => JPEG_SIGNATURE,
            Encoding::Png => PNG_SIGNATURE,
        }
    }
}

/// Draw the cover-fitted image and the accent rectangle onto a new canvas
pub fn compose(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    rect: &AccentRect,
) -> Result<RgbImage, RenderError> {
    if target_width == 0 || target_height == 0 {
        return Err(RenderError::SurfaceUnavailable(format!(
            "canvas {}x{}",
            target_width, target_height
        )));
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(RenderError::SurfaceUnavailable("source image has no pixels".to_string()));
    }

    // Only the visible part of the source is resized, so memory stays bounded by the canvas
    let region = SourceRegion::visible(image.width(), image.height(), target_width, target_height);
    let visible = image.crop_imm(region.x, region.y, region.width, region.height).to_rgb8();
    let mut canvas = imageops::resize(&visible, target_width, target_height, FilterType::Triangle);

    let x_end = rect.x.saturating_add(rect.width).min(target_width);
    let y_end = rect.y.saturating_add(rect.height).min(target_height);
    for y in rect.y..y_end {
        for x in rect.x..x_end {
            canvas.put_pixel(x, y, ACCENT_COLOR);
        }
    }

    Ok(canvas)
}

/// Encode a canvas, then validate the result
pub fn encode(canvas: &RgbImage, encoding: Encoding) -> Result<Vec<u8>, RenderError> {
    let mut bytes = Vec::new();
    let written = match encoding {
        Encoding::Jpeg { quality } => {
            canvas.write_with_encoder(JpegEncoder::new_with_quality(&mut bytes, quality))
        }
        Encoding::Png => canvas.write_with_encoder(PngEncoder::new_with_quality(
            &mut bytes,
            CompressionType::Best,
            PngFilterType::Adaptive,
        )),
    };
    written.map_err(|e| RenderError::Encode(e.to_string()))?;

    validate_encoded(&bytes, encoding)?;
    Ok(bytes)
}

/// Reject empty, blank (no format signature) or implausibly short output
pub fn validate_encoded(bytes: &[u8], encoding: Encoding) -> Result<(), RenderError> {
    if bytes.is_empty() {
        return Err(RenderError::InvalidOutput("empty output".to_string()));
    }
    if !bytes.starts_with(encoding.signature()) {
        return Err(RenderError::InvalidOutput(format!(
            "missing {} signature",
            encoding.extension()
        )));
    }
    if bytes.len() < MIN_ENCODED_LEN {
        return Err(RenderError::InvalidOutput(format!(
            "only {} bytes",
            bytes.len()
        )));
    }
    Ok(())
}

/// Compose and encode in one step
pub fn render(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
    rect: &AccentRect,
    encoding: Encoding,
) -> Result<Vec<u8>, RenderError> {
    let canvas = compose(image, target_width, target_height, rect)?;
    encode(&canvas, encoding)
}
