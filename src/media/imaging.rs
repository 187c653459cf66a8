//! # Imaging Module
//!
//! Local image work on top of the `image` crate: format detection,
//! alpha compositing over a picture or a solid color, and exact resizing.
//! Every producing function returns PNG bytes.

use std::io::Cursor;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageFormat, ImageOutputFormat, Rgba, RgbaImage};
use log::{debug, info};

use crate::errors::ServiceError;

/// Minimum number of bytes needed to recognize a format
const MIN_FORMAT_BYTES: usize = 8;

/// Detect the image format from the leading bytes
pub fn detect_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.len() < MIN_FORMAT_BYTES {
        debug!(
            "Could not read enough bytes to determine image format (got {}, need at least {})",
            bytes.len(),
            MIN_FORMAT_BYTES
        );
        return None;
    }
    image::guess_format(bytes).ok()
}

/// Whether the bytes look like an image we can process
pub fn is_supported_image(bytes: &[u8]) -> bool {
    matches!(
        detect_format(bytes),
        Some(
            ImageFormat::Png
                | ImageFormat::Jpeg
                | ImageFormat::WebP
                | ImageFormat::Bmp
                | ImageFormat::Gif
                | ImageFormat::Tiff
        )
    )
}

/// File suffix matching the detected format, `.img` when unknown
pub fn suffix_for(bytes: &[u8]) -> &'static str {
    match detect_format(bytes) {
        Some(ImageFormat::Png) => ".png",
        Some(ImageFormat::Jpeg) => ".jpg",
        Some(ImageFormat::WebP) => ".webp",
        Some(ImageFormat::Bmp) => ".bmp",
        Some(ImageFormat::Gif) => ".gif",
        Some(ImageFormat::Tiff) => ".tiff",
        _ => ".img",
    }
}

/// Width and height read from the image header, without decoding pixels
pub fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
    if !is_supported_image(bytes) {
        return None;
    }
    image::io::Reader::new(Cursor::new(bytes))
        .with_guessed_format()
        .ok()?
        .into_dimensions()
        .ok()
}

pub fn decode(bytes: &[u8]) -> Result<DynamicImage, ServiceError> {
    if !is_supported_image(bytes) {
        return Err(ServiceError::UnsupportedImage);
    }
    Ok(image::load_from_memory(bytes)?)
}

pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ServiceError> {
    let mut buffer = Vec::new();
    image.write_to(&mut Cursor::new(&mut buffer), ImageOutputFormat::Png)?;
    Ok(buffer)
}

/// Blend `foreground` over `background` stretched to the foreground's size
pub fn overlay_on(background: &DynamicImage, foreground: &RgbaImage) -> RgbaImage {
    let (width, height) = foreground.dimensions();
    let mut canvas = background
        .resize_exact(width, height, FilterType::Lanczos3)
        .to_rgba8();
    imageops::overlay(&mut canvas, foreground, 0, 0);
    canvas
}

/// Blend `foreground` over an opaque canvas of one color
pub fn overlay_on_color(foreground: &RgbaImage, rgb: [u8; 3]) -> RgbaImage {
    let (width, height) = foreground.dimensions();
    let mut canvas = RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]));
    imageops::overlay(&mut canvas, foreground, 0, 0);
    canvas
}

/// Composite a cut-out foreground over a background picture
pub fn composite_png(foreground: &[u8], background: &[u8]) -> Result<Vec<u8>, ServiceError> {
    let foreground = decode(foreground)?.to_rgba8();
    let background = decode(background)?;
    let canvas = overlay_on(&background, &foreground);
    info!(
        "Composited {}x{} foreground over background",
        canvas.width(),
        canvas.height()
    );
    encode_png(&DynamicImage::ImageRgba8(canvas))
}

/// Composite a cut-out foreground over a solid color
pub fn fill_png(foreground: &[u8], rgb: [u8; 3]) -> Result<Vec<u8>, ServiceError> {
    let foreground = decode(foreground)?.to_rgba8();
    let canvas = overlay_on_color(&foreground, rgb);
    encode_png(&DynamicImage::ImageRgba8(canvas))
}

/// Resize to exactly `width` x `height`, ignoring aspect ratio
pub fn resize_png(image: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ServiceError> {
    let source = decode(image)?;
    info!(
        "Resizing {}x{} image to {}x{}",
        source.width(),
        source.height(),
        width,
        height
    );
    let resized = source.resize_exact(width, height, FilterType::Lanczos3);
    encode_png(&resized)
}
