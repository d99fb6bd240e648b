//! Photo decoding and normalization into the classifier input tensor.
//!
//! The classifier was trained on 224x224 RGB inputs scaled to [0, 1] in NHWC
//! layout, so every photo is stretched (not letterboxed) to that size.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use ndarray::Array4;
use thiserror::Error;

pub const INPUT_SIZE: usize = 224;
pub const INPUT_CHANNELS: usize = 3;
/// Expected tensor shape: (batch, height, width, channels).
pub const INPUT_SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, INPUT_CHANNELS];

const PIXEL_SCALE: f32 = 255.0;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("empty image payload")]
    Empty,
    #[error("image decode failed: {0}")]
    Decode(#[from] image::ImageError),
}

/// Container format of an incoming photo, from content sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Other(ImageFormat),
}

impl ImageKind {
    /// File extension used when storing the photo.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "jpg",
            ImageKind::Png => "png",
            ImageKind::Other(f) => f.extensions_str().first().copied().unwrap_or("bin"),
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageKind::Jpeg => "image/jpeg",
            ImageKind::Png => "image/png",
            ImageKind::Other(f) => f.to_mime_type(),
        }
    }

    /// Formats accepted by the file-upload input.
    pub fn is_upload_allowed(&self) -> bool {
        matches!(self, ImageKind::Jpeg | ImageKind::Png)
    }
}

/// Identify the image container from its magic bytes.
pub fn sniff_kind(bytes: &[u8]) -> Option<ImageKind> {
    match image::guess_format(bytes).ok()? {
        ImageFormat::Jpeg => Some(ImageKind::Jpeg),
        ImageFormat::Png => Some(ImageKind::Png),
        other => Some(ImageKind::Other(other)),
    }
}

/// Decode an encoded photo (any format the `image` crate understands).
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    if bytes.is_empty() {
        return Err(PreprocessError::Empty);
    }
    Ok(image::load_from_memory(bytes)?)
}

/// Resize to 224x224, drop any alpha channel, scale to [0, 1], and add the
/// batch dimension.
pub fn preprocess(image: &DynamicImage) -> Array4<f32> {
    let size = INPUT_SIZE as u32;
    let resized = image.resize_exact(size, size, FilterType::CatmullRom);
    // to_rgb8 discards alpha without compositing and replicates luma for
    // grayscale sources, so the channel count is always 3.
    let rgb = resized.to_rgb8();

    let mut tensor = Array4::<f32>::zeros(INPUT_SHAPE);
    for (x, y, pixel) in rgb.enumerate_pixels() {
        for c in 0..INPUT_CHANNELS {
            tensor[[0, y as usize, x as usize, c]] = pixel[c] as f32 / PIXEL_SCALE;
        }
    }

    tensor
}

/// Decode and preprocess in one step.
pub fn preprocess_bytes(bytes: &[u8]) -> Result<Array4<f32>, PreprocessError> {
    let image = decode(bytes)?;
    tracing::debug!(
        width = image.width(),
        height = image.height(),
        color = ?image.color(),
        "decoded photo"
    );
    Ok(preprocess(&image))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
    use std::io::Cursor;

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, format).unwrap();
        buf.into_inner()
    }

    fn assert_unit_range(tensor: &Array4<f32>) {
        assert!(tensor.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_rgba_300_output_shape_and_range() {
        let img = RgbaImage::from_fn(300, 300, |x, y| {
            Rgba([(x % 256) as u8, (y % 256) as u8, 200, (x as u8).wrapping_mul(3)])
        });
        let tensor = preprocess(&DynamicImage::ImageRgba8(img));
        assert_eq!(tensor.shape(), &INPUT_SHAPE);
        assert_unit_range(&tensor);
    }

    #[test]
    fn test_non_square_and_tiny_inputs() {
        for (w, h) in [(1, 1), (640, 120), (33, 900)] {
            let img = RgbImage::from_pixel(w, h, Rgb([10, 20, 30]));
            let tensor = preprocess(&DynamicImage::ImageRgb8(img));
            assert_eq!(tensor.shape(), &INPUT_SHAPE, "input {w}x{h}");
            assert_unit_range(&tensor);
        }
    }

    #[test]
    fn test_grayscale_expands_to_three_channels() {
        let img = GrayImage::from_pixel(50, 50, Luma([128]));
        let tensor = preprocess(&DynamicImage::ImageLuma8(img));
        assert_eq!(tensor.shape(), &INPUT_SHAPE);
        let expected = 128.0 / 255.0;
        for c in 0..INPUT_CHANNELS {
            assert!((tensor[[0, 100, 100, c]] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_alpha_is_dropped_not_composited() {
        // Fully transparent red must still read as red.
        let img = RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 0]));
        let tensor = preprocess(&DynamicImage::ImageRgba8(img));
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 0, 0, 1]].abs() < 1e-6);
        assert!(tensor[[0, 0, 0, 2]].abs() < 1e-6);
    }

    #[test]
    fn test_sixteen_bit_input_stays_in_range() {
        let img = image::ImageBuffer::<Rgb<u16>, Vec<u16>>::from_pixel(40, 40, Rgb([65535, 0, 32768]));
        let tensor = preprocess(&DynamicImage::ImageRgb16(img));
        assert_unit_range(&tensor);
        assert!((tensor[[0, 5, 5, 0]] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_preprocess_bytes_png_roundtrip_shape() {
        let img = RgbaImage::from_pixel(300, 300, Rgba([0, 128, 255, 128]));
        let bytes = encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);
        let tensor = preprocess_bytes(&bytes).unwrap();
        assert_eq!(tensor.shape(), &INPUT_SHAPE);
        assert_unit_range(&tensor);
    }

    #[test]
    fn test_decode_rejects_garbage_and_empty() {
        assert!(matches!(decode(&[]), Err(PreprocessError::Empty)));
        assert!(matches!(
            decode(b"definitely not an image"),
            Err(PreprocessError::Decode(_))
        ));
    }

    #[test]
    fn test_sniff_kind() {
        let png = encode(DynamicImage::ImageRgb8(RgbImage::new(4, 4)), ImageFormat::Png);
        let jpg = encode(DynamicImage::ImageRgb8(RgbImage::new(4, 4)), ImageFormat::Jpeg);
        let bmp = encode(DynamicImage::ImageRgb8(RgbImage::new(4, 4)), ImageFormat::Bmp);

        assert_eq!(sniff_kind(&png), Some(ImageKind::Png));
        assert_eq!(sniff_kind(&jpg), Some(ImageKind::Jpeg));
        let other = sniff_kind(&bmp).unwrap();
        assert!(!other.is_upload_allowed());
        assert_eq!(other.extension(), "bmp");
        assert_eq!(sniff_kind(b"hello"), None);
        assert_eq!(ImageKind::Jpeg.content_type(), "image/jpeg");
    }
}
