//! Upload normalisation
//!
//! Every image is decoded, shrunk so neither side exceeds [`MAX_DIMENSION`]
//! and re-encoded as an RGB JPEG before it reaches the predictor, so all
//! callers feed the model the same byte form.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;

use crate::utils::error::{KanjiError, Result};

/// Canonical upper bound for either side of an image
pub const MAX_DIMENSION: u32 = 224;

/// Quality used when re-encoding uploads
pub const JPEG_QUALITY: u8 = 90;

/// Decode raw bytes, treating every failure as a client-side decode error
pub fn decode(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(KanjiError::Decode("empty payload".to_string()));
    }
    image::load_from_memory(bytes).map_err(|e| KanjiError::Decode(e.to_string()))
}

/// Shrink `img` so both sides are at most `max`, keeping the aspect ratio.
///
/// Images already within bounds are returned unchanged.
pub fn resize_max(img: &DynamicImage, max: u32) -> DynamicImage {
    if img.width() <= max && img.height() <= max {
        return img.clone();
    }
    img.resize(max, max, FilterType::Triangle)
}

/// Encode as an 8-bit RGB JPEG
pub fn encode_jpeg(img: &DynamicImage) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|e| KanjiError::Prediction(format!("Failed to re-encode image: {e}")))?;
    Ok(buf.into_inner())
}

/// Decode, resize to the canonical bound and re-encode an uploaded image
pub fn normalize_upload(bytes: &[u8]) -> Result<Vec<u8>> {
    let img = decode(bytes)?;
    encode_jpeg(&resize_max(&img, MAX_DIMENSION))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_resize_max_preserves_aspect_ratio() {
        let img = DynamicImage::new_rgb8(1000, 500);
        let resized = resize_max(&img, MAX_DIMENSION);
        assert_eq!(resized.width(), 224);
        assert_eq!(resized.height(), 112);
    }

    #[test]
    fn test_resize_max_never_upscales() {
        let img = DynamicImage::new_rgb8(50, 30);
        let resized = resize_max(&img, MAX_DIMENSION);
        assert_eq!((resized.width(), resized.height()), (50, 30));
    }

    #[test]
    fn test_resize_max_tall_image() {
        let img = DynamicImage::new_rgb8(300, 900);
        let resized = resize_max(&img, MAX_DIMENSION);
        assert!(resized.width() <= 224 && resized.height() <= 224);
        assert_eq!(resized.height(), 224);
        assert!((resized.width() as i64 - 75).abs() <= 1);
    }

    #[test]
    fn test_normalize_upload_round_trip() {
        let bytes = normalize_upload(&png(640, 480)).unwrap();

        assert_eq!(
            image::guess_format(&bytes).unwrap(),
            image::ImageFormat::Jpeg
        );
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (224, 168));
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_normalize_upload_accepts_grayscale_with_alpha() {
        let img = DynamicImage::ImageLumaA8(image::GrayAlphaImage::from_pixel(
            10,
            10,
            image::LumaA([30, 200]),
        ));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, image::ImageFormat::Png).unwrap();

        assert!(normalize_upload(buf.get_ref()).is_ok());
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = normalize_upload(&[0x13, 0x37, 0x00, 0xff, 0x42]).unwrap_err();
        assert!(err.is_client_error());

        let err = normalize_upload(&[]).unwrap_err();
        assert!(matches!(err, KanjiError::Decode(_)));
    }
}
