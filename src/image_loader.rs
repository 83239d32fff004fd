//! Image Acquisition Module
//!
//! Accepts an uploaded image, enforces the upload size limit, and decodes it
//! into an in-memory bitmap.

use crate::error::InputError;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;

/// Default upload limit: 10 MB.
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

/// A decoded upload. Immutable once created.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    bytes: Vec<u8>,
    digest: String,
    bitmap: DynamicImage,
    format: ImageFormat,
    width: u32,
    height: u32,
}

impl UploadedImage {
    /// Decodes an upload held in memory.
    ///
    /// The size check happens before any decoding, so an oversized file is
    /// never partially processed.
    pub fn from_bytes(bytes: Vec<u8>, max_bytes: u64) -> Result<Self, InputError> {
        let size = bytes.len() as u64;
        if size > max_bytes {
            return Err(InputError::FileTooLarge {
                size,
                limit: max_bytes,
            });
        }

        let format = match image::guess_format(&bytes) {
            Ok(format @ (ImageFormat::Png | ImageFormat::Jpeg)) => format,
            _ => return Err(InputError::UnsupportedFormat),
        };

        let bitmap = image::load_from_memory_with_format(&bytes, format)?;
        let (width, height) = bitmap.dimensions();
        debug!("Decoded {:?} image of {}x{} ({} bytes)", format, width, height, size);

        Ok(UploadedImage {
            digest: hex::encode(Sha256::digest(&bytes)),
            bytes,
            bitmap,
            format,
            width,
            height,
        })
    }

    /// Reads and decodes an upload from disk.
    pub fn from_path(path: &Path, max_bytes: u64) -> Result<Self, InputError> {
        let size = fs::metadata(path)?.len();
        if size > max_bytes {
            return Err(InputError::FileTooLarge {
                size,
                limit: max_bytes,
            });
        }
        let image = Self::from_bytes(fs::read(path)?, max_bytes)?;
        info!("Loaded {:?} ({}x{})", path, image.width, image.height);
        Ok(image)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex SHA-256 of the uploaded file.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn bitmap(&self) -> &DynamicImage {
        &self.bitmap
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

/// Downscales an image so its longer side is at most `max_side`, keeping the
/// aspect ratio. Images already within bounds are returned as-is.
pub fn prepare_for_ocr(image: DynamicImage, max_side: Option<u32>) -> DynamicImage {
    let Some(max_side) = max_side.filter(|&side| side > 0) else {
        return image;
    };
    let (width, height) = image.dimensions();
    if width.max(height) <= max_side {
        return image;
    }
    debug!("Downscaling {}x{} to fit within {}px", width, height, max_side);
    image.resize(max_side, max_side, FilterType::Triangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([255, 255, 255])));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), format).unwrap();
        buf
    }

    #[test]
    fn decodes_png_and_records_dimensions() {
        let image = UploadedImage::from_bytes(encode(40, 30, ImageFormat::Png), DEFAULT_MAX_UPLOAD_BYTES).unwrap();
        assert_eq!((image.width(), image.height()), (40, 30));
        assert_eq!(image.format(), ImageFormat::Png);
        assert_eq!(image.digest().len(), 64);
    }

    #[test]
    fn decodes_jpeg() {
        let image = UploadedImage::from_bytes(encode(16, 8, ImageFormat::Jpeg), DEFAULT_MAX_UPLOAD_BYTES).unwrap();
        assert_eq!(image.format(), ImageFormat::Jpeg);
        assert_eq!(image.width(), 16);
    }

    #[test]
    fn rejects_oversized_upload_before_decoding() {
        // Not a valid image at all: the size check must come first.
        let err = UploadedImage::from_bytes(vec![0u8; 2048], 1024).unwrap_err();
        assert!(matches!(err, InputError::FileTooLarge { size: 2048, limit: 1024 }));
    }

    #[test]
    fn rejects_other_formats() {
        let err = UploadedImage::from_bytes(b"GIF89a\x01\x00\x01\x00".to_vec(), DEFAULT_MAX_UPLOAD_BYTES).unwrap_err();
        assert!(matches!(err, InputError::UnsupportedFormat));
    }

    #[test]
    fn rejects_oversized_file_on_disk() {
        let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
        std::io::Write::write_all(&mut file, &encode(64, 64, ImageFormat::Png)).unwrap();
        let err = UploadedImage::from_path(file.path(), 10).unwrap_err();
        assert!(matches!(err, InputError::FileTooLarge { limit: 10, .. }));
    }

    #[test]
    fn downscale_keeps_aspect_ratio() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(2000, 1000));
        let small = prepare_for_ocr(img, Some(1000));
        assert_eq!(small.dimensions(), (1000, 500));
    }

    #[test]
    fn downscale_leaves_small_images_alone() {
        let img = DynamicImage::ImageRgb8(RgbImage::new(300, 200));
        assert_eq!(prepare_for_ocr(img.clone(), Some(1000)).dimensions(), (300, 200));
        assert_eq!(prepare_for_ocr(img, None).dimensions(), (300, 200));
    }
}
