//! Image normalization for item reports
//!
//! Pictures are stored inline on the item document as data URIs. The
//! resizing front end (600 px longest edge, quality 0.7) is an external
//! collaborator; the bundled encoder only checks the input and encodes it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use thiserror::Error;

/// Largest input accepted by [`DataUriEncoder`]
pub const MAX_INPUT_BYTES: usize = 1024 * 1024;

const ACCEPTED_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/webp", "image/gif"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageUpload {
    pub bytes: Vec<u8>,
    pub mime: String,
}

impl ImageUpload {
    pub fn new(bytes: Vec<u8>, mime: impl Into<String>) -> Self {
        Self {
            bytes,
            mime: mime.into(),
        }
    }

    /// Guess the type from a file extension
    pub fn mime_for_extension(ext: &str) -> Option<&'static str> {
        match ext.to_ascii_lowercase().as_str() {
            "png" => Some("image/png"),
            "jpg" | "jpeg" => Some("image/jpeg"),
            "webp" => Some("image/webp"),
            "gif" => Some("image/gif"),
            _ => None,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageError {
    #[error("Image is empty")]
    Empty,

    #[error("Image is {size} bytes, the limit is {limit}")]
    TooLarge { size: usize, limit: usize },

    #[error("Unsupported image type: {0}")]
    UnsupportedType(String),
}

/// Turns an uploaded picture into something storable on a document
pub trait ImageNormalizer: Send + Sync {
    fn to_data_uri(&self, upload: &ImageUpload) -> Result<String, ImageError>;
}

pub struct DataUriEncoder {
    max_bytes: usize,
}

impl DataUriEncoder {
    pub fn new() -> Self {
        Self {
            max_bytes: MAX_INPUT_BYTES,
        }
    }

    pub fn with_limit(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl Default for DataUriEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageNormalizer for DataUriEncoder {
    fn to_data_uri(&self, upload: &ImageUpload) -> Result<String, ImageError> {
        if upload.bytes.is_empty() {
            return Err(ImageError::Empty);
        }
        if upload.bytes.len() > self.max_bytes {
            return Err(ImageError::TooLarge {
                size: upload.bytes.len(),
                limit: self.max_bytes,
            });
        }
        let mime = upload.mime.trim().to_ascii_lowercase();
        if !ACCEPTED_TYPES.contains(&mime.as_str()) {
            return Err(ImageError::UnsupportedType(upload.mime.clone()));
        }

        Ok(format!("data:{};base64,{}", mime, STANDARD.encode(&upload.bytes)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_data_uri() {
        let upload = ImageUpload::new(b"abc".to_vec(), "image/PNG");
        let uri = DataUriEncoder::new().to_data_uri(&upload).unwrap();
        assert_eq!(uri, "data:image/png;base64,YWJj");
    }

    #[test]
    fn test_rejects_bad_input() {
        let encoder = DataUriEncoder::with_limit(4);
        assert_eq!(
            encoder.to_data_uri(&ImageUpload::new(Vec::new(), "image/png")),
            Err(ImageError::Empty)
        );
        assert!(matches!(
            encoder.to_data_uri(&ImageUpload::new(vec![0; 5], "image/png")),
            Err(ImageError::TooLarge { size: 5, limit: 4 })
        ));
        assert!(matches!(
            encoder.to_data_uri(&ImageUpload::new(vec![0; 2], "application/pdf")),
            Err(ImageError::UnsupportedType(_))
        ));
    }

    #[test]
    fn test_extension_lookup() {
        assert_eq!(ImageUpload::mime_for_extension("JPG"), Some("image/jpeg"));
        assert_eq!(ImageUpload::mime_for_extension("tiff"), None);
    }
}
