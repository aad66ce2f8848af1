//! Image encoding: file bytes → base64 wrapped as a data URI.
//!
//! Multimodal chat APIs accept images as base64 data URIs embedded in the
//! JSON request body. The bytes are forwarded untouched: no decoding,
//! resizing or format check happens here, so any file is accepted.

use crate::error::ChainError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use std::path::Path;
use tracing::debug;

/// One base64-encoded image ready for a model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    /// Standard-alphabet base64 of the raw file bytes.
    pub base64: String,
    /// Subtype placed after `image/` in the data URI, e.g. `png` or `jpeg`.
    pub format: String,
}

impl EncodedImage {
    pub fn mime_type(&self) -> String {
        format!("image/{}", self.format)
    }

    /// `data:image/<format>;base64,<payload>`
    pub fn data_uri(&self) -> String {
        format!("data:image/{};base64,{}", self.format, self.base64)
    }

    /// Adapt to the provider crate's image attachment type.
    pub fn to_image_data(&self) -> ImageData {
        ImageData::new(self.base64.clone(), self.mime_type()).with_detail("high")
    }
}

/// Read `path` and encode it. Fails only if the file cannot be read.
pub async fn encode_image_file(path: impl AsRef<Path>) -> Result<EncodedImage, ChainError> {
    let path = path.as_ref();
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| ChainError::ImageRead {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(encode_image_bytes(&bytes, format_for_path(path)))
}

/// Encode bytes already in memory (e.g. an HTTP upload).
pub fn encode_image_bytes(bytes: &[u8], format: &str) -> EncodedImage {
    let base64 = STANDARD.encode(bytes);
    debug!("Encoded image: {} bytes → {} bytes base64", bytes.len(), base64.len());
    EncodedImage {
        base64,
        format: format.to_string(),
    }
}

/// Pick the data-URI subtype from a file extension, defaulting to `png`.
pub fn format_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "jpeg",
        Some("gif") => "gif",
        Some("webp") => "webp",
        Some("bmp") => "bmp",
        Some("tif") | Some("tiff") => "tiff",
        _ => "png",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn data_uri_wraps_payload() {
        let img = encode_image_bytes(b"hello", "png");
        assert_eq!(img.base64, "aGVsbG8=");
        assert_eq!(img.data_uri(), "data:image/png;base64,aGVsbG8=");
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(format_for_path(Path::new("a1.JPG")), "jpeg");
        assert_eq!(format_for_path(Path::new("scan.webp")), "webp");
        assert_eq!(format_for_path(Path::new("p_1.png")), "png");
        assert_eq!(format_for_path(Path::new("no_extension")), "png");
    }

    #[test]
    fn image_data_carries_mime() {
        let data = encode_image_bytes(&[0xff, 0xd8], "jpeg").to_image_data();
        assert_eq!(data.mime_type, "image/jpeg");
        assert_eq!(STANDARD.decode(&data.data).unwrap(), vec![0xff, 0xd8]);
    }

    #[tokio::test]
    async fn any_file_is_accepted() {
        let mut tmp = tempfile::Builder::new().suffix(".jpg").tempfile().unwrap();
        tmp.write_all(b"not really an image").unwrap();
        let img = encode_image_file(tmp.path()).await.unwrap();
        assert_eq!(img.format, "jpeg");
        assert_eq!(STANDARD.decode(&img.base64).unwrap(), b"not really an image");
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = tokio_test::block_on(encode_image_file("/definitely/not/here.png")).unwrap_err();
        assert!(matches!(err, ChainError::ImageRead { .. }));
    }
}
