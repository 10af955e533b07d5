//! Image attachments: validation, loading, and the data-URI form stored on
//! the user's message.

use std::path::Path;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use thiserror::Error;

pub const MAX_FILE_SIZE: u64 = 5_242_880; // 5MB
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp"];

#[derive(Debug, Error)]
pub enum AttachmentError {
    #[error("file not found: {0}")]
    NotFound(String),
    #[error("file is too large ({size} bytes, max {max})")]
    TooLarge { size: u64, max: u64 },
    #[error("unsupported file type: .{0}")]
    UnsupportedExtension(String),
    #[error("file has no extension")]
    NoExtension,
    #[error("not an image data URI")]
    InvalidDataUri,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// An image read into memory, ready to be sent inline
#[derive(Clone, PartialEq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for ImageAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageAttachment")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// MIME type for a supported image extension
pub fn mime_type_for_extension(ext: &str) -> Option<&'static str> {
    match ext.to_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "bmp" => Some("image/bmp"),
        _ => None,
    }
}

/// Check if a file is an image based on extension
pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

impl ImageAttachment {
    /// Validate and read an image file
    pub async fn from_path(path: &Path) -> Result<Self, AttachmentError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| AttachmentError::NotFound(path.display().to_string()))?;

        let size = metadata.len();
        if size > MAX_FILE_SIZE {
            return Err(AttachmentError::TooLarge {
                size,
                max: MAX_FILE_SIZE,
            });
        }

        let ext = path
            .extension()
            .ok_or(AttachmentError::NoExtension)?
            .to_string_lossy()
            .to_lowercase();

        if !is_image_extension(&ext) {
            return Err(AttachmentError::UnsupportedExtension(ext));
        }
        let mime_type = mime_type_for_extension(&ext)
            .ok_or_else(|| AttachmentError::UnsupportedExtension(ext.clone()))?;

        let data = tokio::fs::read(path).await?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }

    /// `data:<mime>;base64,<payload>` for display and persistence
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, STANDARD.encode(&self.data))
    }

    /// Parse a base64 image data URI
    pub fn from_data_uri(uri: &str) -> Result<Self, AttachmentError> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or(AttachmentError::InvalidDataUri)?;
        let (mime_type, payload) = rest
            .split_once(";base64,")
            .ok_or(AttachmentError::InvalidDataUri)?;

        if !mime_type.starts_with("image/") {
            return Err(AttachmentError::InvalidDataUri);
        }

        let data = STANDARD
            .decode(payload)
            .map_err(|_| AttachmentError::InvalidDataUri)?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            data,
        })
    }
}
