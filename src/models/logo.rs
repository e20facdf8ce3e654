use camino::Utf8Path;
use std::fmt;
use std::fs;
use std::sync::Arc;
use thiserror::Error;

/// Logo payloads above this size need explicit confirmation before use.
pub const MAX_LOGO_BYTES: usize = 3 * 1024 * 1024;

/// Errors raised while taking in a logo file.
#[derive(Error, Debug)]
pub enum LogoError {
    #[error("Please choose a valid image file ({mime_type} is not an image)")]
    NotAnImage { mime_type: String },

    #[error("Failed to read logo file: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of validating a selected logo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoAdmission {
    Accepted,
    /// The file is an image but larger than [`MAX_LOGO_BYTES`].
    NeedsConfirmation { size_bytes: usize },
}

/// Encoded logo image bytes as selected by the user.
///
/// The bytes stay encoded; decoding happens in the render pipeline, where a
/// corrupt payload only skips the overlay.
#[derive(Clone, PartialEq, Eq)]
pub struct LogoAsset {
    bytes: Arc<[u8]>,
    mime_type: String,
    file_name: String,
}

impl LogoAsset {
    pub fn new(bytes: impl Into<Arc<[u8]>>, mime_type: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            file_name: file_name.into(),
        }
    }

    /// Read a logo from disk, taking the MIME type from the extension and
    /// falling back to sniffing the content.
    pub fn from_path(path: &Utf8Path) -> Result<Self, LogoError> {
        let bytes = fs::read(path)?;

        let mime_type = mime_guess::from_path(path)
            .first()
            .map(|mime| mime.essence_str().to_string())
            .or_else(|| {
                image::guess_format(&bytes)
                    .ok()
                    .map(|format| format.to_mime_type().to_string())
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let file_name = path.file_name().unwrap_or(path.as_str()).to_string();

        tracing::debug!(
            "Read logo {} ({} bytes, {})",
            file_name,
            bytes.len(),
            mime_type
        );

        Ok(Self::new(bytes, mime_type, file_name))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Validate this asset with [`admit_logo`].
    pub fn admit(&self) -> Result<LogoAdmission, LogoError> {
        admit_logo(&self.mime_type, self.len())
    }
}

// Bytes are omitted; logo payloads can be megabytes.
impl fmt::Debug for LogoAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogoAsset")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Check a selected file: the MIME type must be `image/*`, and payloads over
/// [`MAX_LOGO_BYTES`] need the user's confirmation.
pub fn admit_logo(mime_type: &str, size_bytes: usize) -> Result<LogoAdmission, LogoError> {
    if !mime_type.starts_with("image/") {
        return Err(LogoError::NotAnImage {
            mime_type: mime_type.to_string(),
        });
    }

    if size_bytes > MAX_LOGO_BYTES {
        Ok(LogoAdmission::NeedsConfirmation { size_bytes })
    } else {
        Ok(LogoAdmission::Accepted)
    }
}
