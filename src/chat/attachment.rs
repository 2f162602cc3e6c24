//! Document attachments for deep-dive analysis.

use std::path::Path;

use crate::error::{AttachmentError, AttachmentResult};

/// Largest document accepted for inline upload (20 MiB).
pub const MAX_ATTACHMENT_SIZE: u64 = 20 * 1024 * 1024;

/// Accepted extensions and their MIME types.
pub const SUPPORTED_DOCUMENTS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
];

/// A document attached to the next turn.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    /// File name shown to the user.
    pub file_name: String,
    /// MIME type sent alongside the bytes.
    pub mime_type: String,
    /// Raw file contents.
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("file_name", &self.file_name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

impl Attachment {
    /// Create an attachment from in-memory bytes
    pub fn new(
        file_name: impl Into<String>,
        mime_type: impl Into<String>,
        data: Vec<u8>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }

    /// Read and validate a document from disk
    pub async fn from_path(path: impl AsRef<Path>) -> AttachmentResult<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| AttachmentError::NotFound {
                path: display.clone(),
            })?;
        if !metadata.is_file() {
            return Err(AttachmentError::NotFound { path: display });
        }

        let size = metadata.len();
        if size > MAX_ATTACHMENT_SIZE {
            return Err(AttachmentError::TooLarge {
                size,
                max: MAX_ATTACHMENT_SIZE,
            });
        }

        let extension = path
            .extension()
            .ok_or_else(|| AttachmentError::NoExtension {
                path: display.clone(),
            })?
            .to_string_lossy()
            .to_lowercase();
        let mime_type = mime_type_for(&extension).ok_or(AttachmentError::UnsupportedType {
            extension: extension.clone(),
        })?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(display);
        let data = tokio::fs::read(path).await?;

        Ok(Self::new(file_name, mime_type, data))
    }
}

/// MIME type for a supported document extension
pub fn mime_type_for(extension: &str) -> Option<&'static str> {
    let extension = extension.to_lowercase();
    SUPPORTED_DOCUMENTS
        .iter()
        .find(|(ext, _)| *ext == extension)
        .map(|(_, mime)| *mime)
}
