use std::path::Path;

use serde::Serialize;

use super::ImportError;

/// Broad file categories accepted by the upload endpoints.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FileCategory {
    PlainText,
    Markdown,
    Pdf,
    WordDocument,
    Image,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Markdown => "markdown",
            Self::Pdf => "pdf",
            Self::WordDocument => "word_document",
            Self::Image => "image",
        }
    }

    /// Whether text can be read straight from the bytes.
    pub fn is_text(&self) -> bool {
        matches!(self, Self::PlainText | Self::Markdown)
    }

    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            ".txt" => Some(Self::PlainText),
            ".md" => Some(Self::Markdown),
            ".pdf" => Some(Self::Pdf),
            ".doc" | ".docx" => Some(Self::WordDocument),
            ".jpg" | ".jpeg" | ".png" => Some(Self::Image),
            _ => None,
        }
    }
}

/// Which extensions and content types an upload surface accepts.
#[derive(Debug, Clone, Copy)]
pub struct FormatPolicy {
    pub extensions: &'static [&'static str],
    pub mime_types: &'static [&'static str],
}

/// Medical document uploads.
pub const DOCUMENT_UPLOADS: FormatPolicy = FormatPolicy {
    extensions: &[".pdf", ".txt", ".docx", ".md", ".doc"],
    mime_types: &[
        "application/pdf",
        "text/plain",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "application/msword",
        "text/markdown",
        "text/x-markdown",
    ],
};

/// Files attached to a results analysis request.
pub const ANALYSIS_UPLOADS: FormatPolicy = FormatPolicy {
    extensions: &[".pdf", ".docx", ".txt", ".jpg", ".jpeg", ".png"],
    mime_types: &[
        "application/pdf",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "text/plain",
        "image/jpeg",
        "image/png",
    ],
};

/// Result of validating an uploaded file.
#[derive(Debug, Clone, Serialize)]
pub struct UploadFormat {
    /// Lowercased extension including the dot, e.g. `.pdf`.
    pub extension: String,
    pub mime_type: String,
    pub category: FileCategory,
}

/// Check an upload against `policy` and the size limit.
///
/// The declared content type wins when present; otherwise (or when the client
/// sent the generic `application/octet-stream`) the type is guessed from the
/// extension.
pub fn validate_upload(
    filename: &str,
    declared_type: Option<&str>,
    size: u64,
    max_size: u64,
    policy: &FormatPolicy,
) -> Result<UploadFormat, ImportError> {
    if size > max_size {
        return Err(ImportError::FileTooLarge {
            size_mb: size as f64 / (1024.0 * 1024.0),
            max_mb: max_size as f64 / (1024.0 * 1024.0),
        });
    }
    if size == 0 {
        return Err(ImportError::EmptyFile);
    }

    let extension = file_extension(filename);
    let category = FileCategory::from_extension(&extension)
        .filter(|_| policy.extensions.contains(&extension.as_str()))
        .ok_or_else(|| ImportError::UnsupportedFormat {
            extension: extension.clone(),
            allowed: policy.extensions.join(", "),
        })?;

    let declared = declared_type
        .map(|t| t.split(';').next().unwrap_or(t).trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty() && t != "application/octet-stream");
    let mime_type = match declared {
        Some(t) => t,
        None => mime_guess::from_path(filename)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string(),
    };

    if !policy.mime_types.contains(&mime_type.as_str()) {
        return Err(ImportError::UnsupportedMimeType(mime_type));
    }

    Ok(UploadFormat {
        extension,
        mime_type,
        category,
    })
}

/// Lowercased extension with its leading dot, or an empty string.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// Sanitize a filename: strip path components, limit length.
pub fn sanitize_filename(original: &str) -> String {
    let name = Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}
