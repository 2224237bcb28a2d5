use std::path::Path;

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// A document ready to be sent to the prompt service: MIME type plus base64 body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub mime_type: String,
    pub data: String,
}

impl Attachment {
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read attachment {}", path.display()))?;
        Ok(Self::from_bytes(guess_mime_type(path), &bytes))
    }

    /// `data:<mime>;base64,<body>`
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn parse_data_uri(uri: &str) -> Result<Self> {
        let rest = uri
            .strip_prefix("data:")
            .ok_or_else(|| anyhow!("data URI must start with `data:`"))?;
        let (mime_type, data) = rest
            .split_once(";base64,")
            .ok_or_else(|| anyhow!("data URI must be base64 encoded"))?;
        STANDARD
            .decode(data)
            .context("data URI body is not valid base64")?;
        Ok(Self {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }

    pub fn is_image(&self) -> bool {
        self.mime_type.starts_with("image/")
    }
}

pub fn guess_mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "html" | "htm" => "text/html",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn encodes_file_with_mime_type() {
        let mut file = tempfile::Builder::new().suffix(".PDF").tempfile().unwrap();
        file.write_all(b"abc").unwrap();

        let attachment = Attachment::from_path(file.path()).unwrap();
        assert_eq!(attachment.mime_type, "application/pdf");
        assert_eq!(attachment.to_data_uri(), "data:application/pdf;base64,YWJj");
        assert!(!attachment.is_image());
    }

    #[test]
    fn unknown_extension_is_octet_stream() {
        assert_eq!(guess_mime_type(Path::new("syllabus.xyz")), "application/octet-stream");
        assert_eq!(guess_mime_type(Path::new("syllabus")), "application/octet-stream");
    }

    #[test]
    fn data_uri_round_trip() {
        let attachment = Attachment::from_bytes("image/png", b"\x89PNG");
        let parsed = Attachment::parse_data_uri(&attachment.to_data_uri()).unwrap();
        assert_eq!(parsed, attachment);
        assert!(parsed.is_image());
        assert!(Attachment::parse_data_uri("data:text/plain,hello").is_err());
    }
}
