use std::{
    fmt::{Display, Formatter},
    path::{Path, PathBuf},
};

use bytes::Bytes;

use crate::error::ValidationError;

/// Input formats the transcoder accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageKind {
    Jpeg,
    Png,
}

impl ImageKind {
    /// Detect the kind from the filename extension (case-insensitive).
    pub fn from_filename(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "png" => Some(ImageKind::Png),
            _ => None,
        }
    }

    pub fn image_format(&self) -> image::ImageFormat {
        match self {
            ImageKind::Jpeg => image::ImageFormat::Jpeg,
            ImageKind::Png => image::ImageFormat::Png,
        }
    }
}

impl Display for ImageKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ImageKind::Jpeg => write!(f, "jpeg"),
            ImageKind::Png => write!(f, "png"),
        }
    }
}

/// Returns true for filenames the pipeline picks up (`.jpg`, `.jpeg`, `.png`).
pub fn is_supported(name: &str) -> bool {
    ImageKind::from_filename(name).is_some()
}

/// Keep only the final path component of a client supplied name.
pub fn sanitize_filename(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next()?.trim();
    if base.is_empty() || base == "." || base == ".." {
        return None;
    }
    Some(base.to_string())
}

#[derive(Debug, Clone)]
enum SourceData {
    Bytes(Bytes),
    Path(PathBuf),
}

/// One image to transcode. Immutable once created.
#[derive(Debug, Clone)]
pub struct ImageSource {
    filename: String,
    kind: ImageKind,
    size: u64,
    data: SourceData,
}

impl ImageSource {
    pub fn from_bytes(filename: &str, data: impl Into<Bytes>) -> Result<Self, ValidationError> {
        let data = data.into();
        Ok(Self {
            kind: kind_of(filename)?,
            filename: filename.to_string(),
            size: data.len() as u64,
            data: SourceData::Bytes(data),
        })
    }

    /// Path-backed source; the file is read when the transcode runs.
    /// `size` is whatever the caller measured (stat or bytes received).
    pub fn from_path(
        filename: &str,
        path: impl Into<PathBuf>,
        size: u64,
    ) -> Result<Self, ValidationError> {
        Ok(Self {
            kind: kind_of(filename)?,
            filename: filename.to_string(),
            size,
            data: SourceData::Path(path.into()),
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn kind(&self) -> ImageKind {
        self.kind
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.data {
            SourceData::Path(path) => Some(path),
            SourceData::Bytes(_) => None,
        }
    }

    /// Blocking read of the source content.
    pub fn read(&self) -> std::io::Result<Bytes> {
        match &self.data {
            SourceData::Bytes(bytes) => Ok(bytes.clone()),
            SourceData::Path(path) => std::fs::read(path).map(Bytes::from),
        }
    }

    pub(crate) fn renamed(mut self, filename: String) -> Self {
        self.filename = filename;
        self
    }
}

fn kind_of(filename: &str) -> Result<ImageKind, ValidationError> {
    ImageKind::from_filename(filename)
        .ok_or_else(|| ValidationError::UnsupportedType(filename.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(ImageKind::from_filename("a.jpg"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_filename("a.JPEG"), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::from_filename("a.b.Png"), Some(ImageKind::Png));
        assert_eq!(ImageKind::from_filename("a.gif"), None);
        assert_eq!(ImageKind::from_filename("png"), None);
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("photo.jpg").as_deref(), Some("photo.jpg"));
        assert_eq!(sanitize_filename("../../etc/x.png").as_deref(), Some("x.png"));
        assert_eq!(sanitize_filename("C:\\pics\\y.jpg").as_deref(), Some("y.jpg"));
        assert_eq!(sanitize_filename("dir/"), None);
        assert_eq!(sanitize_filename(".."), None);
    }

    #[test]
    fn test_bytes_source() {
        let source = ImageSource::from_bytes("a.png", vec![1u8, 2, 3]).unwrap();
        assert_eq!(source.size(), 3);
        assert_eq!(source.kind(), ImageKind::Png);
        assert!(source.path().is_none());
        assert_eq!(source.read().unwrap().as_ref(), &[1, 2, 3]);
    }

    #[test]
    fn test_rejects_unsupported() {
        let err = ImageSource::from_bytes("notes.txt", Vec::new()).unwrap_err();
        assert!(matches!(err, ValidationError::UnsupportedType(name) if name == "notes.txt"));
    }
}
