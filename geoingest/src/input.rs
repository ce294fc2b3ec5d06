use bytes::Bytes;

/// A file handed in by the caller: name, payload and the declared media type.
#[derive(Debug, Clone)]
pub struct RawInput {
    name: String,
    bytes: Bytes,
    media_type: Option<String>,
}

impl RawInput {
    /// Creates a new input without a declared media type.
    pub fn new(name: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
            media_type: None,
        }
    }

    /// Sets the declared media type (e.g. `application/geo+json`).
    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }

    /// File name, possibly with a directory part (`archive.zip/dir/file.shp` for archive entries).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Payload.
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Declared media type.
    pub fn media_type(&self) -> Option<&str> {
        self.media_type.as_deref()
    }

    /// File name without the directory part.
    pub fn file_name(&self) -> &str {
        self.name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&self.name)
    }

    /// Lowercase extension of the file name, without the dot.
    pub fn extension(&self) -> Option<String> {
        let file_name = self.file_name();
        let (stem, ext) = file_name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_ascii_lowercase())
    }

    /// File name without the directory part and the extension.
    pub fn stem(&self) -> &str {
        let file_name = self.file_name();
        match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem,
            _ => file_name,
        }
    }
}
