use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_MAX_ARCHIVE_ENTRIES: usize = 4096;

/// Configuration of an [`Ingestor`](crate::Ingestor).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IngestOptions {
    /// Maximum number of files decoded at the same time. Defaults to the available CPU parallelism.
    pub max_concurrency: Option<usize>,
    /// Decode raster pixel data. When false, raster layers carry only dimensions and georeferencing.
    pub decode_pixels: bool,
    /// Extract generic zip archives and decode their entries.
    pub expand_zip_archives: bool,
    /// Archives with more entries are rejected as corrupt.
    pub max_archive_entries: usize,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            max_concurrency: None,
            decode_pixels: true,
            expand_zip_archives: true,
            max_archive_entries: DEFAULT_MAX_ARCHIVE_ENTRIES,
        }
    }
}

impl IngestOptions {
    /// Sets the maximum number of concurrently decoded files.
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = Some(max_concurrency);
        self
    }

    /// Sets whether raster pixel data is decoded.
    pub fn with_decode_pixels(mut self, decode_pixels: bool) -> Self {
        self.decode_pixels = decode_pixels;
        self
    }

    /// Sets whether zip archives are extracted.
    pub fn with_expand_zip_archives(mut self, expand: bool) -> Self {
        self.expand_zip_archives = expand;
        self
    }

    /// Sets the maximum number of archive entries.
    pub fn with_max_archive_entries(mut self, max_entries: usize) -> Self {
        self.max_archive_entries = max_entries;
        self
    }

    /// Effective concurrency limit, at least 1.
    pub fn concurrency(&self) -> usize {
        self.max_concurrency
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(NonZeroUsize::get)
                    .unwrap_or(DEFAULT_CONCURRENCY)
            })
            .max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserialize_with_defaults() {
        let options: IngestOptions =
            serde_json::from_str(r#"{"decode_pixels": false, "max_concurrency": 2}"#).unwrap();
        assert_eq!(options.max_concurrency, Some(2));
        assert!(!options.decode_pixels);
        assert!(options.expand_zip_archives);
        assert_eq!(options.max_archive_entries, 4096);
    }

    #[test]
    fn concurrency_is_positive() {
        assert_eq!(IngestOptions::default().with_max_concurrency(0).concurrency(), 1);
        assert!(IngestOptions::default().concurrency() >= 1);
    }
}
