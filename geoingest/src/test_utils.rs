//! Builders of binary fixtures used by the tests of several modules.

use std::io::{Cursor, Write};

use bytes::BufMut;
use image::{DynamicImage, ImageOutputFormat, Rgba, RgbaImage};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// RGBA PNG with a horizontal gradient.
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| Rgba([(x * 40) as u8, (y * 40) as u8, 128, 255]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(image)
        .write_to(&mut buf, ImageOutputFormat::Png)
        .expect("png encoding");
    buf.into_inner()
}

const GEO_KEY_DIRECTORY: u16 = 34735;
const GEO_ASCII_PARAMS: u16 = 34737;
const CITATION_KEY: u16 = 1026;

enum TagValue {
    Short(Vec<u16>),
    Long(u32),
    Double(Vec<f64>),
    Ascii(String),
}

/// Little endian, uncompressed 2x2 grayscale TIFF with optional GeoTIFF tags.
///
/// The IFD is written after all other data.
#[derive(Default)]
pub(crate) struct TiffBuilder {
    pixel_scale: Option<[f64; 3]>,
    tiepoint: Option<[f64; 6]>,
    geo_keys: Option<Vec<(u16, u16)>>,
    citation: Option<String>,
}

impl TiffBuilder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn pixel_scale(mut self, x: f64, y: f64) -> Self {
        self.pixel_scale = Some([x, y, 0.0]);
        self
    }

    pub(crate) fn tiepoint(mut self, col: f64, row: f64, x: f64, y: f64) -> Self {
        self.tiepoint = Some([col, row, 0.0, x, y, 0.0]);
        self
    }

    /// Inline short GeoKeys as `(id, value)` pairs.
    pub(crate) fn geo_keys(mut self, keys: &[(u16, u16)]) -> Self {
        self.geo_keys = Some(keys.to_vec());
        self
    }

    /// Adds a citation GeoKey stored in the ascii params tag.
    pub(crate) fn geo_citation(mut self, citation: &str) -> Self {
        self.citation = Some(citation.to_string());
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        let mut tags: Vec<(u16, TagValue)> = vec![
            (256, TagValue::Short(vec![2])),
            (257, TagValue::Short(vec![2])),
            (258, TagValue::Short(vec![8])),
            (259, TagValue::Short(vec![1])),
            (262, TagValue::Short(vec![1])),
            (273, TagValue::Long(8)),
            (277, TagValue::Short(vec![1])),
            (278, TagValue::Short(vec![2])),
            (279, TagValue::Long(4)),
        ];

        if let Some(scale) = self.pixel_scale {
            tags.push((33550, TagValue::Double(scale.to_vec())));
        }
        if let Some(tiepoint) = self.tiepoint {
            tags.push((33922, TagValue::Double(tiepoint.to_vec())));
        }

        if self.geo_keys.is_some() || self.citation.is_some() {
            let mut keys: Vec<[u16; 4]> = self
                .geo_keys
                .unwrap_or_default()
                .into_iter()
                .map(|(id, value)| [id, 0, 1, value])
                .collect();
            if let Some(citation) = &self.citation {
                keys.push([CITATION_KEY, GEO_ASCII_PARAMS, citation.len() as u16, 0]);
            }
            keys.sort_by_key(|key| key[0]);

            let mut directory = vec![1, 1, 0, keys.len() as u16];
            directory.extend(keys.into_iter().flatten());
            tags.push((GEO_KEY_DIRECTORY, TagValue::Short(directory)));
        }
        if let Some(citation) = self.citation {
            tags.push((GEO_ASCII_PARAMS, TagValue::Ascii(citation)));
        }

        let mut buf = Vec::new();
        buf.put_slice(b"II");
        buf.put_u16_le(42);
        buf.put_u32_le(0);
        buf.put_slice(&[0, 85, 170, 255]);

        let mut entries = Vec::with_capacity(tags.len());
        for (tag, value) in tags {
            let (field_type, count, bytes) = match value {
                TagValue::Short(values) => {
                    let mut bytes = Vec::new();
                    values.iter().for_each(|v| bytes.put_u16_le(*v));
                    (3u16, values.len(), bytes)
                }
                TagValue::Long(value) => (4, 1, value.to_le_bytes().to_vec()),
                TagValue::Double(values) => {
                    let mut bytes = Vec::new();
                    values.iter().for_each(|v| bytes.put_f64_le(*v));
                    (12, values.len(), bytes)
                }
                TagValue::Ascii(text) => {
                    let mut bytes = text.into_bytes();
                    bytes.push(0);
                    (2, bytes.len(), bytes)
                }
            };

            let mut field = [0u8; 4];
            if bytes.len() <= 4 {
                field[..bytes.len()].copy_from_slice(&bytes);
            } else {
                if buf.len() % 2 == 1 {
                    buf.push(0);
                }
                field = (buf.len() as u32).to_le_bytes();
                buf.extend_from_slice(&bytes);
            }
            entries.push((tag, field_type, count as u32, field));
        }

        if buf.len() % 2 == 1 {
            buf.push(0);
        }
        let ifd_offset = buf.len() as u32;
        buf[4..8].copy_from_slice(&ifd_offset.to_le_bytes());

        buf.put_u16_le(entries.len() as u16);
        for (tag, field_type, count, field) in entries {
            buf.put_u16_le(tag);
            buf.put_u16_le(field_type);
            buf.put_u32_le(count);
            buf.put_slice(&field);
        }
        buf.put_u32_le(0);

        buf
    }
}

/// In-memory zip archive.
pub(crate) struct ZipBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
}

impl ZipBuilder {
    pub(crate) fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
        }
    }

    /// Adds a deflated entry.
    pub(crate) fn file(self, name: &str, content: &[u8]) -> Self {
        self.entry(name, content, CompressionMethod::Deflated)
    }

    /// Adds an entry without compression, so that its content appears verbatim in the archive.
    pub(crate) fn stored_file(self, name: &str, content: &[u8]) -> Self {
        self.entry(name, content, CompressionMethod::Stored)
    }

    fn entry(mut self, name: &str, content: &[u8], method: CompressionMethod) -> Self {
        let options = SimpleFileOptions::default().compression_method(method);
        self.writer.start_file(name, options).expect("zip entry");
        self.writer.write_all(content).expect("zip write");
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        self.writer.finish().expect("zip finish").into_inner()
    }

    /// Flips a byte in the middle of a stored entry content, breaking its checksum.
    pub(crate) fn corrupt_content(archive: &mut [u8], content: &[u8]) {
        let position = archive
            .windows(content.len())
            .position(|window| window == content)
            .expect("content is stored verbatim");
        archive[position + content.len() / 2] ^= 0xff;
    }
}
