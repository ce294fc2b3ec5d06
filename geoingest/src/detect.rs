//! Classification of inputs by extension, declared media type and leading bytes.

use crate::input::RawInput;

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n";
const JPEG_MAGIC: &[u8] = b"\xff\xd8\xff";
const GIF_MAGICS: [&[u8]; 2] = [b"GIF87a", b"GIF89a"];
const TIFF_MAGICS: [&[u8]; 2] = [b"II*\0", b"MM\0*"];
const BIG_TIFF_MAGICS: [&[u8]; 2] = [b"II+\0", b"MM\0+"];
const SHP_MAGIC: &[u8] = &[0x00, 0x00, 0x27, 0x0a];

/// Component of a shapefile group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapefilePartKind {
    /// Geometry records.
    Shp,
    /// Attribute table.
    Dbf,
    /// Coordinate system definition.
    Prj,
    /// Record index.
    Shx,
    /// Code page of the attribute table.
    Cpg,
}

/// Format of an input, decided once per input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectedFormat {
    /// GeoJSON text.
    GeoJson,
    /// File of a shapefile group.
    ShapefilePart(ShapefilePartKind),
    /// KML document.
    Kml,
    /// Zipped KML with embedded resources.
    Kmz,
    /// Generic zip archive.
    ZipArchive,
    /// TIFF image, possibly with georeferencing tags.
    GeoTiff,
    /// PNG, JPEG or GIF image.
    RasterImage,
    /// Nothing matched.
    Unknown,
}

/// Detects the format of the input.
///
/// The extension is checked first, then the declared media type, then the leading bytes. Never fails.
pub fn detect(input: &RawInput) -> DetectedFormat {
    let format = input
        .extension()
        .and_then(|ext| from_extension(&ext))
        .or_else(|| input.media_type().and_then(from_media_type))
        .unwrap_or_else(|| sniff(input.bytes()));

    log::debug!("Detected {} as {format:?}", input.name());
    format
}

fn from_extension(ext: &str) -> Option<DetectedFormat> {
    use DetectedFormat::*;

    Some(match ext {
        "geojson" | "json" => GeoJson,
        "shp" => ShapefilePart(ShapefilePartKind::Shp),
        "dbf" => ShapefilePart(ShapefilePartKind::Dbf),
        "prj" => ShapefilePart(ShapefilePartKind::Prj),
        "shx" => ShapefilePart(ShapefilePartKind::Shx),
        "cpg" => ShapefilePart(ShapefilePartKind::Cpg),
        "kml" => Kml,
        "kmz" => Kmz,
        "zip" => ZipArchive,
        "tif" | "tiff" | "gtiff" => GeoTiff,
        "png" | "jpg" | "jpeg" | "gif" => RasterImage,
        _ => return None,
    })
}

fn from_media_type(media_type: &str) -> Option<DetectedFormat> {
    use DetectedFormat::*;

    let essence = media_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    Some(match essence.as_str() {
        "application/geo+json" | "application/vnd.geo+json" | "application/json" => GeoJson,
        "application/vnd.google-earth.kml+xml" => Kml,
        "application/vnd.google-earth.kmz" => Kmz,
        "application/zip" | "application/x-zip-compressed" => ZipArchive,
        "image/tiff" | "image/geotiff" => GeoTiff,
        "image/png" | "image/jpeg" | "image/gif" => RasterImage,
        "application/x-esri-shape" => ShapefilePart(ShapefilePartKind::Shp),
        "application/x-dbf" | "application/dbf" => ShapefilePart(ShapefilePartKind::Dbf),
        _ => return None,
    })
}

/// Detects the format from the leading bytes of the payload.
pub fn sniff(bytes: &[u8]) -> DetectedFormat {
    if bytes.starts_with(ZIP_MAGIC) {
        return if first_zip_entry_is_kml(bytes) {
            DetectedFormat::Kmz
        } else {
            DetectedFormat::ZipArchive
        };
    }

    if TIFF_MAGICS.iter().chain(&BIG_TIFF_MAGICS).any(|m| bytes.starts_with(m)) {
        return DetectedFormat::GeoTiff;
    }

    if bytes.starts_with(PNG_MAGIC)
        || bytes.starts_with(JPEG_MAGIC)
        || GIF_MAGICS.iter().any(|m| bytes.starts_with(m))
    {
        return DetectedFormat::RasterImage;
    }

    if bytes.starts_with(SHP_MAGIC) {
        return DetectedFormat::ShapefilePart(ShapefilePartKind::Shp);
    }

    let text = skip_bom_and_whitespace(bytes);
    match text.first() {
        Some(b'{' | b'[') => DetectedFormat::GeoJson,
        Some(b'<') if is_kml(text) => DetectedFormat::Kml,
        _ => DetectedFormat::Unknown,
    }
}

fn skip_bom_and_whitespace(bytes: &[u8]) -> &[u8] {
    let bytes = bytes.strip_prefix(b"\xef\xbb\xbf").unwrap_or(bytes);
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    &bytes[start..]
}

fn is_kml(text: &[u8]) -> bool {
    const HEAD_LEN: usize = 1024;
    let head = String::from_utf8_lossy(&text[..text.len().min(HEAD_LEN)]);
    head.contains("<kml")
}

/// Reads the name of the first local file header of a zip archive.
fn first_zip_entry_is_kml(bytes: &[u8]) -> bool {
    const NAME_LEN_OFFSET: usize = 26;
    const NAME_OFFSET: usize = 30;

    let Some(len_bytes) = bytes.get(NAME_LEN_OFFSET..NAME_LEN_OFFSET + 2) else {
        return false;
    };
    let name_len = u16::from_le_bytes([len_bytes[0], len_bytes[1]]) as usize;
    bytes
        .get(NAME_OFFSET..NAME_OFFSET + name_len)
        .is_some_and(|name| name.to_ascii_lowercase().ends_with(b".kml"))
}
