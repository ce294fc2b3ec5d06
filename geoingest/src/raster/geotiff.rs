//! GeoTIFF georeferencing tags.
//!
//! Only the first image file directory is read. Pixel data is decoded by the `image` crate, the reader here only
//! extracts the tags that define the pixel-to-world mapping:
//! * `ModelPixelScaleTag` + `ModelTiepointTag`, or `ModelTransformationTag` for the affine transform,
//! * `GeoKeyDirectoryTag` for the coordinate system.

use bytes::Buf;
use geoingest_types::{Crs, Point2d};
use image::ImageFormat;

use crate::context::DecodeContext;
use crate::decoded_image::DecodedImage;
use crate::error::IngestError;
use crate::input::RawInput;
use crate::layer::{AffineTransform, GisLayer, LayerWarning, RasterLayer, WarningKind};

const TAG_IMAGE_WIDTH: u16 = 256;
const TAG_IMAGE_LENGTH: u16 = 257;
const TAG_SAMPLES_PER_PIXEL: u16 = 277;
const TAG_MODEL_PIXEL_SCALE: u16 = 33550;
const TAG_MODEL_TIEPOINT: u16 = 33922;
const TAG_MODEL_TRANSFORMATION: u16 = 34264;
const TAG_GEO_KEY_DIRECTORY: u16 = 34735;
const TAG_GEO_DOUBLE_PARAMS: u16 = 34736;
const TAG_GEO_ASCII_PARAMS: u16 = 34737;

const KEY_MODEL_TYPE: u16 = 1024;
const KEY_RASTER_TYPE: u16 = 1025;
const KEY_CITATION: u16 = 1026;
const KEY_GEOGRAPHIC_TYPE: u16 = 2048;
const KEY_PROJECTED_CS_TYPE: u16 = 3072;
const KEY_PROJECTED_CITATION: u16 = 3073;

const MODEL_TYPE_GEOGRAPHIC: u16 = 2;
const RASTER_PIXEL_IS_POINT: u16 = 2;
const USER_DEFINED: u16 = 32767;

const IFD_ENTRY_LEN: usize = 12;

/// Field of an IFD entry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct IfdEntry {
    tag: u16,
    field_type: u16,
    count: usize,
    /// Absolute offset of the value data.
    value_offset: usize,
}

impl IfdEntry {
    fn type_size(field_type: u16) -> usize {
        match field_type {
            1 | 2 | 6 | 7 => 1,
            3 | 8 => 2,
            4 | 9 | 11 => 4,
            5 | 10 | 12 | 16 | 17 => 8,
            _ => 0,
        }
    }
}

/// Byte reader of a TIFF file with the byte order given by its header.
struct TiffReader<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> TiffReader<'a> {
    fn new(data: &'a [u8]) -> Result<(Self, usize), IngestError> {
        let little_endian = match data.get(0..2) {
            Some(b"II") => true,
            Some(b"MM") => false,
            _ => return Err(IngestError::UnsupportedFormat("not a TIFF file".into())),
        };

        let reader = Self {
            data,
            little_endian,
        };
        match reader.u16_at(2)? {
            42 => {}
            43 => {
                return Err(IngestError::UnsupportedFormat(
                    "BigTIFF files are not supported".into(),
                ))
            }
            version => {
                return Err(IngestError::UnsupportedFormat(format!(
                    "unknown TIFF version {version}"
                )))
            }
        }

        let ifd_offset = reader.u32_at(4)? as usize;
        Ok((reader, ifd_offset))
    }

    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8], IngestError> {
        offset
            .checked_add(len)
            .and_then(|end| self.data.get(offset..end))
            .ok_or_else(|| {
                IngestError::Io(format!(
                    "TIFF data truncated: {len} bytes at offset {offset}, file has {}",
                    self.data.len()
                ))
            })
    }

    fn u16_at(&self, offset: usize) -> Result<u16, IngestError> {
        let mut buf = self.slice(offset, 2)?;
        Ok(if self.little_endian {
            buf.get_u16_le()
        } else {
            buf.get_u16()
        })
    }

    fn u32_at(&self, offset: usize) -> Result<u32, IngestError> {
        let mut buf = self.slice(offset, 4)?;
        Ok(if self.little_endian {
            buf.get_u32_le()
        } else {
            buf.get_u32()
        })
    }

    fn u64_at(&self, offset: usize) -> Result<u64, IngestError> {
        let mut buf = self.slice(offset, 8)?;
        Ok(if self.little_endian {
            buf.get_u64_le()
        } else {
            buf.get_u64()
        })
    }

    fn entries(&self, ifd_offset: usize) -> Result<Vec<IfdEntry>, IngestError> {
        let count = self.u16_at(ifd_offset)? as usize;
        self.slice(ifd_offset + 2, count * IFD_ENTRY_LEN)?;

        (0..count)
            .map(|i| {
                let offset = ifd_offset + 2 + i * IFD_ENTRY_LEN;
                let field_type = self.u16_at(offset + 2)?;
                let count = self.u32_at(offset + 4)? as usize;
                let size = IfdEntry::type_size(field_type).saturating_mul(count);
                let value_offset = if size <= 4 {
                    offset + 8
                } else {
                    self.u32_at(offset + 8)? as usize
                };

                Ok(IfdEntry {
                    tag: self.u16_at(offset)?,
                    field_type,
                    count,
                    value_offset,
                })
            })
            .collect()
    }

    /// Reads an integer field of any unsigned integer type.
    fn integers(&self, entry: &IfdEntry) -> Result<Vec<u64>, IngestError> {
        let size = IfdEntry::type_size(entry.field_type);
        (0..entry.count)
            .map(|i| {
                let offset = entry.value_offset + i * size;
                Ok(match entry.field_type {
                    1 | 7 => self.slice(offset, 1)?[0] as u64,
                    3 => self.u16_at(offset)? as u64,
                    4 => self.u32_at(offset)? as u64,
                    16 => self.u64_at(offset)?,
                    other => {
                        return Err(IngestError::Io(format!(
                            "tag {} has type {other}, expected an integer",
                            entry.tag
                        )))
                    }
                })
            })
            .collect()
    }

    /// Reads a numeric field as floating point values.
    fn doubles(&self, entry: &IfdEntry) -> Result<Vec<f64>, IngestError> {
        match entry.field_type {
            12 => (0..entry.count)
                .map(|i| Ok(f64::from_bits(self.u64_at(entry.value_offset + i * 8)?)))
                .collect(),
            11 => (0..entry.count)
                .map(|i| Ok(f32::from_bits(self.u32_at(entry.value_offset + i * 4)?) as f64))
                .collect(),
            5 => (0..entry.count)
                .map(|i| {
                    let offset = entry.value_offset + i * 8;
                    let numerator = self.u32_at(offset)? as f64;
                    let denominator = self.u32_at(offset + 4)? as f64;
                    Ok(numerator / denominator)
                })
                .collect(),
            _ => Ok(self.integers(entry)?.into_iter().map(|v| v as f64).collect()),
        }
    }

    fn ascii(&self, entry: &IfdEntry) -> Result<String, IngestError> {
        let bytes = self.slice(entry.value_offset, entry.count)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Georeferencing-relevant content of the first IFD.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct GeoTiffTags {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) samples_per_pixel: u16,
    pub(crate) pixel_scale: Option<Vec<f64>>,
    pub(crate) tiepoint: Option<Vec<f64>>,
    pub(crate) transformation: Option<Vec<f64>>,
    pub(crate) geo_keys: Option<Vec<u64>>,
    pub(crate) ascii_params: Option<String>,
}

impl GeoTiffTags {
    pub(crate) fn read(data: &[u8]) -> Result<Self, IngestError> {
        let (reader, ifd_offset) = TiffReader::new(data)?;
        let mut tags = GeoTiffTags {
            samples_per_pixel: 1,
            ..Default::default()
        };

        for entry in reader.entries(ifd_offset)? {
            let first_integer = || -> Result<u64, IngestError> {
                reader
                    .integers(&entry)?
                    .first()
                    .copied()
                    .ok_or_else(|| IngestError::Io(format!("tag {} has no value", entry.tag)))
            };

            match entry.tag {
                TAG_IMAGE_WIDTH => tags.width = clamp_u32(first_integer()?),
                TAG_IMAGE_LENGTH => tags.height = clamp_u32(first_integer()?),
                TAG_SAMPLES_PER_PIXEL => tags.samples_per_pixel = first_integer()?.min(u16::MAX as u64) as u16,
                TAG_MODEL_PIXEL_SCALE => tags.pixel_scale = Some(reader.doubles(&entry)?),
                TAG_MODEL_TIEPOINT => tags.tiepoint = Some(reader.doubles(&entry)?),
                TAG_MODEL_TRANSFORMATION => tags.transformation = Some(reader.doubles(&entry)?),
                TAG_GEO_KEY_DIRECTORY => tags.geo_keys = Some(reader.integers(&entry)?),
                TAG_GEO_ASCII_PARAMS => tags.ascii_params = Some(reader.ascii(&entry)?),
                TAG_GEO_DOUBLE_PARAMS => {}
                _ => {}
            }
        }

        Ok(tags)
    }

    /// Pixel-to-model transform, if the transform tags are present and consistent.
    fn transform(&self) -> Option<AffineTransform> {
        if let Some(m) = self.transformation.as_ref().filter(|m| m.len() >= 16) {
            return Some(AffineTransform::new([m[3], m[0], m[1], m[7], m[4], m[5]]));
        }

        let scale = self.pixel_scale.as_ref().filter(|s| s.len() >= 2)?;
        let tiepoint = self.tiepoint.as_ref().filter(|t| t.len() >= 6)?;
        let (col, row, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        let origin = Point2d::new(x - col * scale[0], y + row * scale[1]);
        Some(AffineTransform::north_up(origin, scale[0], scale[1]))
    }

    /// Value of a short GeoKey stored inline.
    fn key(&self, id: u16) -> Option<u16> {
        self.key_entry(id)
            .filter(|entry| entry[1] == 0)
            .and_then(|entry| u16::try_from(entry[3]).ok())
    }

    /// String GeoKey stored in `GeoAsciiParamsTag`.
    fn ascii_key(&self, id: u16) -> Option<String> {
        let entry = self.key_entry(id).filter(|e| e[1] == TAG_GEO_ASCII_PARAMS as u64)?;
        let params = self.ascii_params.as_ref()?;
        let count = usize::try_from(entry[2]).ok()?;
        let offset = usize::try_from(entry[3]).ok()?;
        let value = params.get(offset..offset.checked_add(count)?)?;
        let value = value.trim_end_matches(['|', '\0']).trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    fn key_entry(&self, id: u16) -> Option<&[u64]> {
        let keys = self.geo_keys.as_ref()?;
        let count = *keys.get(3)? as usize;
        keys.get(4..)?
            .chunks_exact(4)
            .take(count)
            .find(|entry| entry[0] == id as u64)
    }

    fn crs(&self) -> Crs {
        let citation = || {
            self.ascii_key(KEY_PROJECTED_CITATION)
                .or_else(|| self.ascii_key(KEY_CITATION))
        };
        let user_defined = || Crs::Unrecognized(citation().unwrap_or_else(|| "user-defined CRS".into()));

        match self.key(KEY_PROJECTED_CS_TYPE) {
            Some(USER_DEFINED) => return user_defined(),
            Some(code) => return Crs::from_epsg(code as u32),
            None => {}
        }

        match self.key(KEY_GEOGRAPHIC_TYPE) {
            Some(USER_DEFINED) => user_defined(),
            Some(code) => Crs::from_epsg(code as u32),
            None if self.key(KEY_MODEL_TYPE) == Some(MODEL_TYPE_GEOGRAPHIC) => {
                Crs::Unrecognized(citation().unwrap_or_else(|| "geographic CRS without EPSG code".into()))
            }
            None => Crs::Unrecognized(citation().unwrap_or_else(|| "GeoKeys without CRS code".into())),
        }
    }

    fn missing_georeferencing(&self) -> Vec<&'static str> {
        let mut missing = vec![];
        if self.transform().is_none() {
            if self.transformation.is_none() && self.pixel_scale.is_none() {
                missing.push("ModelPixelScaleTag");
            }
            if self.transformation.is_none() && self.tiepoint.is_none() {
                missing.push("ModelTiepointTag");
            }
            if missing.is_empty() {
                missing.push("a valid transform (scale, tiepoint or transformation tag)");
            }
        }
        if self.geo_keys.is_none() {
            missing.push("GeoKeyDirectoryTag");
        }
        missing
    }
}

fn clamp_u32(value: u64) -> u32 {
    value.min(u32::MAX as u64) as u32
}

/// Decodes a (Geo)TIFF file into a raster layer.
///
/// Files without complete georeferencing produce an unreferenced raster with a warning.
pub(crate) fn decode(input: &RawInput, ctx: &DecodeContext) -> Result<GisLayer, IngestError> {
    let bytes = input.bytes();
    let tags = GeoTiffTags::read(bytes)?;
    let mut warnings = vec![];

    let missing = tags.missing_georeferencing();
    let (transform, crs) = match tags.transform() {
        Some(transform) if missing.is_empty() => {
            let transform = if tags.key(KEY_RASTER_TYPE) == Some(RASTER_PIXEL_IS_POINT) {
                transform.shift_pixels(-0.5, -0.5)
            } else {
                transform
            };
            let crs = tags.crs();
            log::debug!("GeoTIFF {} uses CRS {crs}", input.name());
            (transform, Some(crs))
        }
        _ => {
            warnings.push(LayerWarning::new(
                WarningKind::UnreferencedRaster,
                format!("no georeferencing: missing {}", missing.join(", ")),
            ));
            (AffineTransform::IDENTITY, None)
        }
    };

    let pixels = if ctx.options().decode_pixels {
        ctx.checkpoint()?;
        match DecodedImage::decode(bytes, Some(ImageFormat::Tiff)) {
            Ok(image) => Some(image),
            Err(err) => {
                warnings.push(LayerWarning::new(
                    WarningKind::PixelData,
                    format!("pixel data could not be decoded: {err}"),
                ));
                None
            }
        }
    } else {
        None
    };

    let raster = RasterLayer {
        width: tags.width,
        height: tags.height,
        bands: tags.samples_per_pixel,
        transform,
        source_crs: crs,
        pixels,
    };

    Ok(GisLayer::raster(input.stem(), raster).with_warnings(warnings))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use assert_matches::assert_matches;

    use super::*;
    use crate::test_utils::TiffBuilder;

    #[test]
    fn scale_and_tiepoint() {
        let data = TiffBuilder::new()
            .pixel_scale(10.0, 10.0)
            .tiepoint(0.0, 0.0, 500000.0, 5500000.0)
            .geo_keys(&[(KEY_MODEL_TYPE, 1), (KEY_PROJECTED_CS_TYPE, 32633)])
            .build();

        let layer = decode(&RawInput::new("map.tif", data), &DecodeContext::default()).unwrap();
        assert!(layer.warnings().is_empty(), "{:?}", layer.warnings());
        let raster = layer.raster_data().unwrap();
        assert_eq!((raster.width, raster.height, raster.bands), (2, 2, 1));
        assert_eq!(raster.source_crs, Some(Crs::Utm { zone: 33, south: false }));
        assert_eq!(
            raster.transform.coefficients(),
            [500000.0, 10.0, 0.0, 5500000.0, 0.0, -10.0]
        );
        assert!(raster.pixels.is_some());
    }

    #[test]
    fn pixel_is_point_shifts_origin() {
        let data = TiffBuilder::new()
            .pixel_scale(1.0, 1.0)
            .tiepoint(0.0, 0.0, 10.0, 50.0)
            .geo_keys(&[
                (KEY_MODEL_TYPE, MODEL_TYPE_GEOGRAPHIC),
                (KEY_RASTER_TYPE, RASTER_PIXEL_IS_POINT),
                (KEY_GEOGRAPHIC_TYPE, 4326),
            ])
            .build();

        let layer = decode(&RawInput::new("map.tif", data), &DecodeContext::default()).unwrap();
        let raster = layer.raster_data().unwrap();
        assert_eq!(raster.source_crs, Some(Crs::Wgs84));
        let origin = raster.transform.apply(0.0, 0.0);
        assert_relative_eq!(origin.x(), 9.5);
        assert_relative_eq!(origin.y(), 50.5);
    }

    #[test]
    fn missing_geo_keys() {
        let data = TiffBuilder::new()
            .pixel_scale(1.0, 1.0)
            .tiepoint(0.0, 0.0, 10.0, 50.0)
            .build();

        let layer = decode(&RawInput::new("scan.tiff", data), &DecodeContext::default()).unwrap();
        assert_eq!(layer.crs(), None);
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::UnreferencedRaster);
        assert!(layer.warnings()[0].message.contains("GeoKeyDirectoryTag"));
        assert!(layer.raster_data().unwrap().transform.is_identity());
    }

    #[test]
    fn user_defined_crs_uses_citation() {
        let data = TiffBuilder::new()
            .pixel_scale(1.0, 1.0)
            .tiepoint(0.0, 0.0, 0.0, 0.0)
            .geo_keys(&[(KEY_MODEL_TYPE, 1), (KEY_PROJECTED_CS_TYPE, USER_DEFINED)])
            .geo_citation("Local grid|")
            .build();

        let tags = GeoTiffTags::read(&data).unwrap();
        assert_eq!(tags.crs(), Crs::Unrecognized("Local grid".into()));
    }

    #[test]
    fn transformation_matrix() {
        let mut tags = GeoTiffTags::default();
        let mut matrix = vec![0.0; 16];
        matrix[0] = 2.0;
        matrix[1] = 0.5;
        matrix[3] = 100.0;
        matrix[4] = 0.25;
        matrix[5] = -2.0;
        matrix[7] = 200.0;
        tags.transformation = Some(matrix);

        let transform = tags.transform().unwrap();
        assert_eq!(transform.coefficients(), [100.0, 2.0, 0.5, 200.0, 0.25, -2.0]);
        assert_eq!(tags.missing_georeferencing(), vec!["GeoKeyDirectoryTag"]);
    }

    #[test]
    fn big_tiff_and_truncation() {
        let result = GeoTiffTags::read(b"II+\0\x08\0\x08\0\0\0\0\0\0\0\0\0");
        assert_matches!(result, Err(IngestError::UnsupportedFormat(_)));

        let mut data = TiffBuilder::new().build();
        data.truncate(data.len() - 20);
        assert_matches!(GeoTiffTags::read(&data), Err(IngestError::Io(_)));
    }

    #[test]
    fn out_of_range_geo_keys_are_skipped() {
        let tags = GeoTiffTags {
            geo_keys: Some(vec![
                1, 1, 0, 3,
                KEY_PROJECTED_CS_TYPE as u64, 0, 1, 70000,
                KEY_CITATION as u64, TAG_GEO_ASCII_PARAMS as u64, u64::MAX, 1,
                KEY_PROJECTED_CITATION as u64, TAG_GEO_ASCII_PARAMS as u64, 8, usize::MAX as u64,
            ]),
            ascii_params: Some("Local grid|".into()),
            ..Default::default()
        };

        assert_eq!(tags.key(KEY_PROJECTED_CS_TYPE), None);
        assert_eq!(tags.ascii_key(KEY_CITATION), None);
        assert_eq!(tags.ascii_key(KEY_PROJECTED_CITATION), None);
        assert_eq!(tags.crs(), Crs::Unrecognized("GeoKeys without CRS code".into()));
    }
}
