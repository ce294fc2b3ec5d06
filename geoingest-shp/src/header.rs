use bytes::Buf;
use geoingest_types::BoundingBox;

use crate::error::ShpError;

/// Value of the first header field of `.shp` and `.shx` files.
pub const FILE_CODE: i32 = 9994;
/// Length of the main file header.
pub const HEADER_LEN: usize = 100;

/// Shape type code of the main file header and of every record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShapeType {
    /// Record without geometry.
    Null,
    /// Shape type 1.
    Point,
    /// Shape type 3.
    PolyLine,
    /// Shape type 5.
    Polygon,
    /// Shape type 8.
    MultiPoint,
    /// Shape type 11.
    PointZ,
    /// Shape type 13.
    PolyLineZ,
    /// Shape type 15.
    PolygonZ,
    /// Shape type 18.
    MultiPointZ,
    /// Shape type 21.
    PointM,
    /// Shape type 23.
    PolyLineM,
    /// Shape type 25.
    PolygonM,
    /// Shape type 28.
    MultiPointM,
    /// Multipatch surfaces. Not decodable.
    MultiPatch,
}

impl ShapeType {
    /// Shape type of a numeric code, `None` for unknown codes.
    pub fn from_code(code: i32) -> Option<Self> {
        Some(match code {
            0 => ShapeType::Null,
            1 => ShapeType::Point,
            3 => ShapeType::PolyLine,
            5 => ShapeType::Polygon,
            8 => ShapeType::MultiPoint,
            11 => ShapeType::PointZ,
            13 => ShapeType::PolyLineZ,
            15 => ShapeType::PolygonZ,
            18 => ShapeType::MultiPointZ,
            21 => ShapeType::PointM,
            23 => ShapeType::PolyLineM,
            25 => ShapeType::PolygonM,
            28 => ShapeType::MultiPointM,
            31 => ShapeType::MultiPatch,
            _ => return None,
        })
    }

    /// The 2d type with the same record layout for x/y values. Z and M values follow the 2d part in records, so
    /// they can be skipped.
    pub fn planar(&self) -> Self {
        match self {
            ShapeType::PointZ | ShapeType::PointM => ShapeType::Point,
            ShapeType::PolyLineZ | ShapeType::PolyLineM => ShapeType::PolyLine,
            ShapeType::PolygonZ | ShapeType::PolygonM => ShapeType::Polygon,
            ShapeType::MultiPointZ | ShapeType::MultiPointM => ShapeType::MultiPoint,
            other => *other,
        }
    }
}

/// Fixed 100-byte header of `.shp` and `.shx` files.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShpHeader {
    /// Total length of the file in bytes, as declared by the header.
    pub file_length: usize,
    /// Format version, 1000 in valid files.
    pub version: i32,
    /// Type of all non-null records.
    pub shape_type: ShapeType,
    /// Extent of all records.
    pub bbox: BoundingBox,
}

impl ShpHeader {
    /// Decodes the header at the start of `data`.
    pub fn decode(data: &[u8]) -> Result<Self, ShpError> {
        let mut buf = data;
        ensure(&buf, HEADER_LEN, "file header")?;

        let file_code = buf.get_i32();
        if file_code != FILE_CODE {
            return Err(ShpError::InvalidFileCode(file_code));
        }

        buf.advance(20);
        // Length is stored in 16-bit words.
        let file_length = buf.get_i32().max(0) as usize * 2;
        let version = buf.get_i32_le();
        let shape_code = buf.get_i32_le();
        let shape_type =
            ShapeType::from_code(shape_code).ok_or(ShpError::UnsupportedShapeType(shape_code))?;

        let x_min = buf.get_f64_le();
        let y_min = buf.get_f64_le();
        let x_max = buf.get_f64_le();
        let y_max = buf.get_f64_le();

        Ok(Self {
            file_length,
            version,
            shape_type,
            bbox: BoundingBox::new(x_min, y_min, x_max, y_max),
        })
    }
}

pub(crate) fn ensure(buf: &impl Buf, len: usize, what: &str) -> Result<(), ShpError> {
    if buf.remaining() < len {
        Err(ShpError::Truncated(format!(
            "{what} needs {len} bytes, {} left",
            buf.remaining()
        )))
    } else {
        Ok(())
    }
}
