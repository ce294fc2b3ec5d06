//! Byte builders for shapefile components, used in tests.

use bytes::BufMut;

use crate::header::{FILE_CODE, HEADER_LEN};

/// Builds `.shp` and matching `.shx` files.
#[derive(Debug, Clone)]
pub struct ShapefileBuilder {
    shape_type: i32,
    records: Vec<Vec<u8>>,
    bbox: Option<[f64; 4]>,
}

impl ShapefileBuilder {
    /// Creates a builder for files of the given shape type code.
    pub fn new(shape_type: i32) -> Self {
        Self {
            shape_type,
            records: vec![],
            bbox: None,
        }
    }

    fn include(&mut self, x: f64, y: f64) {
        let bbox = self.bbox.get_or_insert([x, y, x, y]);
        bbox[0] = bbox[0].min(x);
        bbox[1] = bbox[1].min(y);
        bbox[2] = bbox[2].max(x);
        bbox[3] = bbox[3].max(y);
    }

    /// Adds a point record.
    pub fn point(mut self, x: f64, y: f64) -> Self {
        self.include(x, y);
        let mut content = vec![];
        content.put_i32_le(1);
        content.put_f64_le(x);
        content.put_f64_le(y);
        self.records.push(content);
        self
    }

    /// Adds a null record.
    pub fn null(mut self) -> Self {
        let mut content = vec![];
        content.put_i32_le(0);
        self.records.push(content);
        self
    }

    /// Adds a multipoint record.
    pub fn multipoint(mut self, points: &[(f64, f64)]) -> Self {
        let mut content = vec![];
        content.put_i32_le(8);
        put_bbox(&mut content, points);
        content.put_i32_le(points.len() as i32);
        for &(x, y) in points {
            self.include(x, y);
            content.put_f64_le(x);
            content.put_f64_le(y);
        }
        self.records.push(content);
        self
    }

    /// Adds a polyline record with the given parts.
    pub fn polyline(self, parts: &[Vec<(f64, f64)>]) -> Self {
        self.parts(3, parts)
    }

    /// Adds a polygon record. Rings are written as given, so exteriors must be clockwise.
    /// Adds a polygon record. Exterior rings must be clockwise.
    pub fn polygon(self, rings: &[Vec<(f64, f64)>]) -> Self {
        self.parts(5, rings)
    }

    fn parts(mut self, shape_type: i32, parts: &[Vec<(f64, f64)>]) -> Self {
        let all: Vec<_> = parts.iter().flatten().copied().collect();
        let mut content = vec![];
        content.put_i32_le(shape_type);
        put_bbox(&mut content, &all);
        content.put_i32_le(parts.len() as i32);
        content.put_i32_le(all.len() as i32);

        let mut start = 0;
        for part in parts {
            content.put_i32_le(start);
            start += part.len() as i32;
        }
        for &(x, y) in &all {
            self.include(x, y);
            content.put_f64_le(x);
            content.put_f64_le(y);
        }

        self.records.push(content);
        self
    }

    /// Adds a record with the given content bytes (shape type included).
    /// Adds a record with the given content bytes, shape type included.
    pub fn raw_record(mut self, content: Vec<u8>) -> Self {
        self.records.push(content);
        self
    }

    /// Encodes the `.shp` file.
    pub fn build_shp(&self) -> Vec<u8> {
        let length = HEADER_LEN + self.records.iter().map(|r| r.len() + 8).sum::<usize>();
        let mut data = Vec::with_capacity(length);
        self.put_header(&mut data, length);

        for (i, content) in self.records.iter().enumerate() {
            data.put_i32(i as i32 + 1);
            data.put_i32((content.len() / 2) as i32);
            data.put_slice(content);
        }

        data
    }

    /// Encodes the `.shx` index of the `.shp` file.
    pub fn build_shx(&self) -> Vec<u8> {
        let length = HEADER_LEN + self.records.len() * 8;
        let mut data = Vec::with_capacity(length);
        self.put_header(&mut data, length);

        let mut offset = HEADER_LEN;
        for content in &self.records {
            data.put_i32((offset / 2) as i32);
            data.put_i32((content.len() / 2) as i32);
            offset += content.len() + 8;
        }

        data
    }

    fn put_header(&self, data: &mut Vec<u8>, length: usize) {
        data.put_i32(FILE_CODE);
        data.put_bytes(0, 20);
        data.put_i32((length / 2) as i32);
        data.put_i32_le(1000);
        data.put_i32_le(self.shape_type);
        for v in self.bbox.unwrap_or_default() {
            data.put_f64_le(v);
        }
        // Z and M ranges.
        data.put_bytes(0, 32);
    }
}

fn put_bbox(data: &mut Vec<u8>, points: &[(f64, f64)]) {
    let mut bbox = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
    for &(x, y) in points {
        bbox = [bbox[0].min(x), bbox[1].min(y), bbox[2].max(x), bbox[3].max(y)];
    }
    for v in bbox {
        data.put_f64_le(v);
    }
}

/// Builds `.dbf` files. Values are written left-aligned and space-padded to the field width.
#[derive(Debug, Clone, Default)]
pub struct DbfBuilder {
    fields: Vec<(String, u8, u8, u8)>,
    rows: Vec<Vec<u8>>,
}

impl DbfBuilder {
    /// Creates a builder without fields.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field descriptor.
    pub fn field(mut self, name: &str, field_type: u8, length: u8, decimal_count: u8) -> Self {
        self.fields
            .push((name.to_string(), field_type, length, decimal_count));
        self
    }

    /// Adds a row with one value per field.
    pub fn row(self, values: &[&str]) -> Self {
        self.encoded_row(b' ', values)
    }

    /// Adds a row marked as deleted.
    pub fn deleted_row(self, values: &[&str]) -> Self {
        self.encoded_row(b'*', values)
    }

    fn encoded_row(mut self, flag: u8, values: &[&str]) -> Self {
        let mut record = vec![flag];
        for (i, (_, _, length, _)) in self.fields.iter().enumerate() {
            let length = *length as usize;
            let value = values.get(i).map(|v| v.as_bytes()).unwrap_or_default();
            let value = &value[..value.len().min(length)];
            record.put_slice(value);
            record.put_bytes(b' ', length - value.len());
        }
        self.rows.push(record);
        self
    }

    /// Adds a record from raw bytes, deletion flag included.
    pub fn raw_row(mut self, record: &[u8]) -> Self {
        self.rows.push(record.to_vec());
        self
    }

    /// Encodes the table, terminated by the end-of-file marker.
    pub fn build(&self) -> Vec<u8> {
        let header_len = 32 + self.fields.len() * 32 + 1;
        let record_len = 1 + self.fields.iter().map(|f| f.2 as usize).sum::<usize>();

        let mut data = vec![];
        data.put_u8(0x03);
        data.put_slice(&[124, 1, 1]);
        data.put_u32_le(self.rows.len() as u32);
        data.put_u16_le(header_len as u16);
        data.put_u16_le(record_len as u16);
        data.put_bytes(0, 20);

        for (name, field_type, length, decimal_count) in &self.fields {
            let mut name_bytes = [0u8; 11];
            let name = &name.as_bytes()[..name.len().min(10)];
            name_bytes[..name.len()].copy_from_slice(name);
            data.put_slice(&name_bytes);
            data.put_u8(*field_type);
            data.put_bytes(0, 4);
            data.put_u8(*length);
            data.put_u8(*decimal_count);
            data.put_bytes(0, 14);
        }
        data.put_u8(0x0D);

        for row in &self.rows {
            data.put_slice(row);
        }
        data.put_u8(0x1A);

        data
    }
}
