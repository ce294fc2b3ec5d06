use bytes::Buf;
use geoingest_types::PropertyValue;

use crate::cpg::Encoding;
use crate::error::ShpError;

const FILE_HEADER_LEN: usize = 32;
const FIELD_DESCRIPTOR_LEN: usize = 32;
const HEADER_TERMINATOR: u8 = 0x0D;
const DELETED_FLAG: u8 = b'*';

/// Type of a `.dbf` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// `C`, text.
    Character,
    /// `N`, number stored as text.
    Numeric,
    /// `F`, number stored as text.
    Float,
    /// `L`, boolean.
    Logical,
    /// `D`, `YYYYMMDD` date.
    Date,
    /// `I`, little endian 32-bit integer.
    Integer,
    /// `O`, little endian 64-bit float.
    Double,
    /// Any other type code. Decoded as text.
    Other(u8),
}

impl FieldType {
    fn from_code(code: u8) -> Self {
        match code {
            b'C' => FieldType::Character,
            b'N' => FieldType::Numeric,
            b'F' => FieldType::Float,
            b'L' => FieldType::Logical,
            b'D' => FieldType::Date,
            b'I' => FieldType::Integer,
            b'O' => FieldType::Double,
            other => FieldType::Other(other),
        }
    }
}

/// Column descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfField {
    /// Column name.
    pub name: String,
    /// Type of the values.
    pub field_type: FieldType,
    /// Width of the column in bytes.
    pub length: usize,
    /// Digits after the decimal point of numeric columns.
    pub decimal_count: u8,
}

/// Decoded attribute table.
#[derive(Debug, Clone, PartialEq)]
pub struct DbfTable {
    fields: Vec<DbfField>,
    rows: Vec<Vec<PropertyValue>>,
    declared_rows: usize,
    truncated: bool,
}

impl DbfTable {
    /// Decodes a `.dbf` file. Character fields are decoded with `encoding`.
    ///
    /// Deleted rows keep their position with null values. A file ending early keeps the rows read so far.
    pub fn decode(data: &[u8], encoding: Encoding) -> Result<Self, ShpError> {
        let mut buf = data;
        if buf.remaining() < FILE_HEADER_LEN {
            return Err(ShpError::InvalidDbf(format!(
                "file is {} bytes, header needs {FILE_HEADER_LEN}",
                data.len()
            )));
        }

        buf.advance(4);
        let declared_rows = buf.get_u32_le() as usize;
        let header_len = buf.get_u16_le() as usize;
        let record_len = buf.get_u16_le() as usize;
        buf.advance(20);

        if header_len < FILE_HEADER_LEN + 1 || header_len > data.len() {
            return Err(ShpError::InvalidDbf(format!(
                "header length {header_len} does not fit the file"
            )));
        }

        let fields = Self::decode_fields(&data[FILE_HEADER_LEN..header_len], encoding)?;
        let fields_len: usize = fields.iter().map(|f| f.length).sum();
        if record_len < fields_len + 1 {
            return Err(ShpError::InvalidDbf(format!(
                "record length {record_len} is smaller than the sum of field lengths {}",
                fields_len + 1
            )));
        }

        let mut records = &data[header_len..];
        let mut rows = Vec::with_capacity(declared_rows.min(records.len() / record_len.max(1)));
        let mut truncated = false;
        for _ in 0..declared_rows {
            if records.remaining() < record_len {
                truncated = true;
                break;
            }

            let (record, rest) = records.split_at(record_len);
            records = rest;
            rows.push(Self::decode_row(record, &fields, encoding));
        }

        if truncated {
            log::debug!(
                "DBF table declares {declared_rows} rows, only {} are present",
                rows.len()
            );
        }

        Ok(Self {
            fields,
            rows,
            declared_rows,
            truncated,
        })
    }

    fn decode_fields(mut buf: &[u8], encoding: Encoding) -> Result<Vec<DbfField>, ShpError> {
        let mut fields = vec![];
        while buf.first().is_some_and(|&b| b != HEADER_TERMINATOR) {
            if buf.remaining() < FIELD_DESCRIPTOR_LEN {
                return Err(ShpError::InvalidDbf(format!(
                    "field descriptor {} is incomplete",
                    fields.len()
                )));
            }

            let (descriptor, rest) = buf.split_at(FIELD_DESCRIPTOR_LEN);
            buf = rest;

            let name_bytes = &descriptor[..11];
            let name_len = name_bytes.iter().position(|&b| b == 0).unwrap_or(11);
            let name = encoding.decode(&name_bytes[..name_len]).trim().to_string();

            fields.push(DbfField {
                name,
                field_type: FieldType::from_code(descriptor[11]),
                length: descriptor[16] as usize,
                decimal_count: descriptor[17],
            });
        }

        Ok(fields)
    }

    fn decode_row(record: &[u8], fields: &[DbfField], encoding: Encoding) -> Vec<PropertyValue> {
        if record[0] == DELETED_FLAG {
            return vec![PropertyValue::Null; fields.len()];
        }

        let mut offset = 1;
        fields
            .iter()
            .map(|field| {
                let raw = &record[offset..offset + field.length];
                offset += field.length;
                decode_value(raw, field, encoding)
            })
            .collect()
    }

    /// Column descriptors.
    pub fn fields(&self) -> &[DbfField] {
        &self.fields
    }

    /// Rows present in the file, in file order.
    pub fn rows(&self) -> &[Vec<PropertyValue>] {
        &self.rows
    }

    /// Values of the row at `index`, in column order.
    pub fn row(&self, index: usize) -> Option<&[PropertyValue]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Number of rows present.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of rows the header declares. Differs from [`DbfTable::len`] only for truncated files.
    pub fn declared_len(&self) -> usize {
        self.declared_rows
    }

    /// True if the file ends before the declared number of rows.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }
}

fn decode_value(raw: &[u8], field: &DbfField, encoding: Encoding) -> PropertyValue {
    match field.field_type {
        FieldType::Integer if raw.len() == 4 => {
            let mut buf = raw;
            PropertyValue::Number(buf.get_i32_le() as f64)
        }
        FieldType::Double if raw.len() == 8 => {
            let mut buf = raw;
            PropertyValue::Number(buf.get_f64_le())
        }
        FieldType::Numeric | FieldType::Float => {
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            if text.is_empty() || text.bytes().all(|b| b == b'*') {
                PropertyValue::Null
            } else {
                text.parse::<f64>()
                    .map(PropertyValue::Number)
                    .unwrap_or(PropertyValue::Null)
            }
        }
        FieldType::Logical => match raw.first() {
            Some(b'T' | b't' | b'Y' | b'y') => PropertyValue::Bool(true),
            Some(b'F' | b'f' | b'N' | b'n') => PropertyValue::Bool(false),
            _ => PropertyValue::Null,
        },
        FieldType::Date => {
            let text = String::from_utf8_lossy(raw);
            let text = text.trim();
            if text.len() == 8 && text.bytes().all(|b| b.is_ascii_digit()) {
                PropertyValue::String(format!("{}-{}-{}", &text[..4], &text[4..6], &text[6..]))
            } else {
                PropertyValue::Null
            }
        }
        _ => {
            let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
            PropertyValue::String(encoding.decode(&raw[..end]).trim_end().to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::fixtures::DbfBuilder;

    #[test]
    fn decodes_typed_columns() {
        let data = DbfBuilder::new()
            .field("NAME", b'C', 10, 0)
            .field("AREA", b'N', 8, 2)
            .field("ACTIVE", b'L', 1, 0)
            .field("SURVEYED", b'D', 8, 0)
            .row(&["Lot 1", "12.50", "T", "19350712"])
            .row(&["", "", "?", ""])
            .build();

        let table = DbfTable::decode(&data, Encoding::Auto).unwrap();
        assert_eq!(table.fields().len(), 4);
        assert_eq!(table.fields()[1].name, "AREA");
        assert_eq!(table.len(), 2);
        assert_eq!(
            table.row(0).unwrap(),
            &[
                PropertyValue::String("Lot 1".into()),
                PropertyValue::Number(12.5),
                PropertyValue::Bool(true),
                PropertyValue::String("1935-07-12".into()),
            ]
        );
        assert_eq!(
            table.row(1).unwrap(),
            &[
                PropertyValue::String(String::new()),
                PropertyValue::Null,
                PropertyValue::Null,
                PropertyValue::Null,
            ]
        );
    }

    #[test]
    fn deleted_rows_keep_their_slot() {
        let data = DbfBuilder::new()
            .field("ID", b'N', 4, 0)
            .row(&["1"])
            .deleted_row(&["2"])
            .row(&["3"])
            .build();

        let table = DbfTable::decode(&data, Encoding::Auto).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.row(1).unwrap(), &[PropertyValue::Null]);
        assert_eq!(table.row(2).unwrap(), &[PropertyValue::Number(3.0)]);
    }

    #[test]
    fn latin1_text() {
        let data = DbfBuilder::new()
            .field("CITY", b'C', 8, 0)
            .raw_row(b" Z\xfcrich  ")
            .build();

        let table = DbfTable::decode(&data, Encoding::Latin1).unwrap();
        assert_eq!(table.row(0).unwrap(), &[PropertyValue::String("Zürich".into())]);
    }

    #[test]
    fn truncated_rows_are_dropped() {
        let mut data = DbfBuilder::new()
            .field("ID", b'N', 4, 0)
            .row(&["1"])
            .row(&["2"])
            .build();
        // Remove the end-of-file marker and half of the last row.
        data.truncate(data.len() - 3);

        let table = DbfTable::decode(&data, Encoding::Auto).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.declared_len(), 2);
        assert!(table.is_truncated());
    }

    #[test]
    fn short_header() {
        assert_matches!(
            DbfTable::decode(&[3, 0, 0], Encoding::Auto),
            Err(ShpError::InvalidDbf(_))
        );
    }
}
