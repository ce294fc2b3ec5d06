use bytes::Buf;

use crate::error::ShpError;
use crate::header::{ensure, ShpHeader, HEADER_LEN};
use crate::shape::Shape;

const RECORD_HEADER_LEN: usize = 8;

/// Position of a record in the `.shp` file, as stored in `.shx`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLocation {
    /// Byte offset of the record header.
    pub offset: usize,
    /// Length of the record content in bytes.
    pub content_length: usize,
}

/// Reads the record locations from a `.shx` file.
pub fn read_index(shx: &[u8]) -> Result<Vec<RecordLocation>, ShpError> {
    let header = ShpHeader::decode(shx).map_err(|e| ShpError::InvalidIndex(e.to_string()))?;
    let end = header.file_length.clamp(HEADER_LEN, shx.len());

    let mut buf = &shx[HEADER_LEN..end];
    let mut locations = Vec::with_capacity(buf.remaining() / RECORD_HEADER_LEN);
    while buf.remaining() >= RECORD_HEADER_LEN {
        let offset = buf.get_i32();
        let content_length = buf.get_i32();
        if offset < 0 || content_length < 0 {
            return Err(ShpError::InvalidIndex(format!(
                "negative location of record {}",
                locations.len()
            )));
        }

        locations.push(RecordLocation {
            offset: offset as usize * 2,
            content_length: content_length as usize * 2,
        });
    }

    Ok(locations)
}

/// Reader of `.shp` records.
///
/// When a valid `.shx` index is given, records are located through it. Otherwise (or if the index does not match
/// the main file) the records are scanned sequentially, which is always possible because every record starts with
/// its own content length.
#[derive(Debug)]
pub struct ShapeReader<'a> {
    shp: &'a [u8],
    header: ShpHeader,
    data_end: usize,
    index: Option<Vec<RecordLocation>>,
    index_error: Option<ShpError>,
}

/// Single decoded `.shp` record.
#[derive(Debug, Clone, PartialEq)]
pub struct ShpRecord {
    /// Position of the record in the file, starting from 0. This is the row index in the `.dbf` table.
    pub index: usize,
    /// Record number as stored in the file (1-based).
    pub number: i32,
    /// Decoded content.
    pub shape: Shape,
}

impl<'a> ShapeReader<'a> {
    /// Creates a reader, validating `shx` against the main file. An unusable index is replaced by a sequential
    /// scan and reported by [`ShapeReader::index_error`].
    pub fn new(shp: &'a [u8], shx: Option<&[u8]>) -> Result<Self, ShpError> {
        let header = ShpHeader::decode(shp)?;
        let data_end = if header.file_length < HEADER_LEN {
            shp.len()
        } else {
            header.file_length.min(shp.len())
        };

        let (index, index_error) = match shx.map(read_index) {
            Some(Ok(locations)) => match Self::validate_index(&locations, shp.len()) {
                Ok(()) => (Some(locations), None),
                Err(err) => (None, Some(err)),
            },
            Some(Err(err)) => (None, Some(err)),
            None => (None, None),
        };

        if let Some(err) = &index_error {
            log::debug!("Ignoring shapefile index: {err}");
        }

        Ok(Self {
            shp,
            header,
            data_end,
            index,
            index_error,
        })
    }

    fn validate_index(locations: &[RecordLocation], shp_len: usize) -> Result<(), ShpError> {
        for (i, location) in locations.iter().enumerate() {
            let end = location.offset + RECORD_HEADER_LEN + location.content_length;
            if location.offset < HEADER_LEN || end > shp_len {
                return Err(ShpError::InvalidIndex(format!(
                    "record {i} at bytes {}..{end} is outside of the .shp file ({shp_len} bytes)",
                    location.offset
                )));
            }
        }

        Ok(())
    }

    /// Main file header.
    pub fn header(&self) -> &ShpHeader {
        &self.header
    }

    /// True if records are located with the `.shx` index.
    pub fn uses_index(&self) -> bool {
        self.index.is_some()
    }

    /// The reason the given `.shx` file was not used, if it was given but rejected.
    pub fn index_error(&self) -> Option<&ShpError> {
        self.index_error.as_ref()
    }

    /// Number of records declared by the index. `None` when scanning sequentially.
    pub fn indexed_len(&self) -> Option<usize> {
        self.index.as_ref().map(Vec::len)
    }

    /// Iterates over the records in file order.
    pub fn records(&self) -> Records<'_, 'a> {
        Records {
            reader: self,
            record_index: 0,
            offset: HEADER_LEN,
            finished: false,
        }
    }

    fn read_record_at(&self, offset: usize, index: usize) -> Result<(ShpRecord, usize), ShpError> {
        let mut buf = self.shp.get(offset..self.data_end.max(offset)).unwrap_or_default();
        ensure(&buf, RECORD_HEADER_LEN, "record header")?;
        let number = buf.get_i32();
        let content_length = buf.get_i32();
        let content_length = usize::try_from(content_length).map_err(|_| ShpError::InvalidRecord {
            index,
            message: format!("negative content length {content_length}"),
        })? * 2;

        ensure(&buf, content_length, "record content")?;
        let shape = Shape::decode(&buf[..content_length], index)?;

        Ok((
            ShpRecord {
                index,
                number,
                shape,
            },
            offset + RECORD_HEADER_LEN + content_length,
        ))
    }
}

/// Iterator over the records of a [`ShapeReader`]. Produces exactly one item per record.
pub struct Records<'r, 'a> {
    reader: &'r ShapeReader<'a>,
    record_index: usize,
    offset: usize,
    finished: bool,
}

impl Iterator for Records<'_, '_> {
    type Item = Result<ShpRecord, ShpError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let index = self.record_index;
        self.record_index += 1;

        if let Some(locations) = &self.reader.index {
            let location = locations.get(index)?;
            return Some(self.reader.read_record_at(location.offset, index).map(|(r, _)| r));
        }

        if self.offset >= self.reader.data_end {
            return None;
        }

        match self.reader.read_record_at(self.offset, index) {
            Ok((record, next_offset)) => {
                self.offset = next_offset;
                Some(Ok(record))
            }
            Err(err) => {
                // Record boundaries are only known from the record header, so a truncated record cannot be
                // skipped. Anything else still tells us where the next record starts.
                match self.skip_record() {
                    Some(next_offset) if !err.is_truncation() => self.offset = next_offset,
                    _ => self.finished = true,
                }
                Some(Err(err))
            }
        }
    }
}

impl Records<'_, '_> {
    fn skip_record(&self) -> Option<usize> {
        let mut buf = self.reader.shp.get(self.offset..self.reader.data_end)?;
        if buf.remaining() < RECORD_HEADER_LEN {
            return None;
        }
        buf.advance(4);
        let content_length = usize::try_from(buf.get_i32()).ok()? * 2;
        Some(self.offset + RECORD_HEADER_LEN + content_length)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::fixtures::ShapefileBuilder;
    use crate::header::ShapeType;
    use geoingest_types::Point2d;

    fn points(count: usize) -> ShapefileBuilder {
        (0..count).fold(ShapefileBuilder::new(1), |b, i| {
            b.point(i as f64, i as f64 * 2.0)
        })
    }

    #[test]
    fn reads_with_index() {
        let builder = points(3);
        let shp = builder.build_shp();
        let shx = builder.build_shx();

        let reader = ShapeReader::new(&shp, Some(&shx)).unwrap();
        assert!(reader.uses_index());
        assert_eq!(reader.indexed_len(), Some(3));
        assert_eq!(reader.header().shape_type, ShapeType::Point);

        let records: Vec<_> = reader.records().collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 3);
        assert_eq!(records[2].number, 3);
        assert_eq!(records[2].shape, Shape::Point(Point2d::new(2.0, 4.0)));
    }

    #[test]
    fn sequential_scan_without_index() {
        let shp = points(4).build_shp();
        let reader = ShapeReader::new(&shp, None).unwrap();
        assert!(!reader.uses_index());
        assert!(reader.index_error().is_none());
        assert_eq!(reader.records().count(), 4);
    }

    #[test]
    fn mismatched_index_falls_back_to_scan() {
        let shp = points(2).build_shp();
        let shx = points(5).build_shx();

        let reader = ShapeReader::new(&shp, Some(&shx)).unwrap();
        assert!(!reader.uses_index());
        assert_matches!(reader.index_error(), Some(ShpError::InvalidIndex(_)));
        assert_eq!(reader.records().filter(Result::is_ok).count(), 2);
    }

    #[test]
    fn truncated_file_stops_scan() {
        let mut shp = points(3).build_shp();
        shp.truncate(shp.len() - 4);

        let reader = ShapeReader::new(&shp, None).unwrap();
        let records: Vec<_> = reader.records().collect();
        assert_eq!(records.len(), 3);
        assert!(records[..2].iter().all(Result::is_ok));
        assert_matches!(&records[2], Err(e) if e.is_truncation());
    }

    #[test]
    fn invalid_record_is_skipped() {
        let shp = ShapefileBuilder::new(1)
            .point(1.0, 1.0)
            .raw_record(42i32.to_le_bytes().to_vec())
            .point(3.0, 3.0)
            .build_shp();

        let reader = ShapeReader::new(&shp, None).unwrap();
        let records: Vec<_> = reader.records().collect();
        assert_eq!(records.len(), 3);
        assert_matches!(records[1], Err(ShpError::UnsupportedShapeType(42)));
        assert_matches!(&records[2], Ok(ShpRecord { index: 2, .. }));
    }

    #[test]
    fn invalid_file_code() {
        let mut shp = points(1).build_shp();
        shp[3] = 0;
        assert_matches!(
            ShapeReader::new(&shp, None),
            Err(ShpError::InvalidFileCode(_))
        );
    }
}
