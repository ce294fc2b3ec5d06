//! Decoder for ESRI Shapefiles.
//!
//! A shapefile is a set of sibling files sharing a base name:
//! * `.shp` with the geometry records ([`ShapeReader`]),
//! * `.shx` with the byte offsets of the records (optional, see [`read_index`]),
//! * `.dbf` with one attribute row per record ([`DbfTable`]),
//! * `.cpg` naming the text encoding of the `.dbf` ([`Encoding`]).
//!
//! Records of the `.shp` file are joined to the `.dbf` rows by position.

mod cpg;
mod dbf;
mod error;
mod header;
mod reader;
mod shape;

#[cfg(any(test, feature = "_tests"))]
pub mod fixtures;

pub use cpg::Encoding;
pub use dbf::{DbfField, DbfTable, FieldType};
pub use error::ShpError;
pub use header::{ShapeType, ShpHeader};
pub use reader::{read_index, RecordLocation, Records, ShapeReader, ShpRecord};
pub use shape::Shape;
