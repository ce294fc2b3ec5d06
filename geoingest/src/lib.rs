//! Geoingest turns a batch of user supplied geospatial files into a uniform set of layers referenced to WGS84.
//!
//! # Quick start
//!
//! ```no_run
//! use geoingest::RawInput;
//!
//! let inputs = vec![
//!     RawInput::new("regions.geojson", std::fs::read("regions.geojson").unwrap()),
//!     RawInput::new("parcels.shp", std::fs::read("parcels.shp").unwrap()),
//!     RawInput::new("parcels.dbf", std::fs::read("parcels.dbf").unwrap()),
//! ];
//!
//! let output = geoingest::parse_files_blocking(inputs).unwrap();
//! for layer in &output.layers {
//!     println!("{}: {:?} {:?}", layer.id(), layer.kind(), layer.bbox());
//! }
//! for error in &output.errors {
//!     println!("skipped {error}");
//! }
//! ```
//!
//! # How a batch is processed
//!
//! * The format of every input is [detected](detect()) from its extension, declared media type or leading bytes.
//! * Shapefile components sharing a base name (`parcels.shp`, `parcels.dbf`, `parcels.prj`...) are assembled into a
//!   single unit.
//! * KMZ and zip archives are extracted in memory. Entries of a zip archive are processed like top-level inputs.
//! * Each unit is decoded on the blocking thread pool into a [`GisLayer`]: vector features with properties, or a
//!   raster with its pixel-to-map transform.
//! * Every layer is [normalized](normalize()): coordinates are reprojected to WGS84, polygon rings are oriented and
//!   the bounding box is computed.
//!
//! A file that cannot be decoded never fails the batch. It is reported as a [`ParseError`] next to the layers of the
//! other files. Problems that do not prevent building a layer are attached to it as [`LayerWarning`]s.
//!
//! Use [`Ingestor`] to configure the batch with [`IngestOptions`] or to cancel it.

pub use geoingest_types;

mod archive;
mod assemble;
mod batch;
mod context;
pub mod decoded_image;
mod detect;
pub mod error;
mod input;
pub mod layer;
mod normalize;
mod options;
mod raster;
mod vector;

#[cfg(test)]
mod test_utils;

pub use batch::{parse_files, parse_files_blocking, Ingestor, ParseOutput};
pub use decoded_image::DecodedImage;
pub use detect::{detect, sniff, DetectedFormat, ShapefilePartKind};
pub use error::{BatchError, ErrorKind, IngestError, ParseError};
pub use input::RawInput;
pub use layer::{AffineTransform, GisLayer, LayerData, LayerKind, LayerWarning, RasterLayer, WarningKind};
pub use normalize::normalize;
pub use options::IngestOptions;
pub use tokio_util::sync::CancellationToken;
