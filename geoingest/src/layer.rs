//! Layers produced by the ingestion: the output of a batch.

use std::fmt::{Display, Formatter};

use geoingest_types::geojson::feature_to_geojson;
use geoingest_types::{BoundingBox, Crs, Feature, Point2d};

use crate::decoded_image::DecodedImage;

/// Category of a non-fatal problem attached to a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WarningKind {
    /// A shapefile sidecar (`.dbf`, `.shx`, `.prj`) is absent or unusable.
    MissingSidecar,
    /// Some geometries or attribute rows were dropped.
    MalformedGeometry,
    /// Coordinate system has no transform; coordinates are left unprojected.
    UnknownCrs,
    /// Raster has no georeferencing.
    UnreferencedRaster,
    /// Part of an archive could not be read.
    CorruptArchive,
    /// Pixel data could not be decoded.
    PixelData,
}

/// A non-fatal problem found while building a layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerWarning {
    /// Category of the warning.
    pub kind: WarningKind,
    /// Human readable description.
    pub message: String,
}

impl LayerWarning {
    /// Creates a new warning.
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl Display for LayerWarning {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Pixel-to-world transform with GDAL coefficient order.
///
/// `x = c[0] + c[1] * col + c[2] * row`, `y = c[3] + c[4] * col + c[5] * row`, where `(col, row)` is measured from
/// the top-left corner of the top-left pixel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineTransform([f64; 6]);

impl AffineTransform {
    /// Transform mapping pixel coordinates onto themselves.
    pub const IDENTITY: Self = Self([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Creates a transform from its coefficients.
    pub fn new(coefficients: [f64; 6]) -> Self {
        Self(coefficients)
    }

    /// Transform of a north-up raster whose top-left corner is at `origin`.
    pub fn north_up(origin: Point2d, pixel_width: f64, pixel_height: f64) -> Self {
        Self([origin.x(), pixel_width, 0.0, origin.y(), 0.0, -pixel_height])
    }

    /// Fits the transform from the world positions of the top-left, top-right and bottom-left corners of a
    /// `width` x `height` raster.
    pub fn from_corners(
        top_left: Point2d,
        top_right: Point2d,
        bottom_left: Point2d,
        width: u32,
        height: u32,
    ) -> Self {
        let width = f64::from(width.max(1));
        let height = f64::from(height.max(1));
        Self([
            top_left.x(),
            (top_right.x() - top_left.x()) / width,
            (bottom_left.x() - top_left.x()) / height,
            top_left.y(),
            (top_right.y() - top_left.y()) / width,
            (bottom_left.y() - top_left.y()) / height,
        ])
    }

    /// Coefficients in GDAL order.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// Returns true for the identity transform.
    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }

    /// World position of a pixel-space point.
    pub fn apply(&self, col: f64, row: f64) -> Point2d {
        let [a, b, c, d, e, f] = self.0;
        Point2d::new(a + b * col + c * row, d + e * col + f * row)
    }

    /// World positions of the four raster corners: top-left, top-right, bottom-right, bottom-left.
    pub fn corners(&self, width: u32, height: u32) -> [Point2d; 4] {
        let (w, h) = (f64::from(width), f64::from(height));
        [
            self.apply(0.0, 0.0),
            self.apply(w, 0.0),
            self.apply(w, h),
            self.apply(0.0, h),
        ]
    }

    /// Moves the origin by the given number of pixels.
    pub fn shift_pixels(&self, d_col: f64, d_row: f64) -> Self {
        let origin = self.apply(d_col, d_row);
        let [_, b, c, _, e, f] = self.0;
        Self([origin.x(), b, c, origin.y(), e, f])
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Raster grid with its georeferencing.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterLayer {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Number of samples per pixel in the source file.
    pub bands: u16,
    /// Pixel-to-world transform. Identity for unreferenced rasters.
    pub transform: AffineTransform,
    /// Coordinate system of the source file. `None` for unreferenced rasters.
    pub source_crs: Option<Crs>,
    /// Decoded pixel buffer. `None` when pixel decoding is disabled or failed.
    pub pixels: Option<DecodedImage>,
}

impl RasterLayer {
    /// Creates an unreferenced raster from a decoded image.
    pub fn unreferenced(image: DecodedImage, bands: u16) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            bands,
            transform: AffineTransform::IDENTITY,
            source_crs: None,
            pixels: Some(image),
        }
    }

    /// Returns true if the raster has a pixel-to-world mapping.
    pub fn is_referenced(&self) -> bool {
        self.source_crs.is_some()
    }
}

/// Content of a layer.
#[derive(Debug, Clone, PartialEq)]
pub enum LayerData {
    /// Feature set.
    Vector(Vec<Feature>),
    /// Raster grid.
    Raster(RasterLayer),
}

/// Kind of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerKind {
    /// Feature set.
    Vector,
    /// Raster grid.
    Raster,
}

/// A normalized layer, ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct GisLayer {
    id: String,
    name: String,
    data: LayerData,
    crs: Option<Crs>,
    bbox: Option<BoundingBox>,
    warnings: Vec<LayerWarning>,
}

impl GisLayer {
    pub(crate) fn vector(name: impl Into<String>, features: Vec<Feature>, crs: Crs) -> Self {
        Self::new(name.into(), LayerData::Vector(features), Some(crs))
    }

    pub(crate) fn raster(name: impl Into<String>, raster: RasterLayer) -> Self {
        let crs = raster.source_crs.clone();
        Self::new(name.into(), LayerData::Raster(raster), crs)
    }

    fn new(name: String, data: LayerData, crs: Option<Crs>) -> Self {
        let mut layer = Self {
            id: String::new(),
            name,
            data,
            crs,
            bbox: None,
            warnings: vec![],
        };
        layer.update_bbox();
        layer
    }

    /// Identifier of the layer, unique within the batch.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Human readable name, derived from the source file name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Kind of the layer.
    pub fn kind(&self) -> LayerKind {
        match self.data {
            LayerData::Vector(_) => LayerKind::Vector,
            LayerData::Raster(_) => LayerKind::Raster,
        }
    }

    /// Content of the layer.
    pub fn data(&self) -> &LayerData {
        &self.data
    }

    /// Features of a vector layer.
    pub fn features(&self) -> Option<&[Feature]> {
        match &self.data {
            LayerData::Vector(features) => Some(features),
            LayerData::Raster(_) => None,
        }
    }

    /// Raster of a raster layer.
    pub fn raster_data(&self) -> Option<&RasterLayer> {
        match &self.data {
            LayerData::Raster(raster) => Some(raster),
            LayerData::Vector(_) => None,
        }
    }

    /// Coordinate system of the layer coordinates. [`Crs::Wgs84`] after successful normalization, the source system
    /// if it was not recognized, `None` for unreferenced rasters.
    pub fn crs(&self) -> Option<&Crs> {
        self.crs.as_ref()
    }

    /// Bounding box of the layer in its coordinate system.
    pub fn bbox(&self) -> Option<BoundingBox> {
        self.bbox
    }

    /// Non-fatal problems found while building the layer.
    pub fn warnings(&self) -> &[LayerWarning] {
        &self.warnings
    }

    pub(crate) fn set_id(&mut self, id: String) {
        self.id = id;
    }

    pub(crate) fn set_crs(&mut self, crs: Option<Crs>) {
        self.crs = crs;
    }

    pub(crate) fn data_mut(&mut self) -> &mut LayerData {
        &mut self.data
    }

    pub(crate) fn with_warnings(mut self, warnings: impl IntoIterator<Item = LayerWarning>) -> Self {
        for warning in warnings {
            self.add_warning(warning);
        }
        self
    }

    pub(crate) fn add_warning(&mut self, warning: LayerWarning) {
        log::warn!("Layer '{}': {}", self.name, warning);
        self.warnings.push(warning);
    }

    pub(crate) fn update_bbox(&mut self) {
        self.bbox = match &self.data {
            LayerData::Vector(features) => features
                .iter()
                .filter_map(|f| BoundingBox::from_points(f.geometry().iter_points()))
                .reduce(|acc, b| acc.merge(b)),
            LayerData::Raster(raster) if raster.is_referenced() => {
                BoundingBox::from_points(raster.transform.corners(raster.width, raster.height).iter())
            }
            LayerData::Raster(_) => None,
        };
    }

    /// Encodes a vector layer as a GeoJSON feature collection. Returns `None` for raster layers.
    pub fn to_geojson(&self) -> Option<geojson::FeatureCollection> {
        let features = self.features()?;
        Some(geojson::FeatureCollection {
            bbox: None,
            features: features.iter().map(feature_to_geojson).collect(),
            foreign_members: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geoingest_types::{Geometry, Properties};

    use super::*;

    #[test]
    fn affine_corners() {
        let transform = AffineTransform::north_up(Point2d::new(10.0, 50.0), 0.5, 0.25);
        let [tl, tr, br, bl] = transform.corners(4, 8);
        assert_eq!(tl, Point2d::new(10.0, 50.0));
        assert_eq!(tr, Point2d::new(12.0, 50.0));
        assert_eq!(br, Point2d::new(12.0, 48.0));
        assert_eq!(bl, Point2d::new(10.0, 48.0));

        let fitted = AffineTransform::from_corners(tl, tr, bl, 4, 8);
        for (a, b) in fitted.coefficients().iter().zip(transform.coefficients()) {
            assert_relative_eq!(*a, b);
        }
    }

    #[test]
    fn shift_by_half_pixel() {
        let transform = AffineTransform::north_up(Point2d::new(0.0, 0.0), 2.0, 2.0).shift_pixels(-0.5, -0.5);
        assert_eq!(transform.apply(0.0, 0.0), Point2d::new(-1.0, 1.0));
        assert!(!transform.is_identity());
        assert!(AffineTransform::default().is_identity());
    }

    #[test]
    fn vector_layer_bbox_and_export() {
        let features = vec![
            Feature::new(0, Geometry::Point(Point2d::new(1.0, 2.0)), Properties::new()),
            Feature::new(1, Geometry::Point(Point2d::new(-3.0, 5.0)), Properties::new()),
        ];
        let layer = GisLayer::vector("points", features, Crs::Wgs84);
        assert_eq!(layer.kind(), LayerKind::Vector);
        assert_eq!(layer.bbox(), Some(BoundingBox::new(-3.0, 2.0, 1.0, 5.0)));

        let collection = layer.to_geojson().unwrap();
        assert_eq!(collection.features.len(), 2);
    }

    #[test]
    fn unreferenced_raster_has_no_bbox() {
        let raster = RasterLayer {
            width: 2,
            height: 2,
            bands: 1,
            transform: AffineTransform::IDENTITY,
            source_crs: None,
            pixels: None,
        };
        let layer = GisLayer::raster("scan", raster);
        assert_eq!(layer.kind(), LayerKind::Raster);
        assert_eq!(layer.bbox(), None);
        assert_eq!(layer.crs(), None);
        assert!(layer.to_geojson().is_none());
    }
}
