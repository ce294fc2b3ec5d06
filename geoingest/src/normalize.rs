//! Conversion of layer coordinates into WGS84 longitude/latitude.

use geoingest_types::projection::Projection;
use geoingest_types::{Crs, GeoPoint2d, Point2d};

use crate::error::IngestError;
use crate::layer::{AffineTransform, GisLayer, LayerData, LayerWarning, WarningKind};

type ToWgs84 = dyn Projection<InPoint = GeoPoint2d, OutPoint = Point2d>;

/// Converts the layer into WGS84.
///
/// Unrecognized systems are passed through with an [`WarningKind::UnknownCrs`] warning. Layers without CRS
/// (unreferenced rasters) are left untouched. Polygons of vector layers are oriented with counterclockwise exteriors
/// in all cases. Normalizing a WGS84 layer again changes nothing.
///
/// Fails with [`IngestError::MalformedGeometry`] when a vector layer had features and none of them can be projected.
pub fn normalize(layer: &mut GisLayer) -> Result<(), IngestError> {
    let Some(crs) = layer.crs().cloned() else {
        return Ok(());
    };

    match crs {
        Crs::Wgs84 => {}
        Crs::Unrecognized(description) => {
            layer.add_warning(LayerWarning::new(
                WarningKind::UnknownCrs,
                format!("CRS '{description}' is not recognized, coordinates are left unprojected"),
            ));
        }
        crs => match crs.get_projection() {
            Some(projection) => reproject(layer, &crs, projection.as_ref())?,
            None => layer.add_warning(LayerWarning::new(
                WarningKind::UnknownCrs,
                format!("no transform available for {crs}, coordinates are left unprojected"),
            )),
        },
    }

    if let LayerData::Vector(features) = layer.data_mut() {
        for feature in features.iter_mut() {
            feature.geometry_mut().orient();
        }
    }
    layer.update_bbox();
    Ok(())
}

fn unproject(projection: &ToWgs84, p: &Point2d) -> Option<Point2d> {
    let lonlat = projection.unproject(p)?.to_lonlat();
    lonlat.is_finite().then_some(lonlat)
}

fn reproject(layer: &mut GisLayer, crs: &Crs, projection: &ToWgs84) -> Result<(), IngestError> {
    log::debug!("Projecting layer '{}' from {crs} to WGS 84", layer.name());

    let mut dropped = 0;
    let mut emptied = false;
    let projected = match layer.data_mut() {
        LayerData::Vector(features) => {
            let before = features.len();
            features.retain_mut(|feature| {
                match feature.geometry().map_points(|p| unproject(projection, p)) {
                    Some(geometry) => {
                        feature.set_geometry(geometry);
                        true
                    }
                    None => false,
                }
            });
            dropped = before - features.len();
            emptied = before > 0 && features.is_empty();
            true
        }
        LayerData::Raster(raster) => {
            let [top_left, top_right, _, bottom_left] = raster.transform.corners(raster.width, raster.height);
            match [top_left, top_right, bottom_left].map(|p| unproject(projection, &p)) {
                [Some(tl), Some(tr), Some(bl)] => {
                    raster.transform = AffineTransform::from_corners(tl, tr, bl, raster.width, raster.height);
                    true
                }
                _ => false,
            }
        }
    };

    if emptied {
        return Err(IngestError::MalformedGeometry(format!(
            "none of the {dropped} features of '{}' can be projected from {crs}",
            layer.name()
        )));
    }

    if !projected {
        layer.add_warning(LayerWarning::new(
            WarningKind::UnknownCrs,
            format!("raster corners cannot be projected from {crs}, coordinates are left unprojected"),
        ));
        return Ok(());
    }

    layer.set_crs(Some(Crs::Wgs84));
    if dropped > 0 {
        layer.add_warning(LayerWarning::new(
            WarningKind::MalformedGeometry,
            format!("{dropped} features are outside the valid area of {crs} and were dropped"),
        ));
    }
    Ok(())
}
