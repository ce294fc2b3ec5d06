use geoingest_shp::{DbfTable, Encoding, ShapeReader};
use geoingest_types::{Crs, Properties};

use crate::assemble::ShapefileGroup;
use crate::context::DecodeContext;
use crate::error::IngestError;
use crate::layer::{GisLayer, LayerWarning, WarningKind};
use crate::vector::FeatureCollector;

const CHECKPOINT_INTERVAL: usize = 1024;

pub(crate) fn decode(group: &ShapefileGroup, ctx: &DecodeContext) -> Result<GisLayer, IngestError> {
    let shp = group.shp.as_ref().ok_or_else(|| {
        IngestError::UnsupportedFormat(format!("no .shp file for {}", group.name()))
    })?;

    let mut warnings = vec![];
    if let Some(warning) = missing_sidecars(group) {
        warnings.push(warning);
    }

    let reader = ShapeReader::new(shp.bytes(), group.shx.as_ref().map(|shx| &shx.bytes()[..]))?;
    if let Some(err) = reader.index_error() {
        warnings.push(LayerWarning::new(
            WarningKind::MissingSidecar,
            format!(".shx index is unusable ({err}), records were read sequentially"),
        ));
    }

    let dbf = group.dbf.as_ref().and_then(|dbf| {
        let encoding = group
            .cpg
            .as_ref()
            .map(|cpg| Encoding::from_cpg(cpg.bytes()))
            .unwrap_or_default();
        match DbfTable::decode(dbf.bytes(), encoding) {
            Ok(table) => Some(table),
            Err(err) => {
                warnings.push(LayerWarning::new(
                    WarningKind::MissingSidecar,
                    format!(".dbf table is unreadable ({err}), attributes are empty"),
                ));
                None
            }
        }
    });

    let crs = resolve_crs(group, &reader);
    log::debug!("Shapefile {} uses CRS {crs}", shp.name());

    let mut collector = FeatureCollector::new();
    let mut record_count = 0;
    for (index, record) in reader.records().enumerate() {
        if index % CHECKPOINT_INTERVAL == 0 {
            ctx.checkpoint()?;
        }
        record_count += 1;

        let geometry = match record.and_then(|r| r.shape.into_geometry(index)) {
            Ok(Some(geometry)) => geometry,
            Ok(None) => {
                collector.reject(format!("record {index} has a null shape"));
                continue;
            }
            Err(err) => {
                collector.reject(err);
                continue;
            }
        };

        let properties = dbf
            .as_ref()
            .map(|table| row_properties(table, index))
            .unwrap_or_default();
        collector.push(geometry, properties, None);
    }

    if let Some(table) = &dbf {
        if table.len() != record_count {
            warnings.push(LayerWarning::new(
                WarningKind::MalformedGeometry,
                format!(
                    ".shp has {record_count} records but .dbf has {} rows; unmatched records have empty attributes",
                    table.len()
                ),
            ));
        }
    }

    let (features, warning) = collector.finish()?;
    Ok(GisLayer::vector(shp.stem(), features, crs)
        .with_warnings(warnings)
        .with_warnings(warning))
}

/// One warning naming every absent `.dbf`/`.shx` sidecar of the group.
fn missing_sidecars(group: &ShapefileGroup) -> Option<LayerWarning> {
    let mut missing = vec![];
    let mut effects = vec![];
    if group.dbf.is_none() {
        missing.push(".dbf");
        effects.push("attributes are empty");
    }
    if group.shx.is_none() {
        missing.push(".shx");
        effects.push("records were read sequentially");
    }
    if missing.is_empty() {
        return None;
    }

    log::debug!("Shapefile {} is missing {}", group.name(), missing.join(" and "));
    let verb = if missing.len() == 1 { "is" } else { "are" };
    Some(LayerWarning::new(
        WarningKind::MissingSidecar,
        format!("{} {verb} missing, {}", missing.join(" and "), effects.join(", ")),
    ))
}

fn row_properties(table: &DbfTable, index: usize) -> Properties {
    let Some(row) = table.row(index) else {
        return Properties::new();
    };

    table
        .fields()
        .iter()
        .zip(row)
        .map(|(field, value)| (field.name.clone(), value.clone()))
        .collect()
}

/// CRS from the `.prj` sidecar. Without one, data within the longitude/latitude range is taken as WGS84.
fn resolve_crs(group: &ShapefileGroup, reader: &ShapeReader) -> Crs {
    if let Some(prj) = &group.prj {
        return Crs::from_wkt(&String::from_utf8_lossy(prj.bytes()));
    }

    if reader.header().bbox.is_geographic_range() {
        log::debug!(
            "No .prj for {}, data extent fits longitude/latitude, assuming WGS84",
            group.name()
        );
        Crs::Wgs84
    } else {
        Crs::Unrecognized("no .prj sidecar".into())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use geoingest_shp::fixtures::{DbfBuilder, ShapefileBuilder};
    use geoingest_types::{Geometry, PropertyValue};

    use super::*;
    use crate::input::RawInput;

    fn parcels(count: usize) -> ShapefileBuilder {
        (0..count).fold(ShapefileBuilder::new(1), |b, i| {
            b.point(10.0 + i as f64 * 0.1, 50.0)
        })
    }

    fn dbf(count: usize) -> Vec<u8> {
        (0..count)
            .fold(DbfBuilder::new().field("LOT", b'N', 4, 0), |b, i| {
                b.row(&[i.to_string().as_str()])
            })
            .build()
    }

    fn group(shp: &ShapefileBuilder, dbf: Option<Vec<u8>>, shx: bool, prj: Option<&str>) -> ShapefileGroup {
        ShapefileGroup {
            shp: Some(RawInput::new("parcels.shp", shp.build_shp())),
            dbf: dbf.map(|d| RawInput::new("parcels.dbf", d)),
            shx: shx.then(|| RawInput::new("parcels.shx", shp.build_shx())),
            prj: prj.map(|p| RawInput::new("parcels.prj", p.as_bytes().to_vec())),
            first_name: "parcels.shp".into(),
            ..Default::default()
        }
    }

    #[test]
    fn full_group() {
        let layer = decode(&group(&parcels(10), Some(dbf(10)), true, None), &DecodeContext::default()).unwrap();
        assert_eq!(layer.name(), "parcels");
        assert!(layer.warnings().is_empty());
        assert_eq!(layer.crs(), Some(&Crs::Wgs84));

        let features = layer.features().unwrap();
        assert_eq!(features.len(), 10);
        assert_eq!(features[3].property("LOT"), Some(&PropertyValue::Number(3.0)));
        assert_matches!(features[3].geometry(), Geometry::Point(_));
    }

    #[test]
    fn missing_dbf() {
        let layer = decode(&group(&parcels(4), None, true, None), &DecodeContext::default()).unwrap();
        let features = layer.features().unwrap();
        assert_eq!(features.len(), 4);
        assert!(features.iter().all(|f| f.properties().is_empty()));
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::MissingSidecar);
        assert_eq!(layer.warnings()[0].message, ".dbf is missing, attributes are empty");
    }

    #[test]
    fn missing_shx() {
        let layer = decode(&group(&parcels(4), Some(dbf(4)), false, None), &DecodeContext::default()).unwrap();
        assert_eq!(layer.features().unwrap().len(), 4);
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::MissingSidecar);
        assert!(layer.warnings()[0].message.contains(".shx"));
        assert!(!layer.warnings()[0].message.contains(".dbf"));
    }

    #[test]
    fn missing_dbf_and_shx_warn_once() {
        let layer = decode(&group(&parcels(4), None, false, None), &DecodeContext::default()).unwrap();
        assert_eq!(layer.features().unwrap().len(), 4);
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::MissingSidecar);
        assert!(layer.warnings()[0].message.starts_with(".dbf and .shx are missing"));
    }

    #[test]
    fn row_count_mismatch() {
        let layer = decode(&group(&parcels(3), Some(dbf(2)), true, None), &DecodeContext::default()).unwrap();
        let features = layer.features().unwrap();
        assert_eq!(features.len(), 3);
        assert!(features[2].properties().is_empty());
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::MalformedGeometry);
    }

    #[test]
    fn prj_selects_crs() {
        let builder = ShapefileBuilder::new(1).point(500000.0, 5500000.0);
        let prj = r#"PROJCS["WGS 84 / UTM zone 33N",GEOGCS["WGS 84",DATUM["WGS_1984"]],AUTHORITY["EPSG","32633"]]"#;
        let layer = decode(&group(&builder, Some(dbf(1)), true, Some(prj)), &DecodeContext::default()).unwrap();
        assert_eq!(layer.crs(), Some(&Crs::Utm { zone: 33, south: false }));
    }

    #[test]
    fn projected_data_without_prj() {
        let builder = ShapefileBuilder::new(1).point(500000.0, 5500000.0);
        let layer = decode(&group(&builder, Some(dbf(1)), true, None), &DecodeContext::default()).unwrap();
        assert_matches!(layer.crs(), Some(Crs::Unrecognized(_)));
    }

    #[test]
    fn null_shapes_keep_row_positions() {
        let builder = ShapefileBuilder::new(1).point(1.0, 1.0).null().point(2.0, 2.0);
        let layer = decode(&group(&builder, Some(dbf(3)), true, None), &DecodeContext::default()).unwrap();
        let features = layer.features().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[1].property("LOT"), Some(&PropertyValue::Number(2.0)));
        assert_eq!(layer.warnings().len(), 1);
        assert_eq!(layer.warnings()[0].kind, WarningKind::MalformedGeometry);
    }

    #[test]
    fn corrupt_shp() {
        let mut shp = group(&parcels(1), None, false, None);
        shp.shp = Some(RawInput::new("parcels.shp", vec![0; 20]));
        assert_matches!(decode(&shp, &DecodeContext::default()), Err(IngestError::Shapefile(_)));
    }
}
