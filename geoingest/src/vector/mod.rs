//! Decoders of vector formats.

use std::fmt::Display;

use geoingest_types::{Feature, Geometry, Properties};

use crate::error::IngestError;
use crate::layer::{LayerWarning, WarningKind};

pub(crate) mod geojson;
pub(crate) mod kml;
pub(crate) mod shapefile;

const MAX_REPORTED_REJECTIONS: usize = 3;

/// Accumulates the features of one layer, assigning sequential ids and keeping track of rejected features.
#[derive(Debug, Default)]
pub(crate) struct FeatureCollector {
    features: Vec<Feature>,
    rejected: usize,
    reasons: Vec<String>,
}

impl FeatureCollector {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, geometry: Geometry, properties: Properties, source_id: Option<&str>) {
        let mut feature = Feature::new(self.features.len() as u64, geometry, properties);
        if let Some(source_id) = source_id {
            feature = feature.with_source_id(source_id);
        }
        self.features.push(feature);
    }

    /// Pushes one feature per geometry, all sharing the same properties.
    pub(crate) fn push_all(&mut self, geometries: Vec<Geometry>, properties: Properties, source_id: Option<&str>) {
        let mut geometries = geometries.into_iter().peekable();
        while let Some(geometry) = geometries.next() {
            if geometries.peek().is_some() {
                self.push(geometry, properties.clone(), source_id);
            } else {
                self.push(geometry, properties, source_id);
                break;
            }
        }
    }

    pub(crate) fn reject(&mut self, reason: impl Display) {
        self.rejected += 1;
        if self.reasons.len() < MAX_REPORTED_REJECTIONS {
            self.reasons.push(reason.to_string());
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns the collected features and a warning describing the rejected ones.
    ///
    /// Fails if every feature was rejected.
    pub(crate) fn finish(self) -> Result<(Vec<Feature>, Option<LayerWarning>), IngestError> {
        if self.rejected == 0 {
            return Ok((self.features, None));
        }

        let mut message = format!("{} features skipped: {}", self.rejected, self.reasons.join("; "));
        if self.rejected > self.reasons.len() {
            message.push_str("; ...");
        }

        if self.features.is_empty() {
            return Err(IngestError::MalformedGeometry(message));
        }

        Ok((
            self.features,
            Some(LayerWarning::new(WarningKind::MalformedGeometry, message)),
        ))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use geoingest_types::Point2d;

    use super::*;

    #[test]
    fn ids_are_sequential() {
        let mut collector = FeatureCollector::new();
        let point = Geometry::Point(Point2d::new(0.0, 0.0));
        collector.push(point.clone(), Properties::new(), None);
        collector.push_all(vec![point.clone(), point], Properties::new(), Some("a"));

        let (features, warning) = collector.finish().unwrap();
        assert!(warning.is_none());
        let ids: Vec<_> = features.iter().map(Feature::id).collect();
        assert_eq!(ids, vec![0, 1, 2]);
        assert_eq!(features[2].source_id(), Some("a"));
    }

    #[test]
    fn rejections() {
        let mut collector = FeatureCollector::new();
        collector.reject("bad ring");
        assert_matches!(collector.finish(), Err(IngestError::MalformedGeometry(_)));

        let mut collector = FeatureCollector::new();
        collector.push(Geometry::Point(Point2d::new(0.0, 0.0)), Properties::new(), None);
        for _ in 0..5 {
            collector.reject("bad ring");
        }
        let (features, warning) = collector.finish().unwrap();
        assert_eq!(features.len(), 1);
        let warning = warning.unwrap();
        assert_eq!(warning.kind, WarningKind::MalformedGeometry);
        assert!(warning.message.starts_with("5 features skipped"));
    }
}
