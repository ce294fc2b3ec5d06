use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::Geometry;

/// Reserved property carrying the fill colour hint (`#rrggbbaa`) of a feature.
pub const FILL_PROPERTY: &str = "__fill";
/// Reserved property carrying the stroke colour hint (`#rrggbbaa`) of a feature.
pub const STROKE_PROPERTY: &str = "__stroke";

/// Attribute value of a feature. Nested structures are not representable by design of the attribute model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// Text value.
    String(String),
    /// Numeric value.
    Number(f64),
    /// Boolean value.
    Bool(bool),
    /// Missing value.
    Null,
}

impl Display for PropertyValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::String(v) => write!(f, "{v}"),
            PropertyValue::Number(v) => write!(f, "{v}"),
            PropertyValue::Bool(v) => write!(f, "{v}"),
            PropertyValue::Null => write!(f, "<NULL>"),
        }
    }
}

impl PropertyValue {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the numeric value, if this is a number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Number(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns true for [`PropertyValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, PropertyValue::Null)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Attribute map of a feature, ordered by key.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A geographic object: geometry plus flat attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    id: u64,
    source_id: Option<String>,
    geometry: Geometry,
    properties: Properties,
}

impl Feature {
    /// Creates a new feature. `id` must be unique within the owning layer.
    pub fn new(id: u64, geometry: Geometry, properties: Properties) -> Self {
        Self {
            id,
            source_id: None,
            geometry,
            properties,
        }
    }

    /// Sets the identifier the feature had in its source document.
    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }

    /// Identifier of the feature in its layer.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Identifier of the feature in its source document, if it had one.
    pub fn source_id(&self) -> Option<&str> {
        self.source_id.as_deref()
    }

    /// Geometry of the feature.
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Mutable access to the geometry of the feature.
    pub fn geometry_mut(&mut self) -> &mut Geometry {
        &mut self.geometry
    }

    /// Replaces the geometry.
    pub fn set_geometry(&mut self, geometry: Geometry) {
        self.geometry = geometry;
    }

    /// Attributes of the feature.
    pub fn properties(&self) -> &Properties {
        &self.properties
    }

    /// Value of a single attribute.
    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
