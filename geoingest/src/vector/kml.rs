//! KML documents: placemarks, their styles and ground overlays.

use std::collections::HashMap;

use geoingest_types::geojson::collapse_by_family;
use geoingest_types::{Crs, Geometry, Point2d, Polygon, Properties, PropertyValue, Ring, FILL_PROPERTY, STROKE_PROPERTY};
use roxmltree::{Document, Node, ParsingOptions};

use crate::context::DecodeContext;
use crate::error::IngestError;
use crate::input::RawInput;
use crate::layer::{AffineTransform, GisLayer, LayerWarning, WarningKind};
use crate::vector::FeatureCollector;

const CHECKPOINT_INTERVAL: usize = 256;

/// Colour hints of a style.
#[derive(Debug, Clone, Default, PartialEq)]
struct Style {
    fill: Option<String>,
    stroke: Option<String>,
    no_fill: bool,
}

impl Style {
    fn merge(&self, other: &Style) -> Style {
        Style {
            fill: other.fill.clone().or_else(|| self.fill.clone()),
            stroke: other.stroke.clone().or_else(|| self.stroke.clone()),
            no_fill: self.no_fill || other.no_fill,
        }
    }

    fn apply(&self, properties: &mut Properties) {
        if let Some(stroke) = &self.stroke {
            properties.insert(STROKE_PROPERTY.to_string(), stroke.clone().into());
        }
        if let Some(fill) = self.fill.as_ref().filter(|_| !self.no_fill) {
            properties.insert(FILL_PROPERTY.to_string(), fill.clone().into());
        }
    }
}

/// Geographic extent of a ground overlay image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LatLonBox {
    pub(crate) north: f64,
    pub(crate) south: f64,
    pub(crate) east: f64,
    pub(crate) west: f64,
    /// Counterclockwise rotation around the box centre, in degrees.
    pub(crate) rotation: f64,
}

impl LatLonBox {
    /// Pixel-to-lon/lat transform of a `width` x `height` image stretched over the box.
    pub(crate) fn transform(&self, width: u32, height: u32) -> AffineTransform {
        let centre = Point2d::new((self.west + self.east) / 2.0, (self.north + self.south) / 2.0);
        let (sin, cos) = self.rotation.to_radians().sin_cos();
        let rotate = |x: f64, y: f64| {
            let (dx, dy) = (x - centre.x(), y - centre.y());
            Point2d::new(centre.x() + dx * cos - dy * sin, centre.y() + dx * sin + dy * cos)
        };

        AffineTransform::from_corners(
            rotate(self.west, self.north),
            rotate(self.east, self.north),
            rotate(self.west, self.south),
            width,
            height,
        )
    }
}

/// `<GroundOverlay>` element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct GroundOverlay {
    pub(crate) name: Option<String>,
    pub(crate) href: String,
    pub(crate) bounds: Option<LatLonBox>,
}

/// Content of a KML document.
#[derive(Debug)]
pub(crate) struct KmlDocument {
    pub(crate) collector: FeatureCollector,
    pub(crate) overlays: Vec<GroundOverlay>,
}

impl KmlDocument {
    /// Builds the vector layer of the document.
    pub(crate) fn into_layer(
        self,
        name: &str,
        warnings: Vec<LayerWarning>,
    ) -> Result<GisLayer, IngestError> {
        let (features, warning) = self.collector.finish()?;
        Ok(GisLayer::vector(name, features, Crs::Wgs84)
            .with_warnings(warnings)
            .with_warnings(warning))
    }
}

/// Decodes a standalone KML file. Ground overlay images cannot be resolved outside an archive.
pub(crate) fn decode(input: &RawInput, ctx: &DecodeContext) -> Result<GisLayer, IngestError> {
    let text = decode_text(input.bytes())?;
    let document = parse(&text, ctx)?;

    let warnings = document
        .overlays
        .iter()
        .map(|overlay| {
            LayerWarning::new(
                WarningKind::MissingSidecar,
                format!("ground overlay image '{}' is not part of the batch", overlay.href),
            )
        })
        .collect();

    document.into_layer(input.stem(), warnings)
}

pub(crate) fn decode_text(bytes: &[u8]) -> Result<String, IngestError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| IngestError::Io(format!("KML document is not valid UTF-8: {err}")))?;
    Ok(text.trim_start_matches('\u{feff}').to_string())
}

pub(crate) fn parse(text: &str, ctx: &DecodeContext) -> Result<KmlDocument, IngestError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..Default::default()
    };
    let document = Document::parse_with_options(text, options)?;
    let root = document.root_element();
    if root.tag_name().name() != "kml" {
        return Err(IngestError::UnsupportedFormat(format!(
            "root element is <{}>, not <kml>",
            root.tag_name().name()
        )));
    }

    let styles = collect_styles(root);
    let mut collector = FeatureCollector::new();
    let mut overlays = vec![];

    for (i, node) in root.descendants().filter(|n| n.is_element()).enumerate() {
        if i % CHECKPOINT_INTERVAL == 0 {
            ctx.checkpoint()?;
        }

        match node.tag_name().name() {
            "Placemark" => add_placemark(&mut collector, node, &styles),
            "GroundOverlay" => {
                if let Some(overlay) = parse_overlay(node) {
                    overlays.push(overlay);
                }
            }
            _ => {}
        }
    }

    Ok(KmlDocument {
        collector,
        overlays,
    })
}

fn add_placemark(collector: &mut FeatureCollector, node: Node, styles: &HashMap<String, Style>) {
    let name = child_text(node, "name");
    let label = name.clone().unwrap_or_else(|| format!("#{}", collector.len()));

    let Some(geometry_node) = node.children().find(|c| is_geometry(c)) else {
        return collector.reject(format!("placemark '{label}' has no supported geometry"));
    };

    let geometries = match parse_geometry(geometry_node) {
        Ok(geometries) if !geometries.is_empty() => geometries,
        Ok(_) => return collector.reject(format!("placemark '{label}' has an empty geometry")),
        Err(err) => return collector.reject(format!("placemark '{label}': {err}")),
    };

    let mut properties = Properties::new();
    if let Some(name) = name {
        properties.insert("name".into(), name.into());
    }
    if let Some(description) = child_text(node, "description") {
        properties.insert("description".into(), description.into());
    }
    if let Some(extended) = child(node, "ExtendedData") {
        extended_data(extended, &mut properties);
    }

    let mut style = child_text(node, "styleUrl")
        .and_then(|url| styles.get(style_id(&url)).cloned())
        .unwrap_or_default();
    if let Some(inline) = child(node, "Style") {
        style = style.merge(&parse_style(inline));
    }
    style.apply(&mut properties);

    let source_id = node.attribute("id");
    collector.push_all(geometries, properties, source_id);
}

fn extended_data(node: Node, properties: &mut Properties) {
    for data in children(node, "Data") {
        if let Some(key) = data.attribute("name") {
            let value = child_text(data, "value").map(PropertyValue::String).unwrap_or(PropertyValue::Null);
            properties.insert(key.to_string(), value);
        }
    }

    for schema_data in children(node, "SchemaData") {
        for simple in children(schema_data, "SimpleData") {
            if let Some(key) = simple.attribute("name") {
                properties.insert(key.to_string(), PropertyValue::String(text_of(simple)));
            }
        }
    }
}

fn is_geometry(node: &Node) -> bool {
    node.is_element()
        && matches!(
            node.tag_name().name(),
            "Point" | "LineString" | "LinearRing" | "Polygon" | "MultiGeometry"
        )
}

fn parse_geometry(node: Node) -> Result<Vec<Geometry>, String> {
    let geometry = match node.tag_name().name() {
        "Point" => {
            let points = coordinates(node)?;
            let point = points.first().ok_or("point without coordinates")?;
            Geometry::Point(*point)
        }
        "LineString" => {
            let points = coordinates(node)?;
            if points.len() < 2 {
                return Err(format!("line string with {} positions", points.len()));
            }
            Geometry::LineString(points)
        }
        "LinearRing" => Geometry::Polygon(Polygon::new(ring(node)?, vec![])),
        "Polygon" => {
            let outer = child(node, "outerBoundaryIs")
                .and_then(|b| child(b, "LinearRing"))
                .ok_or("polygon without outer boundary")?;
            let holes = children(node, "innerBoundaryIs")
                .flat_map(|b| children(b, "LinearRing"))
                .map(ring)
                .collect::<Result<_, _>>()?;
            Geometry::Polygon(Polygon::new(ring(outer)?, holes))
        }
        "MultiGeometry" => {
            let mut members = vec![];
            for member in node.children().filter(is_geometry) {
                members.extend(parse_geometry(member)?);
            }
            return Ok(collapse_by_family(members));
        }
        other => return Err(format!("unsupported geometry <{other}>")),
    };

    Ok(vec![geometry])
}

fn ring(node: Node) -> Result<Ring, String> {
    Ring::new(coordinates(node)?).map_err(|err| err.to_string())
}

/// Parses `lon,lat[,alt]` tuples separated by whitespace. Altitude is discarded.
fn coordinates(node: Node) -> Result<Vec<Point2d>, String> {
    let text = child(node, "coordinates")
        .map(text_of)
        .ok_or_else(|| format!("<{}> without coordinates", node.tag_name().name()))?;

    text.split_whitespace()
        .map(|tuple| {
            let mut values = tuple.split(',').map(str::parse::<f64>);
            match (values.next(), values.next()) {
                (Some(Ok(lon)), Some(Ok(lat))) if lon.is_finite() && lat.is_finite() => {
                    Ok(Point2d::new(lon, lat))
                }
                _ => Err(format!("invalid coordinate tuple '{tuple}'")),
            }
        })
        .collect()
}

fn collect_styles(root: Node) -> HashMap<String, Style> {
    let mut styles: HashMap<String, Style> = root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Style")
        .filter_map(|n| Some((n.attribute("id")?.to_string(), parse_style(n))))
        .collect();

    let style_maps: Vec<_> = root
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "StyleMap")
        .filter_map(|n| Some((n.attribute("id")?.to_string(), n)))
        .collect();

    for (id, node) in style_maps {
        let normal = children(node, "Pair").find(|pair| child_text(*pair, "key").as_deref() == Some("normal"));
        let Some(pair) = normal else {
            continue;
        };

        let style = match child(pair, "Style") {
            Some(inline) => Some(parse_style(inline)),
            None => child_text(pair, "styleUrl").and_then(|url| styles.get(style_id(&url)).cloned()),
        };
        if let Some(style) = style {
            styles.insert(id, style);
        }
    }

    styles
}

fn parse_style(node: Node) -> Style {
    let stroke = child(node, "LineStyle")
        .and_then(|s| child_text(s, "color"))
        .and_then(|c| kml_color(&c));
    let poly = child(node, "PolyStyle");
    let fill = poly
        .and_then(|s| child_text(s, "color"))
        .and_then(|c| kml_color(&c));
    let no_fill = poly
        .and_then(|s| child_text(s, "fill"))
        .is_some_and(|f| f == "0" || f.eq_ignore_ascii_case("false"));

    Style {
        fill,
        stroke,
        no_fill,
    }
}

fn style_id(url: &str) -> &str {
    url.rsplit_once('#').map(|(_, id)| id).unwrap_or(url)
}

/// Converts KML `aabbggrr` colour into `#rrggbbaa`.
fn kml_color(value: &str) -> Option<String> {
    let value = value.trim().trim_start_matches('#');
    if value.len() != 8 || !value.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let value = value.to_ascii_lowercase();
    let (a, b, g, r) = (&value[0..2], &value[2..4], &value[4..6], &value[6..8]);
    Some(format!("#{r}{g}{b}{a}"))
}

fn parse_overlay(node: Node) -> Option<GroundOverlay> {
    let href = child(node, "Icon").and_then(|icon| child_text(icon, "href"))?;
    let bounds = child(node, "LatLonBox").and_then(|b| {
        let value = |name: &str| child_text(b, name).and_then(|v| v.parse::<f64>().ok());
        Some(LatLonBox {
            north: value("north")?,
            south: value("south")?,
            east: value("east")?,
            west: value("west")?,
            rotation: value("rotation").unwrap_or(0.0),
        })
    });

    Some(GroundOverlay {
        name: child_text(node, "name"),
        href,
        bounds,
    })
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == name)
}

fn children<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    name: &'static str,
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.children()
        .filter(move |c| c.is_element() && c.tag_name().name() == name)
}

fn text_of(node: Node) -> String {
    node.descendants()
        .filter(|d| d.is_text())
        .filter_map(|d| d.text())
        .collect::<String>()
        .trim()
        .to_string()
}

fn child_text(node: Node, name: &str) -> Option<String> {
    child(node, name).map(text_of).filter(|t| !t.is_empty())
}
