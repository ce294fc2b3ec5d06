//! Coordinate reference systems known to the normalizer.
//!
//! The set of supported systems is deliberately small: geographic WGS84, Web Mercator and the WGS84 UTM zones.
//! Everything else is kept as [`Crs::Unrecognized`] with a description of where it came from, so that the data can
//! still be passed through unprojected.

use std::fmt::{Display, Formatter};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::projection::{IdentityProjection, Projection, WebMercator};
use crate::{GeoPoint2d, Point2d};

/// Coordinate reference system of a layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Crs {
    /// Geographic longitude/latitude on WGS84 (EPSG:4326, OGC:CRS84).
    Wgs84,
    /// Spherical ("pseudo") Mercator (EPSG:3857).
    WebMercator,
    /// Universal Transverse Mercator on WGS84 (EPSG:326xx and EPSG:327xx).
    Utm {
        /// Zone number, 1 to 60.
        zone: u8,
        /// Southern hemisphere (false northing of 10 000 km).
        south: bool,
    },
    /// A system with no transform available. Contains a human readable description.
    Unrecognized(String),
}

impl Crs {
    /// Resolves an EPSG code.
    pub fn from_epsg(code: u32) -> Self {
        match code {
            4326 => Crs::Wgs84,
            3857 | 3785 | 900913 | 102100 | 102113 => Crs::WebMercator,
            32601..=32660 => Crs::Utm {
                zone: (code - 32600) as u8,
                south: false,
            },
            32701..=32760 => Crs::Utm {
                zone: (code - 32700) as u8,
                south: true,
            },
            _ => Crs::Unrecognized(format!("EPSG:{code}")),
        }
    }

    /// Resolves a textual CRS identifier.
    ///
    /// Accepts `EPSG:4326`, OGC URNs (`urn:ogc:def:crs:EPSG::3857`, `urn:ogc:def:crs:OGC:1.3:CRS84`) and OGC
    /// definition URLs (`http://www.opengis.net/def/crs/EPSG/0/32633`).
    pub fn from_identifier(identifier: &str) -> Self {
        let trimmed = identifier.trim();
        let upper = trimmed.to_ascii_uppercase();
        if upper.ends_with("CRS84") || upper.ends_with("CRS:84") {
            return Crs::Wgs84;
        }

        if upper.contains("EPSG") {
            let code = upper
                .rsplit(|c: char| !c.is_ascii_digit())
                .find(|part| !part.is_empty());
            if let Some(code) = code.and_then(|c| c.parse::<u32>().ok()) {
                return Self::from_epsg(code);
            }
        }

        Crs::Unrecognized(trimmed.to_owned())
    }

    /// Resolves a well-known-text definition, as found in `.prj` files.
    pub fn from_wkt(wkt: &str) -> Self {
        let upper = wkt.trim().trim_start_matches('\u{feff}').to_ascii_uppercase();

        if let Some(code) = root_authority(&upper) {
            let crs = Self::from_epsg(code);
            if crs.is_recognized() {
                return crs;
            }
        }

        let is_wgs84 = upper.contains("WGS_1984") || upper.contains("WGS 84") || upper.contains("WGS84");
        let is_projected = upper.starts_with("PROJCS") || upper.starts_with("PROJCRS");
        if is_projected {
            const MERCATOR_NAMES: [&str; 6] = [
                "WEB_MERCATOR",
                "WEB MERCATOR",
                "PSEUDO-MERCATOR",
                "PSEUDO_MERCATOR",
                "POPULAR_VISUALISATION",
                "MERCATOR_AUXILIARY_SPHERE",
            ];
            if MERCATOR_NAMES.iter().any(|name| upper.contains(name)) {
                return Crs::WebMercator;
            }

            if is_wgs84 {
                if let Some((zone, south)) = utm_zone(&upper) {
                    return Crs::Utm { zone, south };
                }
            }
        } else if (upper.starts_with("GEOGCS") || upper.starts_with("GEOGCRS") || upper.starts_with("GEODCRS"))
            && is_wgs84
        {
            return Crs::Wgs84;
        }

        let name = wkt
            .split('"')
            .nth(1)
            .filter(|name| !name.is_empty())
            .unwrap_or("unnamed WKT definition");
        Crs::Unrecognized(name.to_owned())
    }

    /// Returns true if a transform to WGS84 is available for this system.
    pub fn is_recognized(&self) -> bool {
        !matches!(self, Crs::Unrecognized(_))
    }

    /// EPSG code of the system, if it has one.
    pub fn epsg(&self) -> Option<u32> {
        match self {
            Crs::Wgs84 => Some(4326),
            Crs::WebMercator => Some(3857),
            Crs::Utm { zone, south: false } => Some(32600 + *zone as u32),
            Crs::Utm { zone, south: true } => Some(32700 + *zone as u32),
            Crs::Unrecognized(_) => None,
        }
    }

    /// Returns projection between geographic WGS84 coordinates and this system, if available.
    pub fn get_projection(&self) -> Option<Box<dyn Projection<InPoint = GeoPoint2d, OutPoint = Point2d>>> {
        match self {
            Crs::Wgs84 => Some(Box::new(IdentityProjection)),
            Crs::WebMercator => Some(Box::new(WebMercator::default())),
            #[cfg(feature = "geodesy")]
            Crs::Utm { zone, south } => crate::projection::GeodesyProjection::utm(*zone, *south)
                .map(|p| Box::new(p) as Box<dyn Projection<InPoint = GeoPoint2d, OutPoint = Point2d>>),
            _ => None,
        }
    }
}

impl Display for Crs {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Crs::Wgs84 => write!(f, "WGS 84"),
            Crs::WebMercator => write!(f, "WGS 84 / Pseudo-Mercator"),
            Crs::Utm { zone, south } => {
                write!(f, "WGS 84 / UTM zone {zone}{}", if *south { "S" } else { "N" })
            }
            Crs::Unrecognized(description) => write!(f, "unrecognized ({description})"),
        }
    }
}

/// Zone and hemisphere of a `UTM zone NN[N|S]` projection name.
fn utm_zone(upper_wkt: &str) -> Option<(u8, bool)> {
    static UTM: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = UTM
        .get_or_init(|| Regex::new(r"UTM[_ ]ZONE[_ ](\d{1,2})\s*([NS])?").ok())
        .as_ref()?;

    let captures = regex.captures(upper_wkt)?;
    let zone = captures[1].parse::<u8>().ok().filter(|zone| (1..=60).contains(zone))?;
    let south = captures.get(2).is_some_and(|m| m.as_str() == "S");
    Some((zone, south))
}

fn root_authority(upper_wkt: &str) -> Option<u32> {
    static AUTHORITY: OnceLock<Option<Regex>> = OnceLock::new();
    let regex = AUTHORITY
        .get_or_init(|| Regex::new(r#"(?:AUTHORITY|ID)\[\s*"EPSG"\s*,\s*"?(\d+)"?\s*\]\s*\]\s*$"#).ok())
        .as_ref()?;

    regex.captures(upper_wkt)?[1].parse().ok()
}
