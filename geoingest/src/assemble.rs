//! Grouping of shapefile components by base name.

use crate::detect::ShapefilePartKind;
use crate::error::{ErrorKind, ParseError};
use crate::input::RawInput;

/// Sibling shapefile components sharing a base name.
#[derive(Debug, Clone, Default)]
pub(crate) struct ShapefileGroup {
    /// Position of the first component in the batch.
    pub(crate) position: usize,
    pub(crate) shp: Option<RawInput>,
    pub(crate) dbf: Option<RawInput>,
    pub(crate) shx: Option<RawInput>,
    pub(crate) prj: Option<RawInput>,
    pub(crate) cpg: Option<RawInput>,
    /// Name of the first component, used to report errors of groups without `.shp`.
    pub(crate) first_name: String,
}

impl ShapefileGroup {
    fn slot(&mut self, kind: ShapefilePartKind) -> &mut Option<RawInput> {
        match kind {
            ShapefilePartKind::Shp => &mut self.shp,
            ShapefilePartKind::Dbf => &mut self.dbf,
            ShapefilePartKind::Shx => &mut self.shx,
            ShapefilePartKind::Prj => &mut self.prj,
            ShapefilePartKind::Cpg => &mut self.cpg,
        }
    }

    /// Name of the group used in error reports.
    pub(crate) fn name(&self) -> &str {
        self.shp
            .as_ref()
            .map(RawInput::name)
            .unwrap_or(&self.first_name)
    }

    /// Returns an error if the group cannot be decoded.
    pub(crate) fn check_viable(&self) -> Result<(), ParseError> {
        if self.shp.is_some() {
            return Ok(());
        }

        let present: Vec<_> = [&self.dbf, &self.shx, &self.prj, &self.cpg]
            .into_iter()
            .flatten()
            .map(RawInput::file_name)
            .collect();
        Err(ParseError::new(
            &self.first_name,
            ErrorKind::UnsupportedFormat,
            format!(
                "shapefile component without .shp geometry file (found {})",
                present.join(", ")
            ),
        ))
    }
}

/// Groups shapefile components by their case-insensitive name without extension.
///
/// Groups are returned in the order of their first component.
pub(crate) fn group_parts(
    parts: impl IntoIterator<Item = (usize, ShapefilePartKind, RawInput)>,
) -> Vec<ShapefileGroup> {
    let mut keys: Vec<String> = vec![];
    let mut groups: Vec<ShapefileGroup> = vec![];

    for (position, kind, input) in parts {
        let key = base_key(input.name());
        let group = match keys.iter().position(|k| *k == key) {
            Some(i) => &mut groups[i],
            None => {
                keys.push(key);
                groups.push(ShapefileGroup {
                    position,
                    first_name: input.name().to_string(),
                    ..Default::default()
                });
                let last = groups.len() - 1;
                &mut groups[last]
            }
        };

        let slot = group.slot(kind);
        if slot.is_some() {
            log::warn!("Duplicate shapefile component {}, ignoring it", input.name());
        } else {
            *slot = Some(input);
        }
    }

    groups
}

fn base_key(name: &str) -> String {
    let without_ext = match name.rsplit_once('.') {
        Some((base, ext)) if !ext.contains(['/', '\\']) => base,
        _ => name,
    };
    without_ext.to_lowercase()
}
