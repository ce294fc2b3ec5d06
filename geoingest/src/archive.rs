//! Extraction of zip based inputs: KMZ documents and generic zip archives.

use std::collections::HashSet;
use std::io::{Cursor, Read};

use zip::ZipArchive;

use crate::batch::{plan, run_task, TaskOutcome};
use crate::context::DecodeContext;
use crate::decoded_image::DecodedImage;
use crate::detect::{detect, DetectedFormat};
use crate::error::{ErrorKind, IngestError, ParseError};
use crate::input::RawInput;
use crate::layer::{GisLayer, LayerWarning, RasterLayer, WarningKind};
use crate::normalize::normalize;
use crate::raster;
use crate::vector::kml::{self, GroundOverlay};

const MAX_PREALLOCATION: u64 = 64 * 1024 * 1024;

/// File extracted from an archive.
#[derive(Debug, Clone)]
pub(crate) struct ArchiveEntry {
    /// Path inside the archive, with `/` separators.
    pub(crate) path: String,
    /// Entry content, named `archive/path`.
    pub(crate) input: RawInput,
}

/// Readable entries of an archive and the errors of the unreadable ones.
#[derive(Debug, Default)]
pub(crate) struct Extracted {
    pub(crate) entries: Vec<ArchiveEntry>,
    pub(crate) errors: Vec<ParseError>,
}

/// Reads every file entry of a zip archive.
///
/// Fails if the central directory cannot be read or the archive has more entries than allowed. Unreadable entries
/// are reported in [`Extracted::errors`].
pub(crate) fn extract(input: &RawInput, ctx: &DecodeContext) -> Result<Extracted, IngestError> {
    let mut archive = ZipArchive::new(Cursor::new(input.bytes().clone()))?;
    let max_entries = ctx.options().max_archive_entries;
    if archive.len() > max_entries {
        return Err(IngestError::CorruptArchive(format!(
            "archive has {} entries, at most {max_entries} are accepted",
            archive.len()
        )));
    }

    let mut extracted = Extracted::default();
    for i in 0..archive.len() {
        ctx.checkpoint()?;

        let mut file = match archive.by_index(i) {
            Ok(file) => file,
            Err(err) => {
                extracted.errors.push(ParseError::new(
                    format!("{}/#{i}", input.name()),
                    ErrorKind::CorruptArchive,
                    format!("entry {i} is unreadable: {err}"),
                ));
                continue;
            }
        };

        if file.is_dir() {
            continue;
        }

        let path = file.name().replace('\\', "/").trim_start_matches('/').to_string();
        if path.starts_with("__MACOSX/") || path.split('/').any(|part| part == "..") {
            log::debug!("Skipping archive entry {path}");
            continue;
        }

        let name = format!("{}/{path}", input.name());
        let mut content = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
        if let Err(err) = file.read_to_end(&mut content) {
            extracted.errors.push(ParseError::new(
                name,
                ErrorKind::CorruptArchive,
                format!("entry is unreadable: {err}"),
            ));
            continue;
        }

        extracted.entries.push(ArchiveEntry {
            path,
            input: RawInput::new(name, content),
        });
    }

    log::debug!(
        "Extracted {} entries from {} ({} unreadable)",
        extracted.entries.len(),
        input.name(),
        extracted.errors.len()
    );
    Ok(extracted)
}

/// Decodes every entry of a generic zip archive like a top-level input. Nested archives are not expanded.
pub(crate) fn decode_zip(input: &RawInput, ctx: &DecodeContext) -> Result<TaskOutcome, IngestError> {
    let extracted = extract(input, ctx)?;
    if extracted.entries.is_empty() && extracted.errors.is_empty() {
        return Err(IngestError::CorruptArchive("archive contains no files".into()));
    }

    let mut outcome = TaskOutcome {
        layers: vec![],
        errors: extracted.errors,
    };
    for (_, task) in plan(extracted.entries.into_iter().map(|entry| entry.input)) {
        ctx.checkpoint()?;
        outcome.extend(run_task(task, ctx, true));
    }

    Ok(outcome)
}

/// Decodes a KMZ: its main KML document, ground overlay images and any other embedded image.
pub(crate) fn decode_kmz(input: &RawInput, ctx: &DecodeContext) -> Result<TaskOutcome, IngestError> {
    let extracted = extract(input, ctx)?;
    let mut outcome = TaskOutcome::default();

    let (kml_entry, images): (Option<&ArchiveEntry>, Vec<&ArchiveEntry>) = {
        let kml = main_document(&extracted.entries);
        let images = extracted
            .entries
            .iter()
            .filter(|e| {
                matches!(
                    detect(&e.input),
                    DetectedFormat::RasterImage | DetectedFormat::GeoTiff
                )
            })
            .collect();
        (kml, images)
    };

    let mut used_images = HashSet::new();
    match kml_entry {
        Some(entry) => {
            let result = decode_document(input, entry, &images, &mut used_images, ctx);
            match result {
                Ok(layers) => outcome.layers.extend(layers),
                Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
                Err(err) => outcome
                    .errors
                    .push(ParseError::from_error(entry.input.name(), &err)),
            }
        }
        None if images.is_empty() => {
            return Err(IngestError::CorruptArchive(
                "KMZ archive has no KML document".into(),
            ))
        }
        None => outcome.errors.push(ParseError::new(
            input.name(),
            ErrorKind::CorruptArchive,
            "KMZ archive has no KML document",
        )),
    }

    for image in images.iter().filter(|i| !used_images.contains(&i.path)) {
        ctx.checkpoint()?;
        let result = match detect(&image.input) {
            DetectedFormat::GeoTiff => raster::geotiff::decode(&image.input, ctx),
            _ => raster::image_file::decode(&image.input, ctx),
        };
        match result {
            Ok(layer) => outcome.layers.push(layer),
            Err(IngestError::Cancelled) => return Err(IngestError::Cancelled),
            Err(err) => outcome
                .errors
                .push(ParseError::from_error(image.input.name(), &err)),
        }
    }

    if let Some(first) = extracted.errors.first() {
        let message = match extracted.errors.len() {
            1 => first.message.clone(),
            n => format!("{n} entries are unreadable, first: {} ({})", first.input, first.message),
        };
        for layer in &mut outcome.layers {
            layer.add_warning(LayerWarning::new(
                WarningKind::CorruptArchive,
                format!("layer was salvaged from a damaged archive: {message}"),
            ));
        }
        outcome
            .errors
            .insert(0, ParseError::new(input.name(), ErrorKind::CorruptArchive, message));
    }

    let mut layers = Vec::with_capacity(outcome.layers.len());
    for mut layer in std::mem::take(&mut outcome.layers) {
        match normalize(&mut layer) {
            Ok(()) => layers.push(layer),
            Err(error) => {
                log::warn!("Excluding layer '{}' of {}: {error}", layer.name(), input.name());
                outcome.errors.push(ParseError::from_error(
                    format!("{}/{}", input.name(), layer.name()),
                    &error,
                ));
            }
        }
    }
    outcome.layers = layers;

    Ok(outcome)
}

/// The KML document of a KMZ: `doc.kml` if present, else the first top-level KML, else the first KML at any depth.
fn main_document(entries: &[ArchiveEntry]) -> Option<&ArchiveEntry> {
    let kml_entries: Vec<_> = entries
        .iter()
        .filter(|e| detect(&e.input) == DetectedFormat::Kml)
        .collect();

    kml_entries
        .iter()
        .find(|e| e.path.eq_ignore_ascii_case("doc.kml"))
        .or_else(|| kml_entries.iter().find(|e| !e.path.contains('/')))
        .or_else(|| kml_entries.first())
        .copied()
}

fn decode_document(
    kmz: &RawInput,
    entry: &ArchiveEntry,
    images: &[&ArchiveEntry],
    used_images: &mut HashSet<String>,
    ctx: &DecodeContext,
) -> Result<Vec<GisLayer>, IngestError> {
    let text = kml::decode_text(entry.input.bytes())?;
    let document = kml::parse(&text, ctx)?;
    let base_dir = entry.path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");

    let mut layers = vec![];
    let mut warnings = vec![];
    for overlay in &document.overlays {
        let image = resolve_href(base_dir, &overlay.href)
            .and_then(|path| images.iter().find(|i| i.path.eq_ignore_ascii_case(&path)));
        let Some(image) = image else {
            warnings.push(LayerWarning::new(
                WarningKind::MissingSidecar,
                format!("ground overlay image '{}' is not in the archive", overlay.href),
            ));
            continue;
        };

        ctx.checkpoint()?;
        match overlay_layer(overlay, &image.input, ctx) {
            Ok(layer) => {
                used_images.insert(image.path.clone());
                layers.push(layer);
            }
            Err(err) => warnings.push(LayerWarning::new(
                WarningKind::PixelData,
                format!("ground overlay image '{}' cannot be decoded: {err}", overlay.href),
            )),
        }
    }

    let has_overlays = !layers.is_empty();
    if document.collector.len() > 0 || !has_overlays {
        layers.insert(0, document.into_layer(kmz.stem(), warnings)?);
    } else if let Some(first) = layers.first_mut() {
        for warning in warnings {
            first.add_warning(warning);
        }
    }

    Ok(layers)
}

fn overlay_layer(overlay: &GroundOverlay, image: &RawInput, ctx: &DecodeContext) -> Result<GisLayer, IngestError> {
    let bytes = image.bytes();
    let format = image::guess_format(bytes)?;
    let info = raster::read_info(bytes, format)?;
    let pixels = if ctx.options().decode_pixels {
        Some(DecodedImage::decode(bytes, Some(format))?)
    } else {
        None
    };

    let mut raster = RasterLayer {
        width: info.width,
        height: info.height,
        bands: info.bands,
        transform: Default::default(),
        source_crs: None,
        pixels,
    };

    let name = overlay.name.clone().unwrap_or_else(|| image.stem().to_string());
    match overlay.bounds {
        Some(bounds) => {
            raster.transform = bounds.transform(info.width, info.height);
            raster.source_crs = Some(geoingest_types::Crs::Wgs84);
            Ok(GisLayer::raster(name, raster))
        }
        None => Ok(GisLayer::raster(name, raster).with_warnings([LayerWarning::new(
            WarningKind::UnreferencedRaster,
            "ground overlay has no LatLonBox",
        )])),
    }
}

/// Resolves a KML `href` against the directory of the KML document. External URLs do not resolve.
fn resolve_href(base_dir: &str, href: &str) -> Option<String> {
    let href = href.trim();
    if href.contains("://") || href.is_empty() {
        return None;
    }

    let (start, href) = match href.strip_prefix('/') {
        Some(absolute) => ("", absolute),
        None => (base_dir, href),
    };

    let mut parts: Vec<&str> = start.split('/').filter(|p| !p.is_empty()).collect();
    for part in href.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            part => parts.push(part),
        }
    }

    Some(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::layer::LayerKind;
    use crate::test_utils::{png_bytes, ZipBuilder};

    const OVERLAY_KML: &str = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document>
        <Placemark><name>Mill</name><Point><coordinates>10.5,50.5</coordinates></Point></Placemark>
        <GroundOverlay><name>Survey</name><Icon><href>files/survey.png</href></Icon>
          <LatLonBox><north>51</north><south>50</south><east>11</east><west>10</west></LatLonBox></GroundOverlay>
        <GroundOverlay><Icon><href>http://example.com/tile.png</href></Icon>
          <LatLonBox><north>1</north><south>0</south><east>1</east><west>0</west></LatLonBox></GroundOverlay>
    </Document></kml>"#;

    fn ctx() -> DecodeContext {
        DecodeContext::default()
    }

    #[test]
    fn href_resolution() {
        assert_eq!(resolve_href("", "files/a.png").as_deref(), Some("files/a.png"));
        assert_eq!(resolve_href("dir", "./a.png").as_deref(), Some("dir/a.png"));
        assert_eq!(resolve_href("dir/sub", "../a.png").as_deref(), Some("dir/a.png"));
        assert_eq!(resolve_href("dir", "/a.png").as_deref(), Some("a.png"));
        assert_eq!(resolve_href("", "../a.png"), None);
        assert_eq!(resolve_href("", "https://example.com/a.png"), None);
    }

    #[test]
    fn kmz_with_overlay_and_extra_image() {
        let data = ZipBuilder::new()
            .file("doc.kml", OVERLAY_KML.as_bytes())
            .file("files/survey.png", &png_bytes(4, 2))
            .file("files/legend.png", &png_bytes(1, 1))
            .build();
        let input = RawInput::new("mills.kmz", data);

        let outcome = decode_kmz(&input, &ctx()).unwrap();
        assert!(outcome.errors.is_empty(), "{:?}", outcome.errors);
        assert_eq!(outcome.layers.len(), 3);

        let vector = &outcome.layers[0];
        assert_eq!(vector.kind(), LayerKind::Vector);
        assert_eq!(vector.name(), "mills");
        assert_eq!(vector.features().unwrap().len(), 1);
        assert_eq!(vector.warnings().len(), 1);
        assert_eq!(vector.warnings()[0].kind, WarningKind::MissingSidecar);

        let overlay = &outcome.layers[1];
        assert_eq!(overlay.name(), "Survey");
        assert_eq!(overlay.crs(), Some(&geoingest_types::Crs::Wgs84));
        let bbox = overlay.bbox().unwrap();
        assert_eq!((bbox.x_min(), bbox.y_min(), bbox.x_max(), bbox.y_max()), (10.0, 50.0, 11.0, 51.0));

        let legend = &outcome.layers[2];
        assert_eq!(legend.name(), "legend");
        assert_eq!(legend.crs(), None);
        assert!(legend.warnings().is_empty());
    }

    #[test]
    fn main_document_selection() {
        let entries: Vec<_> = ["a/nested.kml", "other.kml", "DOC.KML"]
            .into_iter()
            .map(|path| ArchiveEntry {
                path: path.to_string(),
                input: RawInput::new(format!("x.kmz/{path}"), Vec::new()),
            })
            .collect();
        assert_eq!(main_document(&entries).unwrap().path, "DOC.KML");
        assert_eq!(main_document(&entries[..2]).unwrap().path, "other.kml");
        assert_eq!(main_document(&entries[..1]).unwrap().path, "a/nested.kml");
    }

    #[test]
    fn corrupted_entry_is_reported_and_rest_salvaged() {
        let legend = png_bytes(2, 2);
        let mut data = ZipBuilder::new()
            .file("doc.kml", OVERLAY_KML.as_bytes())
            .stored_file("files/legend.png", &legend)
            .build();
        ZipBuilder::corrupt_content(&mut data, &legend);

        let outcome = decode_kmz(&RawInput::new("mills.kmz", data), &ctx()).unwrap();
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].input, "mills.kmz");
        assert_eq!(outcome.errors[0].kind, ErrorKind::CorruptArchive);

        assert_eq!(outcome.layers.len(), 1);
        let warnings = outcome.layers[0].warnings();
        assert!(warnings.iter().any(|w| w.kind == WarningKind::CorruptArchive));
    }

    #[test]
    fn truncated_central_directory() {
        let mut data = ZipBuilder::new().file("doc.kml", OVERLAY_KML.as_bytes()).build();
        data.truncate(data.len() - 30);
        let result = decode_kmz(&RawInput::new("broken.kmz", data), &ctx());
        assert_matches!(&result, Err(err) if err.kind() == ErrorKind::CorruptArchive);
    }

    #[test]
    fn kmz_without_kml() {
        let data = ZipBuilder::new().file("readme.txt", b"hello").build();
        let result = decode_kmz(&RawInput::new("empty.kmz", data), &ctx());
        assert_matches!(result, Err(IngestError::CorruptArchive(_)));
    }

    #[test]
    fn zip_archive_entries_are_decoded() {
        let data = ZipBuilder::new()
            .file("data/regions.geojson", br#"{"type":"Point","coordinates":[1,2]}"#)
            .file("data/notes.txt", b"nothing to see")
            .file("data/inner.zip", b"PK\x03\x04")
            .build();

        let outcome = decode_zip(&RawInput::new("upload.zip", data), &ctx()).unwrap();
        assert_eq!(outcome.layers.len(), 1);
        assert_eq!(outcome.layers[0].name(), "regions");

        let errors: Vec<_> = outcome.errors.iter().map(|e| (e.input.as_str(), e.kind)).collect();
        assert_eq!(
            errors,
            vec![
                ("upload.zip/data/notes.txt", ErrorKind::UnsupportedFormat),
                ("upload.zip/data/inner.zip", ErrorKind::UnsupportedFormat),
            ]
        );
    }

    #[test]
    fn too_many_entries() {
        let data = ZipBuilder::new().file("a.geojson", b"{}").file("b.geojson", b"{}").build();
        let options = crate::options::IngestOptions::default().with_max_archive_entries(1);
        let ctx = DecodeContext::new(std::sync::Arc::new(options), Default::default());
        let result = decode_zip(&RawInput::new("upload.zip", data), &ctx);
        assert_matches!(result, Err(IngestError::CorruptArchive(_)));
    }
}
