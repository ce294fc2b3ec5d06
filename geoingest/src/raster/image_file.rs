use crate::context::DecodeContext;
use crate::decoded_image::DecodedImage;
use crate::error::IngestError;
use crate::input::RawInput;
use crate::layer::{AffineTransform, GisLayer, RasterLayer};
use crate::raster::read_info;

/// Decodes a PNG, JPEG or GIF image into an unreferenced raster layer.
pub(crate) fn decode(input: &RawInput, ctx: &DecodeContext) -> Result<GisLayer, IngestError> {
    let bytes = input.bytes();
    let format = image::guess_format(bytes)?;
    let info = read_info(bytes, format)?;

    let pixels = if ctx.options().decode_pixels {
        ctx.checkpoint()?;
        Some(DecodedImage::decode(bytes, Some(format))?)
    } else {
        None
    };

    let raster = RasterLayer {
        width: info.width,
        height: info.height,
        bands: info.bands,
        transform: AffineTransform::IDENTITY,
        source_crs: None,
        pixels,
    };

    Ok(GisLayer::raster(input.stem(), raster))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use tokio_util::sync::CancellationToken;

    use super::*;
    use crate::layer::LayerKind;
    use crate::options::IngestOptions;
    use crate::test_utils::png_bytes;

    #[test]
    fn png_is_unreferenced_raster() {
        let input = RawInput::new("scan.png", png_bytes(3, 2));
        let layer = decode(&input, &DecodeContext::default()).unwrap();

        assert_eq!(layer.kind(), LayerKind::Raster);
        assert_eq!(layer.crs(), None);
        assert!(layer.warnings().is_empty());

        let raster = layer.raster_data().unwrap();
        assert_eq!((raster.width, raster.height, raster.bands), (3, 2, 4));
        assert!(raster.transform.is_identity());
        let pixels = raster.pixels.as_ref().unwrap();
        assert_eq!(pixels.bytes().len(), 3 * 2 * 4);
    }

    #[test]
    fn metadata_only() {
        let ctx = DecodeContext::new(
            Arc::new(IngestOptions::default().with_decode_pixels(false)),
            CancellationToken::new(),
        );
        let layer = decode(&RawInput::new("scan.png", png_bytes(5, 7)), &ctx).unwrap();
        let raster = layer.raster_data().unwrap();
        assert_eq!((raster.width, raster.height), (5, 7));
        assert!(raster.pixels.is_none());
    }

    #[test]
    fn garbage() {
        let result = decode(&RawInput::new("scan.png", b"not an image".to_vec()), &DecodeContext::default());
        assert_matches!(result, Err(IngestError::ImageDecode(_)));
    }
}
