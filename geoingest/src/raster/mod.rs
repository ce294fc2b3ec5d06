//! Decoders of raster formats.

use std::io::Cursor;

use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegDecoder;
use image::codecs::png::PngDecoder;
use image::codecs::tiff::TiffDecoder;
use image::{ImageDecoder, ImageFormat};

use crate::error::IngestError;

pub(crate) mod geotiff;
pub(crate) mod image_file;

/// Size and sample count of an image, read without decoding the pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ImageInfo {
    pub(crate) width: u32,
    pub(crate) height: u32,
    pub(crate) bands: u16,
}

impl ImageInfo {
    fn from_decoder<'a>(decoder: impl ImageDecoder<'a>) -> Self {
        let (width, height) = decoder.dimensions();
        Self {
            width,
            height,
            bands: u16::from(decoder.color_type().channel_count()),
        }
    }
}

/// Reads the image header.
pub(crate) fn read_info(bytes: &[u8], format: ImageFormat) -> Result<ImageInfo, IngestError> {
    let reader = Cursor::new(bytes);
    Ok(match format {
        ImageFormat::Png => ImageInfo::from_decoder(PngDecoder::new(reader)?),
        ImageFormat::Jpeg => ImageInfo::from_decoder(JpegDecoder::new(reader)?),
        ImageFormat::Gif => ImageInfo::from_decoder(GifDecoder::new(reader)?),
        ImageFormat::Tiff => ImageInfo::from_decoder(TiffDecoder::new(reader)?),
        other => {
            return Err(IngestError::UnsupportedFormat(format!(
                "{other:?} images are not supported"
            )))
        }
    })
}
