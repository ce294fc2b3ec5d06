//! Pixel buffers of raster layers.

use image::ImageFormat;

use crate::error::IngestError;

/// An image that has been loaded into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    /// Raw bytes of the image, in RGBA order.
    bytes: Vec<u8>,
    /// Width and height of the image.
    dimensions: (u32, u32),
}

impl DecodedImage {
    /// Decodes an image from a byte slice.
    ///
    /// If `format` is not given, it is guessed from the data. Non-RGBA images are converted to RGBA.
    pub fn decode(bytes: &[u8], format: Option<ImageFormat>) -> Result<Self, IngestError> {
        use image::GenericImageView;

        let decoded = match format {
            Some(format) => image::load_from_memory_with_format(bytes, format)?,
            None => image::load_from_memory(bytes)?,
        };
        let dimensions = decoded.dimensions();
        let bytes = decoded.to_rgba8();

        Ok(Self {
            bytes: bytes.into_vec(),
            dimensions,
        })
    }

    /// RGBA bytes, row by row from the top-left pixel.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Width of the image in pixels.
    pub fn width(&self) -> u32 {
        self.dimensions.0
    }

    /// Height of the image in pixels.
    pub fn height(&self) -> u32 {
        self.dimensions.1
    }
}
