//! Texture loading and data structures.
//! Decodes `map_Kd` images into RGBA8 before GPU upload.

use std::path::Path;

/// Texture data in CPU-friendly format before GPU upload.
#[derive(Clone, Debug)]
pub struct TextureData {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

/// Supported texture formats.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TextureFormat {
    Rgba8,
}

impl TextureData {
    /// Create a new texture with given dimensions and RGBA8 format.
    pub fn new_rgba8(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(
            data.len(),
            (width * height * 4) as usize,
            "Data size doesn't match RGBA8 format"
        );
        Self {
            data,
            width,
            height,
            format: TextureFormat::Rgba8,
        }
    }

    /// Single-texel texture of the given color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new_rgba8(1, 1, rgba.to_vec())
    }

    /// Get the number of bytes per pixel for the format.
    pub fn bytes_per_pixel(&self) -> u32 {
        match self.format {
            TextureFormat::Rgba8 => 4,
        }
    }

    /// Check if the texture data is valid.
    pub fn is_valid(&self) -> bool {
        let expected_size = (self.width * self.height * self.bytes_per_pixel()) as usize;
        self.data.len() == expected_size && self.width > 0 && self.height > 0
    }
}

/// Turns an image file into RGBA8 pixels. The loader calls [`decode`],
/// uploads the result, then hands the buffer back through [`release`].
///
/// [`decode`]: ImageDecoder::decode
/// [`release`]: ImageDecoder::release
pub trait ImageDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<TextureData>;

    fn release(&self, image: TextureData) {
        drop(image);
    }
}

/// Decoder backed by the `image` crate (PNG and JPEG).
///
/// Rows are stored bottom-up so that texture coordinate `v = 0` addresses
/// the bottom of the picture, as OBJ files expect.
#[derive(Clone, Copy, Debug, Default)]
pub struct ImageFileDecoder;

impl ImageDecoder for ImageFileDecoder {
    fn decode(&self, path: &Path) -> anyhow::Result<TextureData> {
        log::info!("Loading texture from {:?}", path);

        let img = image::open(path)
            .map_err(|e| anyhow::anyhow!("Failed to open image {:?}: {}", path, e))?;

        let mut rgba = img.to_rgba8();
        image::imageops::flip_vertical_in_place(&mut rgba);
        let (width, height) = rgba.dimensions();
        let data = rgba.into_raw();

        log::info!("Loaded texture {}x{} with {} bytes", width, height, data.len());

        Ok(TextureData::new_rgba8(width, height, data))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solid_texture_is_valid() {
        let tex = TextureData::solid([255, 255, 255, 255]);
        assert!(tex.is_valid());
        assert_eq!(tex.bytes_per_pixel(), 4);
    }

    #[test]
    fn decode_flips_rows_bottom_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("two_rows.png");
        let mut img = image::RgbaImage::new(1, 2);
        img.put_pixel(0, 0, image::Rgba([255, 0, 0, 255]));
        img.put_pixel(0, 1, image::Rgba([0, 0, 255, 255]));
        img.save(&path).unwrap();

        let tex = ImageFileDecoder.decode(&path).unwrap();
        assert!(tex.is_valid());
        assert_eq!((tex.width, tex.height), (1, 2));
        // Bottom (blue) row comes first.
        assert_eq!(&tex.data[..4], &[0, 0, 255, 255]);
        assert_eq!(&tex.data[4..], &[255, 0, 0, 255]);
        ImageFileDecoder.release(tex);
    }

    #[test]
    fn decode_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ImageFileDecoder.decode(&dir.path().join("none.png")).is_err());
    }
}
