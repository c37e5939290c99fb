//! PNG decoding and encoding at the edges of the pipeline.
//!
//! Everything between the two copies works on tightly packed 8-bit RGBA, so
//! decoding normalizes whatever the file contains (grayscale, palette, RGB)
//! to that layout up front. Encoding writes the recovered bytes straight
//! from the mapped readback buffer; the caller keeps the mapping alive until
//! [`save`] returns.

use std::{
    error::Error as StdError,
    fmt::{Display, Error as FmtError, Formatter},
    fs::File,
    io,
    io::BufWriter,
    path::Path,
};

/// A decoded image: packed RGBA8 pixels with top-left origin.
#[derive(Debug)]
pub struct Bitmap {
    data: Vec<u8>,
    width: u32,
    height: u32,
    stride: u32,
}

impl Bitmap {
    /// Decodes a PNG file.
    ///
    /// Low-bit-depth, 16-bit, palette, grayscale and alpha-less inputs are
    /// all normalized to packed RGBA8, so the stride is always
    /// `width * 4` bytes.
    pub fn open(path: &Path) -> Result<Bitmap, BitmapError> {
        let file = File::open(path)?;

        let mut decoder = png::Decoder::new(file);
        decoder.set_transformations(png::Transformations::normalize_to_color8());
        let mut reader = decoder.read_info()?;

        let mut data = vec![0; reader.output_buffer_size()];
        let info = reader.next_frame(&mut data)?;
        data.truncate(info.buffer_size());

        let data = match info.color_type {
            png::ColorType::Rgba => data,
            png::ColorType::Rgb => {
                let mut rgba = Vec::with_capacity(data.len() / 3 * 4);
                for pixel in data.chunks_exact(3) {
                    rgba.extend_from_slice(pixel);
                    rgba.push(u8::MAX);
                }
                rgba
            }
            png::ColorType::Grayscale => {
                let mut rgba = Vec::with_capacity(data.len() * 4);
                for &gray in &data {
                    rgba.extend_from_slice(&[gray, gray, gray, u8::MAX]);
                }
                rgba
            }
            png::ColorType::GrayscaleAlpha => {
                let mut rgba = Vec::with_capacity(data.len() * 2);
                for pixel in data.chunks_exact(2) {
                    rgba.extend_from_slice(&[pixel[0], pixel[0], pixel[0], pixel[1]]);
                }
                rgba
            }
            // The expand transformation has already turned palette images
            // into RGB(A).
            color_type => return Err(BitmapError::Layout(color_type)),
        };

        Ok(Bitmap {
            data,
            width: info.width,
            height: info.height,
            stride: info.width * 4,
        })
    }

    /// Returns the width of the image in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Returns the height of the image in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Returns the length of one pixel row in bytes.
    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Returns the total length of the pixel data in bytes.
    #[inline]
    pub fn byte_length(&self) -> usize {
        self.data.len()
    }

    /// Returns the pixel data.
    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// Encodes packed RGBA8 pixels as a PNG file.
///
/// `pixels` may borrow directly from mapped device memory; it is fully
/// consumed before this returns.
pub fn save(path: &Path, pixels: &[u8], width: u32, height: u32) -> Result<(), BitmapError> {
    let file = File::create(path)?;
    let writer = &mut BufWriter::new(file);

    let mut encoder = png::Encoder::new(writer, width, height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);

    let mut writer = encoder.write_header()?;
    writer.write_image_data(pixels)?;
    writer.finish()?;

    Ok(())
}

/// Error hit while reading, decoding or encoding an image file.
#[derive(Debug)]
pub enum BitmapError {
    /// Opening or creating the file failed.
    Io(io::Error),
    /// The input file is not a decodable PNG.
    Decode(png::DecodingError),
    /// Writing the output file failed.
    Encode(png::EncodingError),
    /// The decoder produced a pixel layout this tool does not handle.
    Layout(png::ColorType),
}

impl From<io::Error> for BitmapError {
    fn from(err: io::Error) -> Self {
        BitmapError::Io(err)
    }
}

impl From<png::DecodingError> for BitmapError {
    fn from(err: png::DecodingError) -> Self {
        BitmapError::Decode(err)
    }
}

impl From<png::EncodingError> for BitmapError {
    fn from(err: png::EncodingError) -> Self {
        BitmapError::Encode(err)
    }
}

impl StdError for BitmapError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            BitmapError::Io(err) => Some(err),
            BitmapError::Decode(err) => Some(err),
            BitmapError::Encode(err) => Some(err),
            BitmapError::Layout(_) => None,
        }
    }
}

impl Display for BitmapError {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        match self {
            BitmapError::Io(err) => write!(f, "could not access the image file: {}", err),
            BitmapError::Decode(err) => write!(f, "could not decode the input file: {}", err),
            BitmapError::Encode(err) => write!(f, "could not write the output file: {}", err),
            BitmapError::Layout(color_type) => {
                write!(f, "unhandled decoded pixel layout {:?}", color_type)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{save, Bitmap};
    use std::{env, fs, path::PathBuf, process};

    fn scratch_file(name: &str) -> PathBuf {
        env::temp_dir().join(format!("protblit-{}-{}.png", name, process::id()))
    }

    #[test]
    fn rgba_input_decodes_unchanged() {
        let path = scratch_file("rgba");
        let pixels = [255, 0, 0, 255, 0, 255, 0, 255];
        save(&path, &pixels, 2, 1).unwrap();

        let bitmap = Bitmap::open(&path).unwrap();
        assert_eq!(bitmap.width(), 2);
        assert_eq!(bitmap.height(), 1);
        assert_eq!(bitmap.stride(), 8);
        assert_eq!(bitmap.byte_length(), 8);
        assert_eq!(bitmap.data(), &pixels);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rgb_input_gains_opaque_alpha() {
        let path = scratch_file("rgb");
        {
            let file = fs::File::create(&path).unwrap();
            let mut encoder = png::Encoder::new(file, 2, 2);
            encoder.set_color(png::ColorType::Rgb);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer
                .write_image_data(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12])
                .unwrap();
            writer.finish().unwrap();
        }

        let bitmap = Bitmap::open(&path).unwrap();
        assert_eq!(bitmap.stride(), 8);
        assert_eq!(
            bitmap.data(),
            &[1, 2, 3, 255, 4, 5, 6, 255, 7, 8, 9, 255, 10, 11, 12, 255],
        );

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn grayscale_input_replicates_channels() {
        let path = scratch_file("gray");
        {
            let file = fs::File::create(&path).unwrap();
            let mut encoder = png::Encoder::new(file, 2, 1);
            encoder.set_color(png::ColorType::Grayscale);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header().unwrap();
            writer.write_image_data(&[0, 200]).unwrap();
            writer.finish().unwrap();
        }

        let bitmap = Bitmap::open(&path).unwrap();
        assert_eq!(bitmap.data(), &[0, 0, 0, 255, 200, 200, 200, 255]);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Bitmap::open(&scratch_file("does-not-exist")).unwrap_err();
        assert!(matches!(err, super::BitmapError::Io(_)));
    }
}
