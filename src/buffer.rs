//! RGB pixel buffer for software rendering
//!
//! Every overlay (sphere scan, stars, grid, markers, label) writes into this
//! canvas; the finished frame is converted to an `image::RgbImage` for output.

use image::RgbImage;

/// RGB8 pixel buffer. (0, 0) is the top-left corner.
pub struct PixelBuffer {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
}

impl PixelBuffer {
    /// Create a new black pixel buffer
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            pixels: vec![0; (width * height * 3) as usize],
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Fill the whole buffer with one color
    pub fn clear(&mut self, r: u8, g: u8, b: u8) {
        for chunk in self.pixels.chunks_exact_mut(3) {
            chunk[0] = r;
            chunk[1] = g;
            chunk[2] = b;
        }
    }

    /// Set a pixel, ignoring out-of-bounds coordinates
    #[inline]
    pub fn set_pixel(&mut self, x: i32, y: i32, r: u8, g: u8, b: u8) {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            let idx = ((y as u32 * self.width + x as u32) * 3) as usize;
            self.pixels[idx] = r;
            self.pixels[idx + 1] = g;
            self.pixels[idx + 2] = b;
        }
    }

    /// Read a pixel; out-of-bounds reads return black
    #[inline]
    pub fn get_pixel(&self, x: i32, y: i32) -> (u8, u8, u8) {
        if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
            let idx = ((y as u32 * self.width + x as u32) * 3) as usize;
            (self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2])
        } else {
            (0, 0, 0)
        }
    }

    /// Raw bytes, row-major RGB
    pub fn as_bytes(&self) -> &[u8] {
        &self.pixels
    }

    /// Copy the buffer into an `RgbImage` for encoding
    pub fn to_image(&self) -> RgbImage {
        RgbImage::from_raw(self.width, self.height, self.pixels.clone())
            .expect("buffer dimensions match pixel data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffer_is_black() {
        let buf = PixelBuffer::new(4, 3);
        assert_eq!(buf.get_pixel(0, 0), (0, 0, 0));
        assert_eq!(buf.get_pixel(3, 2), (0, 0, 0));
    }

    #[test]
    fn test_set_get_roundtrip() {
        let mut buf = PixelBuffer::new(8, 8);
        buf.set_pixel(3, 5, 10, 20, 30);
        assert_eq!(buf.get_pixel(3, 5), (10, 20, 30));
    }

    #[test]
    fn test_out_of_bounds_writes_ignored() {
        let mut buf = PixelBuffer::new(2, 2);
        buf.set_pixel(-1, 0, 255, 255, 255);
        buf.set_pixel(2, 0, 255, 255, 255);
        buf.set_pixel(0, 2, 255, 255, 255);
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_to_image_matches_buffer() {
        let mut buf = PixelBuffer::new(3, 2);
        buf.set_pixel(2, 1, 9, 8, 7);
        let img = buf.to_image();
        assert_eq!(img.dimensions(), (3, 2));
        assert_eq!(img.get_pixel(2, 1).0, [9, 8, 7]);
    }
}
