//! Background star field
//!
//! Stars are generated once for a given canvas size and painted under the
//! globe each frame. Brightness varies around a warm gray so the field does
//! not read as uniform noise.

use crate::buffer::PixelBuffer;
use crate::util::Rng;

struct Star {
    x: i32,
    y: i32,
    r: u8,
    g: u8,
    b: u8,
}

/// Fixed set of single-pixel stars for one canvas size
pub struct StarField {
    stars: Vec<Star>,
}

impl StarField {
    /// `frequency` is stars per pixel; 0.002 gives a sparse night sky.
    pub fn new(frequency: f64, width: u32, height: u32, rng: &mut Rng) -> Self {
        let count = (width as f64 * height as f64 * frequency) as usize;
        let mut stars = Vec::with_capacity(count);
        for _ in 0..count {
            let base = 130 + rng.below(90);
            stars.push(Star {
                x: rng.below(width) as i32,
                y: rng.below(height) as i32,
                r: (base + rng.below(36)) as u8,
                g: (base + rng.below(36)) as u8,
                b: (base + rng.below(36)) as u8,
            });
        }
        Self { stars }
    }

    pub fn len(&self) -> usize {
        self.stars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stars.is_empty()
    }

    /// Paint the stars. Runs before the sphere scan, which overwrites every
    /// pixel the globe covers.
    pub fn render(&self, buffer: &mut PixelBuffer) {
        for star in &self.stars {
            buffer.set_pixel(star.x, star.y, star.r, star.g, star.b);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_count_matches_frequency() {
        let mut rng = Rng::new(42);
        let field = StarField::new(0.002, 200, 100, &mut rng);
        assert_eq!(field.len(), 40);
    }

    #[test]
    fn test_zero_frequency_gives_no_stars() {
        let mut rng = Rng::new(42);
        let field = StarField::new(0.0, 640, 480, &mut rng);
        assert!(field.is_empty());
    }

    #[test]
    fn test_stars_land_inside_canvas() {
        let mut rng = Rng::new(7);
        let field = StarField::new(0.01, 64, 48, &mut rng);
        let mut buffer = PixelBuffer::new(64, 48);
        field.render(&mut buffer);
        // every star is in bounds, so at least one pixel is lit
        assert!(buffer.as_bytes().iter().any(|&b| b > 0));
        for star in &field.stars {
            assert!(star.x >= 0 && star.x < 64);
            assert!(star.y >= 0 && star.y < 48);
        }
    }

    #[test]
    fn test_star_channels_in_expected_band() {
        let mut rng = Rng::new(99);
        let field = StarField::new(0.05, 100, 100, &mut rng);
        for star in &field.stars {
            for c in [star.r, star.g, star.b] {
                assert!((130..=255).contains(&c), "channel {}", c);
            }
        }
    }
}
