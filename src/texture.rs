//! Equirectangular texture maps
//!
//! A `TextureMap` owns a decoded RGB pixel buffer and answers
//! longitude/latitude lookups with bilinear filtering. The x axis maps
//! linearly to longitude (cyclic), the y axis to latitude; rows past a pole
//! are reflected back with a half-width longitude shift, which approximates
//! sampling across the pole singularity of the projection.
//!
//! Cloud maps get an extra one-time preprocessing pass: outline colors baked
//! into the source cartography are repaired with a randomized neighbor walk,
//! then every channel is remapped through an arctangent sharpening curve.

use std::f64::consts::PI;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};

use crate::util::Rng;

/// Step budget for the bad-color repair walk before giving up
const MAX_REPAIR_STEPS: u32 = 10_000;

/// Immutable RGB raster with equirectangular sampling
pub struct TextureMap {
    pixels: Vec<u8>,
    width: usize,
    height: usize,
}

impl TextureMap {
    /// Decode an image file. Indexed and sub-32-bit formats are normalized
    /// to RGB by the decoder.
    pub fn load(path: &Path) -> Result<Self> {
        let img = image::open(path)
            .with_context(|| format!("error while opening map \"{}\"", path.display()))?
            .to_rgb8();
        let (width, height) = img.dimensions();
        Ok(Self {
            pixels: img.into_raw(),
            width: width as usize,
            height: height as usize,
        })
    }

    /// Wrap an existing RGB buffer (length must be width*height*3)
    pub fn from_raw(width: usize, height: usize, pixels: Vec<u8>) -> Option<Self> {
        if pixels.len() == width * height * 3 {
            Some(Self {
                pixels,
                width,
                height,
            })
        } else {
            None
        }
    }

    /// Uniform single-color map (used by tests)
    pub fn solid(width: usize, height: usize, r: u8, g: u8, b: u8) -> Self {
        let mut pixels = Vec::with_capacity(width * height * 3);
        for _ in 0..width * height {
            pixels.extend_from_slice(&[r, g, b]);
        }
        Self {
            pixels,
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn texel(&self, x: usize, y: usize) -> (u8, u8, u8) {
        let idx = (y * self.width + x) * 3;
        (self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2])
    }

    #[inline]
    fn set_texel(&mut self, x: usize, y: usize, rgb: (u8, u8, u8)) {
        let idx = (y * self.width + x) * 3;
        self.pixels[idx] = rgb.0;
        self.pixels[idx + 1] = rgb.1;
        self.pixels[idx + 2] = rgb.2;
    }

    /// Bilinear sample at longitude [-pi, pi], latitude [-pi/2, pi/2].
    /// Longitude wraps cyclically; latitude overflow reflects across the pole.
    pub fn sample_bilinear(&self, longitude: f64, latitude: f64) -> (u8, u8, u8) {
        let w = self.width;
        let h = self.height;

        let mut posx = (longitude + PI) * w as f64 / (2.0 * PI);
        let mut posy = (latitude + PI / 2.0) * h as f64 / PI;

        if posy >= h as f64 {
            posy = 2.0 * h as f64 - posy;
            posx += w as f64 / 2.0;
        } else if posy < 0.0 {
            posy = -posy;
            posx += w as f64 / 2.0;
        }
        while posx >= w as f64 {
            posx -= w as f64;
        }
        while posx < 0.0 {
            posx += w as f64;
        }

        let x11 = (posx as usize).min(w - 1);
        let y1 = (posy as usize).min(h - 1);
        let mut x12 = x11 + 1;
        if x12 == w {
            x12 = 0;
        }
        let mut x21 = x11;
        let mut y2 = y1 + 1;
        if y2 == h {
            // bottom row: reuse the reflected row across the pole
            y2 -= 1;
            x21 = x11 + w / 2;
            if x21 >= w {
                x21 -= w;
            }
        }
        let x22 = x12;
        let dx = posx - x11 as f64;
        let dy = posy - y1 as f64;

        let c11 = self.texel(x11, y1);
        let c12 = self.texel(x12, y1);
        let c21 = self.texel(x21, y2);
        let c22 = self.texel(x22, y2);

        let lerp2 = |a: u8, b: u8, c: u8, d: u8| -> u8 {
            let top = b as f64 * dx + a as f64 * (1.0 - dx);
            let bottom = d as f64 * dx + c as f64 * (1.0 - dx);
            (bottom * dy + top * (1.0 - dy)) as u8
        };

        (
            lerp2(c11.0, c12.0, c21.0, c22.0),
            lerp2(c11.1, c12.1, c21.1, c22.1),
            lerp2(c11.2, c12.2, c21.2, c22.2),
        )
    }

    /// Bilinear resize (used to pre-scale a non-tiled background image)
    pub fn scaled(&self, new_width: usize, new_height: usize) -> Self {
        let mut pixels = Vec::with_capacity(new_width * new_height * 3);
        for y in 0..new_height {
            let sy = (y as f64 + 0.5) * self.height as f64 / new_height as f64 - 0.5;
            let y0 = sy.max(0.0) as usize;
            let y1 = (y0 + 1).min(self.height - 1);
            let fy = (sy - y0 as f64).clamp(0.0, 1.0);
            for x in 0..new_width {
                let sx = (x as f64 + 0.5) * self.width as f64 / new_width as f64 - 0.5;
                let x0 = sx.max(0.0) as usize;
                let x1 = (x0 + 1).min(self.width - 1);
                let fx = (sx - x0 as f64).clamp(0.0, 1.0);

                let c00 = self.texel(x0, y0);
                let c10 = self.texel(x1, y0);
                let c01 = self.texel(x0, y1);
                let c11 = self.texel(x1, y1);
                let lerp = |a: u8, b: u8, c: u8, d: u8| -> u8 {
                    let top = a as f64 + (b as f64 - a as f64) * fx;
                    let bottom = c as f64 + (d as f64 - c as f64) * fx;
                    (top + (bottom - top) * fy) as u8
                };
                pixels.push(lerp(c00.0, c10.0, c01.0, c11.0));
                pixels.push(lerp(c00.1, c10.1, c01.1, c11.1));
                pixels.push(lerp(c00.2, c10.2, c01.2, c11.2));
            }
        }
        Self {
            pixels,
            width: new_width,
            height: new_height,
        }
    }

    /// Repair bad source colors and sharpen the cloud intensity curve.
    /// One-time pass over the whole image, re-run only on hot reload.
    pub fn apply_cloud_filter(&mut self, table: &[u8; 256], rng: &mut Rng) {
        let w = self.width;
        let h = self.height;

        // the source cartography marks continent outlines in magenta and
        // near-black; replace them by walking to the nearest clean pixel
        for py in 0..h {
            for px in 0..w {
                let (r, g, b) = self.texel(px, py);
                if !bad_color(r, g, b) {
                    continue;
                }
                let mut x = px;
                let mut y = py;
                // no clean pixel within the step budget means cloud-free
                let mut repaired = (0, 0, 0);
                for _ in 0..MAX_REPAIR_STEPS {
                    let mut step = rng.below(4);
                    if step == 0 {
                        if y < h - 1 {
                            y += 1;
                        } else {
                            step = 1;
                        }
                    }
                    if step == 1 {
                        if y > 0 {
                            y -= 1;
                        } else {
                            step = 2;
                        }
                    }
                    if step == 2 {
                        x += 1;
                        if x == w {
                            x = 0;
                        }
                    } else if step == 3 {
                        x = if x == 0 { w - 1 } else { x - 1 };
                    }
                    let c = self.texel(x, y);
                    if !bad_color(c.0, c.1, c.2) {
                        repaired = c;
                        break;
                    }
                }
                self.set_texel(px, py, repaired);
            }
        }

        for p in self.pixels.iter_mut() {
            *p = table[*p as usize];
        }
    }
}

/// Continent-outline colors that must not be treated as cloud data
#[inline]
fn bad_color(r: u8, g: u8, b: u8) -> bool {
    (r == 255 && b == 255) || (r == 2 && g == 2 && b == 2)
}

/// Build the 256-entry cloud intensity remap. An arctangent around the
/// threshold works well to sharpen cloud edges: 0 shows all cloud, 255
/// keeps only the brightest.
pub fn cloud_filter_table(threshold: u8) -> [u8; 256] {
    let mut table = [0u8; 256];
    for (i, entry) in table.iter_mut().enumerate() {
        let j = ((i as f64 - threshold as f64) / 20.0).atan() * 290.0 / PI + 125.0;
        *entry = j.clamp(0.0, 255.0) as u8;
    }
    table
}

/// Tracks a file's modification time for cloud-map hot reload.
/// A missing file is never reported as changed; reload is skipped silently.
pub struct FileWatch {
    path: PathBuf,
    last_seen: Option<SystemTime>,
}

impl FileWatch {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            last_seen: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True when the file exists and its mtime differs from the last check
    /// (including the very first check).
    pub fn changed(&mut self) -> bool {
        let Ok(meta) = std::fs::metadata(&self.path) else {
            return false;
        };
        let Ok(mtime) = meta.modified() else {
            return false;
        };
        if self.last_seen != Some(mtime) {
            self.last_seen = Some(mtime);
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // two-tone map: left half dark, right half bright
    fn gradient_map() -> TextureMap {
        let w = 64;
        let h = 32;
        let mut pixels = Vec::with_capacity(w * h * 3);
        for _y in 0..h {
            for x in 0..w {
                let v = (x * 255 / (w - 1)) as u8;
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        TextureMap::from_raw(w, h, pixels).unwrap()
    }

    #[test]
    fn test_solid_map_samples_uniformly() {
        let map = TextureMap::solid(16, 8, 10, 20, 30);
        for &(lon, lat) in &[(0.0, 0.0), (3.0, 1.2), (-3.1, -1.5), (1.0, 1.57)] {
            assert_eq!(map.sample_bilinear(lon, lat), (10, 20, 30));
        }
    }

    #[test]
    fn test_bilinear_continuity() {
        // small steps in longitude produce small steps in color
        let map = gradient_map();
        let eps = 1e-4;
        for i in 0..100 {
            let lon = -PI + (i as f64 / 100.0) * 2.0 * PI;
            let (r1, _, _) = map.sample_bilinear(lon, 0.3);
            let (r2, _, _) = map.sample_bilinear(lon + eps, 0.3);
            assert!((r1 as i32 - r2 as i32).abs() <= 1, "jump at lon {}", lon);
        }
    }

    #[test]
    fn test_longitude_wraparound() {
        let map = gradient_map();
        let delta = 0.01;
        let a = map.sample_bilinear(-PI - delta, 0.0);
        let b = map.sample_bilinear(PI - delta, 0.0);
        assert!((a.0 as i32 - b.0 as i32).abs() <= 1, "{:?} vs {:?}", a, b);
    }

    #[test]
    fn test_pole_overflow_reflects() {
        // sampling beyond the pole must not panic and must return a color
        // from the map (the reflected row, shifted half a width)
        let map = gradient_map();
        let _ = map.sample_bilinear(0.0, PI / 2.0);
        let _ = map.sample_bilinear(0.0, -PI / 2.0);
        let over = map.sample_bilinear(0.0, PI / 2.0 + 0.05);
        let shifted = map.sample_bilinear(PI, PI / 2.0 - 0.05);
        assert!((over.0 as i32 - shifted.0 as i32).abs() <= 8);
    }

    #[test]
    fn test_cloud_filter_table_monotone_and_clamped() {
        let table = cloud_filter_table(120);
        for i in 1..256 {
            assert!(table[i] >= table[i - 1], "table not monotone at {}", i);
        }
        assert!(table[0] < 50);
        assert!(table[255] > 200);
    }

    #[test]
    fn test_cloud_filter_repairs_bad_colors() {
        // single magenta pixel surrounded by gray must be replaced
        let mut pixels = vec![128u8; 4 * 4 * 3];
        let idx = (1 * 4 + 2) * 3;
        pixels[idx] = 255;
        pixels[idx + 1] = 0;
        pixels[idx + 2] = 255;
        let mut map = TextureMap::from_raw(4, 4, pixels).unwrap();

        let table = cloud_filter_table(120);
        let mut rng = Rng::new(9);
        map.apply_cloud_filter(&table, &mut rng);

        let expected = table[128];
        assert_eq!(map.texel(2, 1), (expected, expected, expected));
    }

    #[test]
    fn test_cloud_filter_all_bad_map_terminates() {
        // a map with no clean pixel anywhere falls back to cloud-free
        let mut map = TextureMap::solid(4, 4, 255, 0, 255);
        let table = cloud_filter_table(120);
        let mut rng = Rng::new(9);
        map.apply_cloud_filter(&table, &mut rng);

        let expected = table[0];
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(map.texel(x, y), (expected, expected, expected));
            }
        }
    }

    #[test]
    fn test_scaled_preserves_solid_color() {
        let map = TextureMap::solid(10, 10, 40, 50, 60);
        let small = map.scaled(4, 4);
        assert_eq!(small.width(), 4);
        assert_eq!(small.texel(0, 0), (40, 50, 60));
        assert_eq!(small.texel(3, 3), (40, 50, 60));
    }

    #[test]
    fn test_file_watch_missing_file_not_changed() {
        let mut watch = FileWatch::new(PathBuf::from("/nonexistent/clouds.png"));
        assert!(!watch.changed());
    }
}
