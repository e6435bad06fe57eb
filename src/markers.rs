//! Location markers
//!
//! A marker file holds one location per line (`<lat> <lon> "name"`, optional
//! `color=`). Each location becomes a unit vector on the sphere; at render
//! time the visible ones are projected to screen, their labels pushed apart
//! until none overlap, then dot, arrow and label are composited through a
//! monochrome blend that carries coverage in the blue channel and intensity
//! in the red channel.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::buffer::PixelBuffer;
use crate::font::{self, TextMask};
use crate::transform::RotMatrix;
use crate::util::{parse_color, Rng};

const DEFAULT_OFFSET_X: i32 = 4;
const DEFAULT_OFFSET_Y: i32 = 0;
const MIN_ARROW: i32 = 5;
const MAX_JITTER_RETRIES: u32 = 300;

/// A named point on the globe
pub struct Location {
    name: String,
    color: (u8, u8, u8),
    s_x: f64,
    s_y: f64,
    s_z: f64,
}

impl Location {
    /// `lat`/`lon` in degrees
    pub fn new(lat: f64, lon: f64, name: &str, color: (u8, u8, u8)) -> Self {
        let lat = lat.to_radians();
        let lon = lon.to_radians();
        Self {
            name: name.to_owned(),
            color,
            s_x: lat.cos() * lon.sin(),
            s_y: lat.sin(),
            s_z: lat.cos() * lon.cos(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn color(&self) -> (u8, u8, u8) {
        self.color
    }
}

#[derive(Clone, Copy, Default)]
struct Rect {
    x: i32,
    y: i32,
    w: i32,
    h: i32,
}

impl Rect {
    fn intersects(&self, other: &Rect) -> bool {
        self.x < other.x + other.w
            && other.x < self.x + self.w
            && self.y < other.y + other.h
            && other.y < self.y + self.h
    }
}

/// Per-frame state of a projected marker
struct Visible<'a> {
    loc: &'a Location,
    x: i32,
    y: i32,
    cos_angle: f64,
    offset_x: i32,
    offset_y: i32,
    br: Rect,
}

/// All markers plus the label font scale (None renders dots only)
pub struct MarkerList {
    locations: Vec<Location>,
    font_scale: Option<u32>,
}

impl Default for MarkerList {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkerList {
    pub fn new() -> Self {
        Self {
            locations: Vec::new(),
            font_scale: Some(1),
        }
    }

    /// None disables labels and arrows; dots are still drawn
    pub fn set_font_scale(&mut self, scale: Option<u32>) {
        self.font_scale = scale.map(|s| s.max(1));
    }

    pub fn append(&mut self, loc: Location) {
        self.locations.push(loc);
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Load a marker file. Lines starting with '#' and blank lines are
    /// skipped; any malformed line fails the whole file.
    pub fn append_from_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("error while opening marker file \"{}\"", path.display()))?;
        for (num, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let loc = parse_marker_line(line).with_context(|| {
                format!(
                    "syntax error in marker file \"{}\", line {}",
                    path.display(),
                    num + 1
                )
            })?;
            self.locations.push(loc);
        }
        Ok(())
    }

    /// Project, depth-sort and paint all visible markers. `mat` must be the
    /// transposed view matrix (planet frame to camera frame).
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        mat: &RotMatrix,
        buffer: &mut PixelBuffer,
        radius: f64,
        center_dist: f64,
        proj_dist: f64,
        shift_x: i32,
        shift_y: i32,
        rng: &mut Rng,
    ) {
        if self.locations.is_empty() {
            return;
        }

        let width = buffer.width() as i32;
        let height = buffer.height() as i32;
        let visible_angle = radius / center_dist;

        let mut visible: Vec<Visible> = Vec::new();
        for loc in &self.locations {
            let (loc_x, loc_y, loc_z) = mat.transform(loc.s_x, loc.s_y, loc.s_z);
            let cos_angle = loc_z / radius;
            if cos_angle < visible_angle {
                // location lies on the other side
                continue;
            }
            let depth = center_dist - loc_z;
            let screen_x = (loc_x * proj_dist / depth) as i32 + width / 2;
            let screen_y = (-loc_y * proj_dist / depth) as i32 + height / 2;
            if screen_x < 0 || screen_x >= width || screen_y < 0 || screen_y >= height {
                continue;
            }
            visible.push(Visible {
                loc,
                x: screen_x + shift_x,
                y: screen_y + shift_y,
                cos_angle,
                offset_x: DEFAULT_OFFSET_X,
                offset_y: DEFAULT_OFFSET_Y,
                br: Rect::default(),
            });
        }

        // back-to-front so near markers paint on top
        visible.sort_by(|a, b| a.cos_angle.total_cmp(&b.cos_angle));

        if let Some(scale) = self.font_scale {
            self.solve_conflicts(&mut visible, scale, rng);
        }

        for v in &visible {
            paint_dot(buffer, v);
        }
        if let Some(scale) = self.font_scale {
            for v in &visible {
                paint_arrow(buffer, v);
            }
            for v in &visible {
                paint_label(buffer, v, scale);
            }
        }
    }

    /// Jitter label offsets until no two bounding boxes overlap, then try to
    /// snap each label back to its default offset. Near markers are placed
    /// first so they keep their default offsets preferentially.
    fn solve_conflicts(&self, visible: &mut [Visible], scale: u32, rng: &mut Rng) {
        for i in (0..visible.len()).rev() {
            let mut jitter = 20.0;
            let mut retries = 0;
            loop {
                let br = label_rect(&visible[i], visible[i].offset_x, visible[i].offset_y, scale);
                let overlap = visible[i + 1..].iter().any(|other| br.intersects(&other.br));
                if !overlap || retries >= MAX_JITTER_RETRIES {
                    visible[i].br = br;
                    break;
                }
                visible[i].offset_x = (rng.gaussian() * jitter) as i32;
                visible[i].offset_y = (rng.gaussian() * jitter) as i32;
                jitter *= 1.05;
                retries += 1;
            }
        }

        // second pass: drop offsets that are no longer needed
        for i in 0..visible.len() {
            let check = label_rect(&visible[i], DEFAULT_OFFSET_X, DEFAULT_OFFSET_Y, scale);
            let overlap = visible
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && check.intersects(&other.br));
            if !overlap {
                visible[i].br = check;
                visible[i].offset_x = DEFAULT_OFFSET_X;
                visible[i].offset_y = DEFAULT_OFFSET_Y;
            }
        }
    }
}

/// Bounding box of a marker's label at the given offset
fn label_rect(v: &Visible, offset_x: i32, offset_y: i32, scale: u32) -> Rect {
    let w = font::text_width(v.loc.name(), scale) as i32 + 6;
    let h = (font::GLYPH_HEIGHT * scale) as i32 + 4;
    Rect {
        x: v.x + offset_x,
        y: v.y - h / 2 + offset_y,
        w,
        h,
    }
}

/// Small RGB canvas the dot/arrow/label shapes are drawn into before the
/// monochrome blend composites them onto the frame
struct Sprite {
    data: Vec<u8>,
    w: i32,
    h: i32,
}

impl Sprite {
    fn new(w: i32, h: i32) -> Self {
        Self {
            data: vec![0; (w * h * 3) as usize],
            w,
            h,
        }
    }

    #[inline]
    fn set(&mut self, x: i32, y: i32, rgb: (u8, u8, u8)) {
        if x >= 0 && x < self.w && y >= 0 && y < self.h {
            let idx = ((y * self.w + x) * 3) as usize;
            self.data[idx] = rgb.0;
            self.data[idx + 1] = rgb.1;
            self.data[idx + 2] = rgb.2;
        }
    }

    #[inline]
    fn get(&self, x: i32, y: i32) -> (u8, u8, u8) {
        let idx = ((y * self.w + x) * 3) as usize;
        (self.data[idx], self.data[idx + 1], self.data[idx + 2])
    }

    fn line(&mut self, x1: i32, y1: i32, x2: i32, y2: i32, rgb: (u8, u8, u8)) {
        let dx = (x2 - x1).abs();
        let dy = -(y2 - y1).abs();
        let sx = if x1 < x2 { 1 } else { -1 };
        let sy = if y1 < y2 { 1 } else { -1 };
        let mut err = dx + dy;
        let mut x = x1;
        let mut y = y1;
        loop {
            self.set(x, y, rgb);
            if x == x2 && y == y2 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }
}

/// Composite a monochrome sprite onto the frame at (x, y), tinted with the
/// marker color. Black is transparent, pure red and pure blue erase to
/// black, white takes the full color; any other value blends with coverage
/// in the blue channel and intensity in the red channel.
fn blend_monochrome(buffer: &mut PixelBuffer, sprite: &Sprite, color: (u8, u8, u8), x: i32, y: i32) {
    for sy in 0..sprite.h {
        let dy = y + sy;
        if dy < 0 || dy >= buffer.height() as i32 {
            continue;
        }
        for sx in 0..sprite.w {
            let dx = x + sx;
            if dx < 0 || dx >= buffer.width() as i32 {
                continue;
            }
            let src = sprite.get(sx, sy);
            match src {
                (0, 0, 0) => {}
                (255, 0, 0) | (0, 0, 255) => buffer.set_pixel(dx, dy, 0, 0, 0),
                (255, 255, 255) => buffer.set_pixel(dx, dy, color.0, color.1, color.2),
                (v, _, p) => {
                    let v = v as u32;
                    if p == 255 {
                        buffer.set_pixel(
                            dx,
                            dy,
                            (color.0 as u32 * v / 256) as u8,
                            (color.1 as u32 * v / 256) as u8,
                            (color.2 as u32 * v / 256) as u8,
                        );
                    } else {
                        let p = p as u32;
                        let dest = buffer.get_pixel(dx, dy);
                        let mix = |c: u8, d: u8| -> u8 {
                            ((p * c as u32 * v / 256 + (255 - p) * d as u32) / 256) as u8
                        };
                        buffer.set_pixel(
                            dx,
                            dy,
                            mix(color.0, dest.0),
                            mix(color.1, dest.1),
                            mix(color.2, dest.2),
                        );
                    }
                }
            }
        }
    }
}

// dot sprite: full-color core, soft ring (coverage 255, intensity 160)
const DOT_SIZE: i32 = 5;
const DOT_SHAPE: [&[u8; 5]; 5] = [
    b".sss.",
    b"swwws",
    b"swwws",
    b"swwws",
    b".sss.",
];

fn paint_dot(buffer: &mut PixelBuffer, v: &Visible) {
    let mut sprite = Sprite::new(DOT_SIZE, DOT_SIZE);
    for (y, row) in DOT_SHAPE.iter().enumerate() {
        for (x, &cell) in row.iter().enumerate() {
            let rgb = match cell {
                b'w' => (255, 255, 255),
                b's' => (160, 160, 255),
                _ => (0, 0, 0),
            };
            sprite.set(x as i32, y as i32, rgb);
        }
    }
    blend_monochrome(
        buffer,
        &sprite,
        v.loc.color(),
        v.x - DOT_SIZE / 2,
        v.y - DOT_SIZE / 2,
    );
}

/// Line from the dot to a displaced label. Very short arrows are noise and
/// are skipped.
fn paint_arrow(buffer: &mut PixelBuffer, v: &Visible) {
    if v.offset_x.abs() < MIN_ARROW && v.offset_y.abs() < MIN_ARROW {
        return;
    }

    let (mut wx, dx, x1, x2) = if v.offset_x >= 0 {
        (v.offset_x, 0, 0, v.offset_x)
    } else {
        (-v.offset_x, v.offset_x, -v.offset_x, 0)
    };
    if v.offset_x >= 0 {
        wx += 1;
    }
    let (mut wy, dy, y1, y2) = if v.offset_y >= 0 {
        (v.offset_y, 0, 0, v.offset_y)
    } else {
        (-v.offset_y, v.offset_y, -v.offset_y, 0)
    };
    if v.offset_y >= 0 {
        wy += 1;
    }

    let mut sprite = Sprite::new(wx.max(1), wy.max(1));
    sprite.line(x1, y1, x2, y2, (255, 255, 255));
    blend_monochrome(buffer, &sprite, v.loc.color(), v.x + dx, v.y + dy);
}

/// Label text with an erased seam around the glyphs so it stays readable on
/// bright terrain
fn paint_label(buffer: &mut PixelBuffer, v: &Visible, scale: u32) {
    let mask = TextMask::new(v.loc.name(), scale);
    if mask.width() == 0 {
        return;
    }
    let w = mask.width() as i32 + 6;
    let h = mask.height() as i32 + 4;
    let mut sprite = Sprite::new(w, h);

    // blue seam first, then the white text body over it
    for my in 0..mask.height() as i32 {
        for mx in 0..mask.width() as i32 {
            if mask.get(mx as u32, my as u32) == 0 {
                continue;
            }
            for (ox, oy) in [(1, 2), (2, 1), (2, 3), (3, 2)] {
                sprite.set(mx + ox, my + oy, (0, 0, 255));
            }
        }
    }
    for my in 0..mask.height() as i32 {
        for mx in 0..mask.width() as i32 {
            if mask.get(mx as u32, my as u32) != 0 {
                sprite.set(mx + 2, my + 2, (255, 255, 255));
            }
        }
    }

    blend_monochrome(
        buffer,
        &sprite,
        v.loc.color(),
        v.x + v.offset_x,
        v.y - h / 2 + v.offset_y,
    );
}

/// Parse `<lat> <lon> "name" [color=<value>]`
fn parse_marker_line(line: &str) -> Result<Location> {
    let mut parts = line.splitn(3, char::is_whitespace);
    let lat: f64 = parts
        .next()
        .context("missing latitude")?
        .parse()
        .context("invalid latitude")?;
    let lon: f64 = parts
        .next()
        .context("missing longitude")?
        .parse()
        .context("invalid longitude")?;
    let rest = parts.next().context("missing name")?;

    let open = rest.find('"').context("missing opening quote")?;
    let close = rest[open + 1..]
        .find('"')
        .map(|i| open + 1 + i)
        .context("missing closing quote")?;
    let name = &rest[open + 1..close];

    let mut color = (255, 0, 0);
    if let Some(pos) = rest[close + 1..].find("color=") {
        let value = rest[close + 1 + pos + 6..]
            .split_whitespace()
            .next()
            .unwrap_or("");
        if let Some(c) = parse_color(value) {
            color = c;
        }
    }

    Ok(Location::new(lat, lon, name, color))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_line() {
        let loc = parse_marker_line("48.15 11.58 \"Munich\"").unwrap();
        assert_eq!(loc.name(), "Munich");
        assert_eq!(loc.color(), (255, 0, 0));
    }

    #[test]
    fn test_parse_line_with_color() {
        let loc = parse_marker_line("35.68 139.77 \"Tokyo\" color=green").unwrap();
        assert_eq!(loc.color(), (0, 255, 0));
        let loc = parse_marker_line("0 0 \"Origin\" color=#102030").unwrap();
        assert_eq!(loc.color(), (16, 32, 48));
    }

    #[test]
    fn test_parse_unknown_color_falls_back_to_red() {
        let loc = parse_marker_line("1 2 \"X\" color=nosuchcolor").unwrap();
        assert_eq!(loc.color(), (255, 0, 0));
    }

    #[test]
    fn test_parse_rejects_malformed_lines() {
        assert!(parse_marker_line("onlyoneword").is_err());
        assert!(parse_marker_line("12.0 13.0 no quotes here").is_err());
        assert!(parse_marker_line("abc 13.0 \"name\"").is_err());
    }

    #[test]
    fn test_marker_file_comments_and_blanks() {
        let dir = std::env::temp_dir().join("globewall-marker-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("markers.txt");
        std::fs::write(&path, "# comment\n\n10 20 \"A\"\n  # indented comment\n-5 -6 \"B\" color=blue\n").unwrap();

        let mut list = MarkerList::new();
        list.append_from_file(&path).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list.locations[1].color(), (0, 0, 255));
    }

    #[test]
    fn test_unit_vector_on_sphere() {
        let loc = Location::new(48.0, 11.0, "x", (255, 0, 0));
        let len = (loc.s_x * loc.s_x + loc.s_y * loc.s_y + loc.s_z * loc.s_z).sqrt();
        assert!((len - 1.0).abs() < 1e-12);
        // equator, prime meridian points straight at the camera axis
        let origin = Location::new(0.0, 0.0, "o", (255, 0, 0));
        assert!((origin.s_z - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_render_paints_center_marker() {
        // viewpoint 0N 0E, marker at 0N 0E: dot lands mid-screen
        let radius = 1000.0;
        let mut mat = RotMatrix::new(0.0, 0.0, 0.0, radius);
        mat.transpose();

        let mut list = MarkerList::new();
        list.set_font_scale(None);
        list.append(Location::new(0.0, 0.0, "center", (0, 255, 0)));

        let mut buffer = PixelBuffer::new(101, 101);
        let mut rng = Rng::new(1);
        list.render(&mat, &mut buffer, radius, 3000.0, 5000.0, 0, 0, &mut rng);

        assert_eq!(buffer.get_pixel(50, 50), (0, 255, 0));
    }

    #[test]
    fn test_no_font_paints_dots_only() {
        let radius = 1000.0;
        let mut mat = RotMatrix::new(0.0, 0.0, 0.0, radius);
        mat.transpose();

        let mut list = MarkerList::new();
        list.set_font_scale(None);
        list.append(Location::new(0.0, 0.0, "center", (0, 255, 0)));

        let mut buffer = PixelBuffer::new(101, 101);
        let mut rng = Rng::new(1);
        list.render(&mat, &mut buffer, radius, 3000.0, 5000.0, 0, 0, &mut rng);

        // nothing outside the 5x5 dot footprint: no arrow, no label
        for y in 0..101i32 {
            for x in 0..101i32 {
                if (x - 50).abs() <= 2 && (y - 50).abs() <= 2 {
                    continue;
                }
                assert_eq!(
                    buffer.get_pixel(x, y),
                    (0, 0, 0),
                    "stray pixel at {},{}",
                    x,
                    y
                );
            }
        }

        // the same scene with a font does paint label pixels out there
        let mut list = MarkerList::new();
        list.set_font_scale(Some(1));
        list.append(Location::new(0.0, 0.0, "center", (0, 255, 0)));
        let mut buffer = PixelBuffer::new(101, 101);
        list.render(&mat, &mut buffer, radius, 3000.0, 5000.0, 0, 0, &mut rng);
        let mut outside = false;
        for y in 0..101i32 {
            for x in 0..101i32 {
                if ((x - 50).abs() > 2 || (y - 50).abs() > 2)
                    && buffer.get_pixel(x, y) != (0, 0, 0)
                {
                    outside = true;
                }
            }
        }
        assert!(outside, "label never painted");
    }

    #[test]
    fn test_render_culls_far_side() {
        let radius = 1000.0;
        let mut mat = RotMatrix::new(0.0, 0.0, 0.0, radius);
        mat.transpose();

        let mut list = MarkerList::new();
        list.set_font_scale(None);
        // antipode of the viewpoint
        list.append(Location::new(0.0, 180.0, "hidden", (255, 255, 255)));

        let mut buffer = PixelBuffer::new(64, 64);
        let mut rng = Rng::new(1);
        list.render(&mat, &mut buffer, radius, 3000.0, 5000.0, 0, 0, &mut rng);

        assert!(buffer.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_blend_white_takes_marker_color() {
        let mut buffer = PixelBuffer::new(4, 4);
        buffer.clear(50, 50, 50);
        let mut sprite = Sprite::new(1, 1);
        sprite.set(0, 0, (255, 255, 255));
        blend_monochrome(&mut buffer, &sprite, (10, 200, 30), 1, 1);
        assert_eq!(buffer.get_pixel(1, 1), (10, 200, 30));
        // neighbors untouched
        assert_eq!(buffer.get_pixel(0, 0), (50, 50, 50));
    }

    #[test]
    fn test_blend_black_is_transparent_and_blue_erases() {
        let mut buffer = PixelBuffer::new(2, 1);
        buffer.clear(80, 80, 80);
        let mut sprite = Sprite::new(2, 1);
        sprite.set(0, 0, (0, 0, 0));
        sprite.set(1, 0, (0, 0, 255));
        blend_monochrome(&mut buffer, &sprite, (255, 0, 0), 0, 0);
        assert_eq!(buffer.get_pixel(0, 0), (80, 80, 80));
        assert_eq!(buffer.get_pixel(1, 0), (0, 0, 0));
    }

    #[test]
    fn test_blend_partial_coverage_mixes_with_dest() {
        let mut buffer = PixelBuffer::new(1, 1);
        buffer.clear(100, 100, 100);
        let mut sprite = Sprite::new(1, 1);
        // coverage 128, intensity 255
        sprite.set(0, 0, (255, 0, 128));
        blend_monochrome(&mut buffer, &sprite, (200, 200, 200), 0, 0);
        let (r, _, _) = buffer.get_pixel(0, 0);
        // halfway between dest 100 and color ~199
        assert!(r > 120 && r < 180, "blended r {}", r);
    }

    #[test]
    fn test_solve_conflicts_separates_overlapping_labels() {
        let a = Location::new(0.0, 0.0, "Alpha", (255, 0, 0));
        let b = Location::new(0.0, 0.0, "Bravo", (255, 0, 0));
        let list = MarkerList::new();
        let mut visible = vec![
            Visible {
                loc: &a,
                x: 50,
                y: 50,
                cos_angle: 1.0,
                offset_x: DEFAULT_OFFSET_X,
                offset_y: DEFAULT_OFFSET_Y,
                br: Rect::default(),
            },
            Visible {
                loc: &b,
                x: 50,
                y: 50,
                cos_angle: 1.0,
                offset_x: DEFAULT_OFFSET_X,
                offset_y: DEFAULT_OFFSET_Y,
                br: Rect::default(),
            },
        ];
        let mut rng = Rng::new(3);
        list.solve_conflicts(&mut visible, 1, &mut rng);
        assert!(!visible[0].br.intersects(&visible[1].br));
    }
}
