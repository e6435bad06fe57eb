//! Sphere renderer
//!
//! Casts one ray per pixel from a camera on the +z axis against a sphere of
//! fixed radius at the origin, rotates each hit into planet coordinates and
//! samples the day map there. A night map, cloud layer, coordinate grid,
//! marker overlay and info label are composited on top. With no in-plane
//! rotation only the right half of the globe is traced; the left half is
//! mirrored, resampling at the mirrored longitude with its own light angle.

use std::f64::consts::PI;
use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::celestial;
use crate::font::TextMask;
use crate::markers::MarkerList;
use crate::stars::StarField;
use crate::texture::{cloud_filter_table, FileWatch, TextureMap};
use crate::transform::RotMatrix;
use crate::util::Rng;

const SPHERE_RADIUS: f64 = 1000.0;

/// How grid dots are painted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridStyle {
    /// plain white dots
    Dull,
    /// terrain color brightened 3x
    Nice,
}

pub struct SphereRenderer {
    buffer: PixelBuffer,
    map: TextureMap,
    map_night: Option<TextureMap>,
    map_cloud: Option<TextureMap>,
    cloud_watch: Option<FileWatch>,
    cloud_table: [u8; 256],
    back_image: Option<TextureMap>,
    stars: Option<StarField>,
    markers: Option<MarkerList>,
    rng: Rng,

    radius: f64,
    view_long: f64,
    view_lat: f64,
    sun_long: f64,
    sun_lat: f64,
    light_x: f64,
    light_y: f64,
    light_z: f64,
    fov: f64,
    zoom: f64,
    proj_dist: f64,
    center_dist: f64,
    ambient_red: f64,
    ambient_green: f64,
    ambient_blue: f64,
    shade_area: f64,
    trans: f64,
    rot: f64,
    shift_x: i32,
    shift_y: i32,
    grid: Option<GridStyle>,
    d_gridline: f64,
    d_griddot: f64,
    show_label: bool,
    label_x: i32,
    label_y: i32,
    time_to_render: i64,
}

impl SphereRenderer {
    pub fn new(width: u32, height: u32, map: TextureMap, seed: u64) -> Self {
        let mut renderer = Self {
            buffer: PixelBuffer::new(width, height),
            map,
            map_night: None,
            map_cloud: None,
            cloud_watch: None,
            cloud_table: cloud_filter_table(120),
            back_image: None,
            stars: None,
            markers: None,
            rng: Rng::new(seed),
            radius: SPHERE_RADIUS,
            view_long: 0.0,
            view_lat: 0.0,
            sun_long: 0.0,
            sun_lat: 0.0,
            light_x: 0.0,
            light_y: 0.0,
            light_z: 1.0,
            fov: 0.5 * PI / 180.0,
            zoom: 0.9,
            proj_dist: 0.0,
            center_dist: 0.0,
            ambient_red: 0.15,
            ambient_green: 0.15,
            ambient_blue: 0.15,
            shade_area: 1.0,
            trans: 0.0,
            rot: 0.0,
            shift_x: 0,
            shift_y: 0,
            grid: None,
            d_gridline: 15.0 * PI / 180.0,
            d_griddot: PI / 180.0,
            show_label: true,
            label_x: -5,
            label_y: 5,
            time_to_render: 0,
        };
        renderer.calc_distance();
        renderer
    }

    pub fn image(&self) -> &PixelBuffer {
        &self.buffer
    }

    pub fn set_night_map(&mut self, map: TextureMap) {
        self.map_night = Some(map);
    }

    /// Register the cloud map. The file is loaded (and reloaded whenever it
    /// changes on disk) by `reload_clouds`.
    pub fn set_cloud_map(&mut self, path: PathBuf, filter_threshold: u8) {
        self.cloud_table = cloud_filter_table(filter_threshold);
        self.cloud_watch = Some(FileWatch::new(path));
    }

    /// Non-tiled backgrounds are stretched to the canvas once, up front
    pub fn set_back_image(&mut self, image: TextureMap, tiled: bool) {
        self.back_image = Some(if tiled {
            image
        } else {
            image.scaled(self.buffer.width() as usize, self.buffer.height() as usize)
        });
    }

    pub fn set_markers(&mut self, list: MarkerList) {
        self.markers = Some(list);
    }

    pub fn set_stars(&mut self, frequency: f64, show: bool) {
        self.stars = if show {
            Some(StarField::new(
                frequency,
                self.buffer.width(),
                self.buffer.height(),
                &mut self.rng,
            ))
        } else {
            None
        };
    }

    /// Set the viewpoint in degrees. Latitude overflow past a pole flips to
    /// the far meridian; longitude wraps to [-180, 180].
    pub fn set_view_pos(&mut self, mut lat: f64, mut lon: f64) {
        while lat >= 360.0 {
            lat -= 360.0;
        }
        while lat <= -360.0 {
            lat += 360.0;
        }
        if lat > 90.0 {
            lat = 90.0 - (lat - 90.0);
            lon += 180.0;
        }
        if lat < -90.0 {
            lat = -90.0 + (-lat - 90.0);
            lon += 180.0;
        }

        while lon >= 360.0 {
            lon -= 360.0;
        }
        while lon <= -360.0 {
            lon += 360.0;
        }
        if lon > 180.0 {
            lon = -180.0 + (lon - 180.0);
        }
        if lon < -180.0 {
            lon = 180.0 + (lon + 180.0);
        }

        self.view_lat = lat * PI / 180.0;
        self.view_long = lon * PI / 180.0;
    }

    /// Current viewpoint in degrees
    pub fn view_position(&self) -> (f64, f64) {
        (
            self.view_lat * 180.0 / PI,
            self.view_long * 180.0 / PI,
        )
    }

    pub fn sun_position(&self) -> (f64, f64) {
        (self.sun_lat * 180.0 / PI, self.sun_long * 180.0 / PI)
    }

    /// In-plane rotation in degrees. Nonzero disables the mirror shortcut.
    pub fn set_rotation(&mut self, degrees: f64) {
        self.rot = degrees * PI / 180.0;
    }

    pub fn set_zoom(&mut self, zoom: f64) {
        self.zoom = zoom;
        self.calc_distance();
    }

    pub fn set_fov(&mut self, degrees: f64) {
        self.fov = degrees * PI / 180.0;
        self.calc_distance();
    }

    pub fn set_shift(&mut self, x: i32, y: i32) {
        self.shift_x = x;
        self.shift_y = y;
    }

    pub fn set_label_pos(&mut self, x: i32, y: i32) {
        self.label_x = x;
        self.label_y = y;
    }

    pub fn show_label(&mut self, show: bool) {
        self.show_label = show;
    }

    pub fn set_shade_area(&mut self, area: f64) {
        self.shade_area = area;
    }

    /// Terminator softness, clamped to [0, 0.9999]
    pub fn set_transition(&mut self, t: f64) {
        self.trans = t.clamp(0.0, 0.9999);
    }

    pub fn transition(&self) -> f64 {
        self.trans
    }

    /// Ambient light per channel. With a night map loaded the values are
    /// calibrated instead by random-sampling both maps, so that unlit
    /// terrain fades into the night map's brightness.
    pub fn set_ambient_rgb(&mut self, red: f64, green: f64, blue: f64) {
        if let Some(night) = &self.map_night {
            let samples = 100;
            let mut day_tot = (0i64, 0i64, 0i64);
            let mut night_tot = (0i64, 0i64, 0i64);
            for _ in 0..samples {
                let longitude = self.rng.below(3600) as f64 * PI / 1800.0;
                let latitude = self.rng.below(1800) as f64 * PI / 1800.0 - PI / 2.0;
                let (r, g, b) = self.map.sample_bilinear(longitude, latitude);
                day_tot.0 += r as i64;
                day_tot.1 += g as i64;
                day_tot.2 += b as i64;
                let (r, g, b) = night.sample_bilinear(longitude, latitude);
                night_tot.0 += r as i64;
                night_tot.1 += g as i64;
                night_tot.2 += b as i64;
            }
            let ratio = |n: i64, d: i64, fallback: f64| -> f64 {
                if d > 0 {
                    n as f64 / d as f64
                } else {
                    fallback
                }
            };
            self.ambient_red = ratio(night_tot.0, day_tot.0, red);
            self.ambient_green = ratio(night_tot.1, day_tot.1, green);
            self.ambient_blue = ratio(night_tot.2, day_tot.2, blue);
        } else {
            self.ambient_red = red;
            self.ambient_green = green;
            self.ambient_blue = blue;
        }
    }

    /// Set the time to render at and recompute the sun's light vector
    pub fn set_time(&mut self, t: i64) {
        self.time_to_render = t;
        let (lat, lon) = celestial::sun_position(t);
        self.sun_lat = lat;
        self.sun_long = lon;
        self.calc_light_vector();
    }

    /// Place the sun directly (degrees), bypassing the ephemeris
    pub fn set_sun_position(&mut self, lat: f64, lon: f64) {
        self.sun_lat = lat * PI / 180.0;
        self.sun_long = lon * PI / 180.0;
        self.calc_light_vector();
    }

    pub fn set_grid(&mut self, style: Option<GridStyle>, lines: u32, dots: u32) {
        self.grid = style;
        if lines > 0 {
            self.d_gridline = PI / (2.0 * lines as f64);
        }
        if dots > 0 {
            self.d_griddot = 2.0 * PI / dots as f64;
        }
    }

    fn calc_light_vector(&mut self) {
        self.light_x = self.sun_lat.cos() * self.sun_long.sin();
        self.light_y = self.sun_lat.sin();
        self.light_z = self.sun_lat.cos() * self.sun_long.cos();
    }

    fn calc_distance(&mut self) {
        let smaller = self.buffer.width().min(self.buffer.height()) as f64;
        // distance of camera to projection plane
        self.proj_dist = smaller / self.fov.tan();
        let x = self.zoom * smaller / 2.0;
        let tan_a = x / self.proj_dist;
        // distance of camera to the center of the sphere
        self.center_dist = self.radius / tan_a.atan().sin();
    }

    /// Reload the cloud map if its file changed on disk. Called once per
    /// frame; a missing file leaves the previous clouds in place.
    pub fn reload_clouds(&mut self) -> Result<()> {
        let Some(watch) = &mut self.cloud_watch else {
            return Ok(());
        };
        if !watch.changed() {
            return Ok(());
        }
        let mut map = TextureMap::load(watch.path())?;
        map.apply_cloud_filter(&self.cloud_table, &mut self.rng);
        self.map_cloud = Some(map);
        Ok(())
    }

    pub fn render_frame(&mut self) -> Result<()> {
        self.reload_clouds()?;

        let width = self.buffer.width() as i32;
        let height = self.buffer.height() as i32;
        let half_width = width / 2 + width % 2 - 1;

        self.buffer.clear(0, 0, 0);
        self.copy_back_image();
        if let Some(stars) = &self.stars {
            stars.render(&mut self.buffer);
        }

        let mat = RotMatrix::new(self.rot, self.view_long, self.view_lat, 1.0);

        let dir_z = -self.proj_dist;
        // constant coefficients of the ray/sphere quadratic
        let c = self.center_dist * self.center_dist - self.radius * self.radius;
        let b = 2.0 * self.center_dist * dir_z;

        // radius of the projected sphere on screen
        let radius_proj = (b * b / (4.0 * c) - dir_z * dir_z).sqrt() as i32;

        let starty = (height / 2 - radius_proj - 1).max(0);
        let endy = height - starty - 1;

        for py in starty..=endy {
            let temp = radius_proj * radius_proj - (py - height / 2) * (py - height / 2);
            let startx = if temp >= 0 {
                (width / 2 - (temp as f64).sqrt() as i32).max(0)
            } else {
                width / 2
            };
            let endx = width - startx - 1;

            if py + self.shift_y < 0 || py + self.shift_y >= height {
                continue;
            }

            let mirror = self.rot == 0.0;
            let last_x = if mirror { half_width.min(endx) } else { endx };

            for px in startx..=last_x {
                let dir_x = (px - width / 2) as f64;
                let dir_y = (-py + height / 2) as f64;

                let a = dir_x * dir_x + dir_y * dir_y + dir_z * dir_z;
                let radikand = b * b - 4.0 * a * c;
                if radikand < 0.0 {
                    // ray misses the sphere
                    continue;
                }
                let root = radikand.sqrt();
                let s1 = (-b + root) / (2.0 * a);
                let s2 = (-b - root) / (2.0 * a);
                // smaller solution is the nearer intersection
                let s = s1.min(s2);
                let sp_x = s * dir_x;
                let sp_y = s * dir_y;
                let sp_z = self.center_dist + s * dir_z;

                let (hit_x, hit_y, hit_z) = mat.transform(sp_x, sp_y, sp_z);

                let mut longitude = (hit_x / hit_z).atan();
                if hit_z < 0.0 {
                    longitude += PI;
                }
                let r = (hit_x * hit_x + hit_z * hit_z).sqrt();
                let latitude = (-hit_y / r).atan();

                let light_angle =
                    self.shaded_angle(self.light_x * hit_x + self.light_y * hit_y + self.light_z * hit_z);
                let (cr, cg, cb) = self.get_pixel_color(longitude, latitude, light_angle);
                self.buffer
                    .set_pixel(px + self.shift_x, py + self.shift_y, cr, cg, cb);

                if mirror {
                    // left half: mirror position, recompute the light angle
                    let (h2_x, h2_y, h2_z) = mat.transform(-sp_x, sp_y, sp_z);
                    let light_angle = self.shaded_angle(
                        self.light_x * h2_x + self.light_y * h2_y + self.light_z * h2_z,
                    );
                    let (cr, cg, cb) =
                        self.get_pixel_color(2.0 * self.view_long - longitude, latitude, light_angle);
                    self.buffer.set_pixel(
                        width - 1 - px + self.shift_x,
                        py + self.shift_y,
                        cr,
                        cg,
                        cb,
                    );
                }
            }
        }

        if self.grid.is_some() {
            self.draw_grid();
        }
        self.draw_markers();
        if self.show_label {
            self.draw_label();
        }
        Ok(())
    }

    /// Cosine of the sun angle, softened by the terminator transition.
    /// The exponent only applies on the lit side.
    #[inline]
    fn shaded_angle(&self, dot: f64) -> f64 {
        let angle = dot / self.radius;
        if angle > 0.0 {
            angle.powf(1.0 - self.trans)
        } else {
            angle
        }
    }

    /// Day/night/cloud compositing for one surface point. `angle` is the
    /// cosine of the local sun angle.
    fn get_pixel_color(&self, longitude: f64, latitude: f64, angle: f64) -> (u8, u8, u8) {
        let shade_angle = if self.shade_area != 0.0 {
            angle / self.shade_area
        } else {
            1.0
        };
        let shade = |c: f64, ambient: f64| c * (ambient + shade_angle * (1.0 - ambient));

        let (mut r, mut g, mut b);
        if let Some(night) = &self.map_night {
            if angle > self.shade_area {
                let (dr, dg, db) = self.map.sample_bilinear(longitude, latitude);
                r = dr as f64;
                g = dg as f64;
                b = db as f64;
            } else if angle < -0.1 {
                let (nr, ng, nb) = night.sample_bilinear(longitude, latitude);
                r = nr as f64;
                g = ng as f64;
                b = nb as f64;
            } else if angle > 0.1 {
                let (dr, dg, db) = self.map.sample_bilinear(longitude, latitude);
                r = shade(dr as f64, self.ambient_red);
                g = shade(dg as f64, self.ambient_green);
                b = shade(db as f64, self.ambient_blue);
            } else {
                // crossfade band around the terminator
                let (dr, dg, db) = self.map.sample_bilinear(longitude, latitude);
                let (nr, ng, nb) = night.sample_bilinear(longitude, latitude);
                let x = -5.0 * angle + 0.5;
                if angle > 0.0 {
                    r = x * nr as f64 + (1.0 - x) * shade(dr as f64, self.ambient_red);
                    g = x * ng as f64 + (1.0 - x) * shade(dg as f64, self.ambient_green);
                    b = x * nb as f64 + (1.0 - x) * shade(db as f64, self.ambient_blue);
                } else {
                    r = x * nr as f64 + (1.0 - x) * dr as f64 * self.ambient_red;
                    g = x * ng as f64 + (1.0 - x) * dg as f64 * self.ambient_green;
                    b = x * nb as f64 + (1.0 - x) * db as f64 * self.ambient_blue;
                }
            }
        } else {
            let (dr, dg, db) = self.map.sample_bilinear(longitude, latitude);
            r = dr as f64;
            g = dg as f64;
            b = db as f64;
            if angle < self.shade_area && angle > 0.0 {
                r = shade(r, self.ambient_red);
                g = shade(g, self.ambient_green);
                b = shade(b, self.ambient_blue);
            } else if angle < 0.0 {
                r *= self.ambient_red;
                g *= self.ambient_green;
                b *= self.ambient_blue;
            }
        }

        // clouds: opacity from the filtered cloud map, lit by ambient light
        if let Some(clouds) = &self.map_cloud {
            let (cr, cg, cb) = clouds.sample_bilinear(longitude, latitude);
            let mut cr = cr as f64;
            let mut cg = cg as f64;
            let mut cb = cb as f64;

            let mut ar = 256.0;
            let mut ag = 256.0;
            let mut ab = 256.0;
            if angle > 0.0 && angle < self.shade_area {
                ar *= self.ambient_red + shade_angle * (1.0 - self.ambient_red);
                ag *= self.ambient_green + shade_angle * (1.0 - self.ambient_green);
                ab *= self.ambient_blue + shade_angle * (1.0 - self.ambient_blue);
            } else if angle <= 0.0 {
                ar *= self.ambient_red;
                ag *= self.ambient_green;
                ab *= self.ambient_blue;
            }
            // let city lights show through the cloud cover
            if r > ar && g > ag && b > ab {
                cr /= 2.0;
                cg /= 2.0;
                cb /= 2.0;
            }
            r = (ar * cr + r * (256.0 - cr)) / 256.0;
            g = (ag * cg + g * (256.0 - cg)) / 256.0;
            b = (ab * cb + b * (256.0 - cb)) / 256.0;
        }

        (
            r.clamp(0.0, 255.0) as u8,
            g.clamp(0.0, 255.0) as u8,
            b.clamp(0.0, 255.0) as u8,
        )
    }

    fn copy_back_image(&mut self) {
        let Some(back) = &self.back_image else {
            return;
        };
        let bw = back.width();
        let bh = back.height();
        for y in 0..self.buffer.height() as usize {
            let by = y % bh;
            for x in 0..self.buffer.width() as usize {
                let (r, g, b) = back.texel(x % bw, by);
                self.buffer.set_pixel(x as i32, y as i32, r, g, b);
            }
        }
    }

    /// Latitude rings and meridians as dotted lines on the visible hemisphere
    fn draw_grid(&mut self) {
        let Some(style) = self.grid else {
            return;
        };

        let mut mat = RotMatrix::new(self.rot, self.view_long, self.view_lat, self.radius);
        mat.transpose();

        let visible_angle = self.radius / self.center_dist;
        let max_lat = PI / 2.0 - self.d_gridline;

        // latitude rings
        let mut lat = -max_lat;
        while lat <= max_lat + 0.01 {
            let mut lon = -PI;
            while lon < PI {
                self.draw_grid_dot(&mat, style, lat, lon, visible_angle);
                lon += self.d_griddot;
            }
            lat += self.d_gridline;
        }

        // meridians
        let mut lon = -PI;
        while lon < PI {
            let mut lat = -max_lat;
            while lat <= max_lat {
                self.draw_grid_dot(&mat, style, lat, lon, visible_angle);
                lat += self.d_griddot;
            }
            lon += self.d_gridline;
        }
    }

    fn draw_grid_dot(
        &mut self,
        mat: &RotMatrix,
        style: GridStyle,
        lat: f64,
        lon: f64,
        visible_angle: f64,
    ) {
        let s_x = lat.cos() * lon.sin();
        let s_y = lat.sin();
        let s_z = lat.cos() * lon.cos();
        let (loc_x, loc_y, loc_z) = mat.transform(s_x, s_y, s_z);

        let cos_angle = loc_z / self.radius;
        if cos_angle < visible_angle {
            // location lies on the other side
            return;
        }

        let width = self.buffer.width() as i32;
        let height = self.buffer.height() as i32;
        let depth = self.center_dist - loc_z;
        let screen_x = (loc_x * self.proj_dist / depth) as i32 + width / 2 + self.shift_x;
        let screen_y = (-loc_y * self.proj_dist / depth) as i32 + height / 2 + self.shift_y;
        if screen_x < 0 || screen_x >= width || screen_y < 0 || screen_y >= height {
            return;
        }

        match style {
            GridStyle::Nice => {
                let light_angle = self.light_x * s_x + self.light_y * s_y + self.light_z * s_z;
                let (r, g, b) = self.get_pixel_color(lon, -lat, light_angle);
                self.buffer.set_pixel(
                    screen_x,
                    screen_y,
                    ((r as u32 * 3).min(255)) as u8,
                    ((g as u32 * 3).min(255)) as u8,
                    ((b as u32 * 3).min(255)) as u8,
                );
            }
            GridStyle::Dull => {
                self.buffer.set_pixel(screen_x, screen_y, 255, 255, 255);
            }
        }
    }

    fn draw_markers(&mut self) {
        let Some(markers) = self.markers.take() else {
            return;
        };
        // matrix of render_frame, transposed
        let mut mat = RotMatrix::new(self.rot, self.view_long, self.view_lat, self.radius);
        mat.transpose();
        markers.render(
            &mat,
            &mut self.buffer,
            self.radius,
            self.center_dist,
            self.proj_dist,
            self.shift_x,
            self.shift_y,
            &mut self.rng,
        );
        self.markers = Some(markers);
    }

    /// Date, viewpoint and sun position in a corner of the frame
    fn draw_label(&mut self) {
        let dt: DateTime<Local> = DateTime::from_timestamp(self.time_to_render, 0)
            .unwrap_or_default()
            .with_timezone(&Local);
        let (vlat, vlon) = self.view_position();
        let (slat, slon) = self.sun_position();

        let text = format!(
            "{}\nview {:6.2}{} {:7.2}{}\nsun  {:6.2}{} {:7.2}{}",
            dt.format("%a %b %e %H:%M %Y"),
            vlat.abs(),
            if vlat < 0.0 { 'S' } else { 'N' },
            vlon.abs(),
            if vlon < 0.0 { 'W' } else { 'E' },
            slat.abs(),
            if slat < 0.0 { 'S' } else { 'N' },
            slon.abs(),
            if slon < 0.0 { 'W' } else { 'E' },
        );
        let mask = TextMask::new(&text, 1);
        let label_w = mask.width() as i32 + 10;
        let label_h = mask.height() as i32 + 10;

        let x = if self.label_x > 0 {
            self.label_x
        } else {
            self.buffer.width() as i32 - label_w + self.label_x
        };
        let y = if self.label_y > 0 {
            self.label_y
        } else {
            self.buffer.height() as i32 - label_h + self.label_y
        };

        for wy in 0..label_h {
            for wx in 0..label_w {
                let on = mask.get((wx - 5).max(0) as u32, (wy - 5).max(0) as u32) != 0
                    && wx >= 5
                    && wy >= 5;
                if on {
                    self.buffer.set_pixel(x + wx, y + wy, 255, 255, 255);
                } else {
                    // darken the backdrop so the text stays readable
                    let (r, g, b) = self.buffer.get_pixel(x + wx, y + wy);
                    self.buffer.set_pixel(x + wx, y + wy, r / 2, g / 2, b / 2);
                }
            }
        }
    }
}
