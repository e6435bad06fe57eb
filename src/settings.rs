//! Render settings
//!
//! All knobs in one serde struct: loadable from a JSON file, overridable
//! from the command line. Field defaults match the renderer's.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::renderer::GridStyle;
use crate::viewpos::ViewPosition;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub width: u32,
    pub height: u32,

    /// Day map, equirectangular. Required.
    pub map: Option<PathBuf>,
    pub night_map: Option<PathBuf>,
    pub cloud_map: Option<PathBuf>,
    /// Cloud sharpening threshold, 0 shows everything, 255 almost nothing
    pub cloud_filter: u8,
    pub back_image: Option<PathBuf>,
    pub tiled: bool,

    pub marker_files: Vec<PathBuf>,
    pub show_markers: bool,
    /// None draws dots without labels
    pub marker_font_scale: Option<u32>,

    pub show_label: bool,
    pub label_x: i32,
    pub label_y: i32,

    pub view: ViewPosition,
    pub zoom: f64,
    pub fov: f64,
    pub rotation: f64,
    pub shift_x: i32,
    pub shift_y: i32,

    pub ambient: f64,
    pub ambient_rgb: Option<(f64, f64, f64)>,
    pub shade_area: f64,
    pub transition: f64,

    pub grid: Option<GridStyle>,
    pub grid_lines: u32,
    pub grid_dots: u32,

    pub show_stars: bool,
    pub star_frequency: f64,

    /// Simulated seconds per wall-clock second
    pub time_warp: f64,
    /// Render a single frame and exit
    pub once: bool,
    pub output: PathBuf,
    /// Seconds between frames
    pub wait: u64,
    /// RNG seed; derived from the clock when absent
    pub seed: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
            map: None,
            night_map: None,
            cloud_map: None,
            cloud_filter: 120,
            back_image: None,
            tiled: false,
            marker_files: Vec::new(),
            show_markers: true,
            marker_font_scale: Some(1),
            show_label: true,
            label_x: -5,
            label_y: 5,
            view: ViewPosition::SunRelative {
                lat_offset: 0.0,
                lon_offset: 0.0,
            },
            zoom: 1.0,
            fov: 0.5,
            rotation: 0.0,
            shift_x: 0,
            shift_y: 0,
            ambient: 0.15,
            ambient_rgb: None,
            shade_area: 1.0,
            transition: 0.0,
            grid: None,
            grid_lines: 6,
            grid_dots: 15,
            show_stars: true,
            star_frequency: 0.002,
            time_warp: 1.0,
            once: false,
            output: PathBuf::from("globewall.png"),
            wait: 300,
            seed: None,
        }
    }
}

impl Settings {
    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("cannot read settings file \"{}\"", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("cannot parse settings file \"{}\"", path.display()))
    }

    /// Save settings to a JSON file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("cannot write settings file \"{}\"", path.as_ref().display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert_eq!(s.width, 1024);
        assert_eq!(s.cloud_filter, 120);
        assert!((s.fov - 0.5).abs() < 1e-12);
        assert!((s.star_frequency - 0.002).abs() < 1e-12);
        assert_eq!(
            s.view,
            ViewPosition::SunRelative {
                lat_offset: 0.0,
                lon_offset: 0.0
            }
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let s: Settings =
            serde_json::from_str(r#"{"width": 640, "grid": "nice", "zoom": 0.8}"#).unwrap();
        assert_eq!(s.width, 640);
        assert_eq!(s.height, 768);
        assert_eq!(s.grid, Some(GridStyle::Nice));
        assert!((s.zoom - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_view_position_roundtrip() {
        let mut s = Settings {
            view: ViewPosition::Orbit {
                period_hours: 2.0,
                inclination: 45.0,
                shift: 10.0,
            },
            ..Settings::default()
        };
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.view, s.view);

        s.view = ViewPosition::MoonTracking;
        let json = serde_json::to_string(&s).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.view, ViewPosition::MoonTracking);
    }

    #[test]
    fn test_load_save_roundtrip() {
        let dir = std::env::temp_dir().join("globewall-settings-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("settings.json");

        let s = Settings {
            map: Some(PathBuf::from("earth.png")),
            once: true,
            ..Settings::default()
        };
        s.save(&path).unwrap();
        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.map, s.map);
        assert!(loaded.once);
    }
}
