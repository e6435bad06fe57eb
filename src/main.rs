mod buffer;
mod celestial;
mod font;
mod markers;
mod renderer;
mod settings;
mod stars;
mod texture;
mod transform;
mod util;
mod viewpos;

use std::path::PathBuf;
use std::process::exit;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use markers::MarkerList;
use renderer::{GridStyle, SphereRenderer};
use settings::Settings;
use texture::TextureMap;
use util::Rng;
use viewpos::ViewPosition;

// exit codes kept stable for wallpaper scripts
const EXIT_MAP: i32 = 22;
const EXIT_CLOUD: i32 = 21;
const EXIT_MARKER: i32 = 12;

/// Parse command line arguments into settings. A `--config` file is applied
/// first; every other flag overrides it.
fn parse_args(args: &[String]) -> Settings {
    let mut settings = Settings::default();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            settings = Settings::load(&args[i + 1]).unwrap_or_else(|e| {
                eprintln!("{:#}", e);
                exit(1);
            });
        }
        i += 1;
    }

    let take = |i: &mut usize| -> Option<String> {
        if *i + 1 < args.len() {
            *i += 1;
            Some(args[*i].clone())
        } else {
            None
        }
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                i += 1; // handled above
            },
            "--width" | "-w" => {
                if let Some(w) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.width = w;
                }
            },
            "--height" | "-h" => {
                if let Some(h) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.height = h;
                }
            },
            "--resolution" => {
                if let Some(v) = take(&mut i) {
                    let parts: Vec<&str> = v.split('x').collect();
                    if parts.len() == 2 {
                        if let (Ok(w), Ok(h)) = (parts[0].parse(), parts[1].parse()) {
                            settings.width = w;
                            settings.height = h;
                        }
                    }
                }
            },
            "--map" | "-m" => {
                if let Some(v) = take(&mut i) {
                    settings.map = Some(PathBuf::from(v));
                }
            },
            "--night-map" => {
                if let Some(v) = take(&mut i) {
                    settings.night_map = Some(PathBuf::from(v));
                }
            },
            "--cloud-map" => {
                if let Some(v) = take(&mut i) {
                    settings.cloud_map = Some(PathBuf::from(v));
                }
            },
            "--cloud-filter" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.cloud_filter = v;
                }
            },
            "--back" => {
                if let Some(v) = take(&mut i) {
                    settings.back_image = Some(PathBuf::from(v));
                }
            },
            "--tiled" => settings.tiled = true,
            "--markers" => {
                if let Some(v) = take(&mut i) {
                    settings.marker_files.push(PathBuf::from(v));
                }
            },
            "--no-markers" => settings.show_markers = false,
            "--marker-scale" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.marker_font_scale = Some(v);
                }
            },
            "--no-marker-labels" => settings.marker_font_scale = None,
            "--no-label" => settings.show_label = false,
            "--label-pos" => {
                if let Some(v) = take(&mut i) {
                    if let Some((x, y)) = parse_pair(&v) {
                        settings.label_x = x as i32;
                        settings.label_y = y as i32;
                    }
                }
            },
            "--shift" => {
                if let Some(v) = take(&mut i) {
                    if let Some((x, y)) = parse_pair(&v) {
                        settings.shift_x = x as i32;
                        settings.shift_y = y as i32;
                    }
                }
            },
            "--pos" => {
                if let Some(v) = take(&mut i) {
                    match parse_view_pos(&v) {
                        Some(pos) => settings.view = pos,
                        None => {
                            eprintln!("invalid position \"{}\"", v);
                            exit(1);
                        },
                    }
                }
            },
            "--zoom" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.zoom = v;
                }
            },
            "--fov" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.fov = v;
                }
            },
            "--rot" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.rotation = v;
                }
            },
            "--ambient" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.ambient = v;
                }
            },
            "--ambient-rgb" => {
                if let Some(v) = take(&mut i) {
                    let parts: Vec<f64> = v.split(',').filter_map(|p| p.parse().ok()).collect();
                    if parts.len() == 3 {
                        settings.ambient_rgb = Some((parts[0], parts[1], parts[2]));
                    }
                }
            },
            "--shade-area" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse::<f64>().ok()) {
                    settings.shade_area = v / 100.0;
                }
            },
            "--transition" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse::<f64>().ok()) {
                    settings.transition = v / 100.0;
                }
            },
            "--grid" => {
                settings.grid = match take(&mut i).as_deref() {
                    Some("nice") => Some(GridStyle::Nice),
                    Some("dull") => Some(GridStyle::Dull),
                    _ => None,
                };
            },
            "--grid1" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.grid_lines = v;
                }
            },
            "--grid2" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.grid_dots = v;
                }
            },
            "--no-stars" => settings.show_stars = false,
            "--star-freq" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.star_frequency = v;
                }
            },
            "--timewarp" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.time_warp = v;
                }
            },
            "--once" => settings.once = true,
            "--wait" => {
                if let Some(v) = take(&mut i).and_then(|v| v.parse().ok()) {
                    settings.wait = v;
                }
            },
            "--output" | "-o" => {
                if let Some(v) = take(&mut i) {
                    settings.output = PathBuf::from(v);
                }
            },
            "--seed" => {
                settings.seed = take(&mut i).and_then(|v| v.parse().ok());
            },
            "--help" => {
                print_usage();
                exit(0);
            },
            other => {
                eprintln!("unknown option \"{}\" (try --help)", other);
                exit(1);
            },
        }
        i += 1;
    }

    settings
}

fn print_usage() {
    println!("Usage: globewall [OPTIONS]");
    println!();
    println!("Options:");
    println!("  --config FILE         Load settings from a JSON file");
    println!("  --width W, -w W       Image width (default: 1024)");
    println!("  --height H, -h H      Image height (default: 768)");
    println!("  --resolution WxH      Image size (e.g. 1920x1080)");
    println!("  --map FILE, -m FILE   Day map, equirectangular (required)");
    println!("  --night-map FILE      Night side map");
    println!("  --cloud-map FILE      Cloud map, reloaded when it changes");
    println!("  --cloud-filter N      Cloud threshold 0-255 (default: 120)");
    println!("  --back FILE           Background image");
    println!("  --tiled               Tile the background instead of scaling");
    println!("  --markers FILE        Marker file, may be given repeatedly");
    println!("  --no-markers          Skip all marker files");
    println!("  --marker-scale N      Marker label size");
    println!("  --no-marker-labels    Marker dots without labels");
    println!("  --no-label            Hide the info label");
    println!("  --label-pos X,Y       Label corner offset (default: -5,5)");
    println!("  --shift X,Y           Move the globe off-center");
    println!("  --pos SPEC            fixed:LAT,LON | sunrel:LAT,LON | moon |");
    println!("                        random | orbit:HOURS,INCL[,SHIFT]");
    println!("  --zoom Z              Globe size factor (default: 1.0)");
    println!("  --fov DEG             Field of view (default: 0.5)");
    println!("  --rot DEG             In-plane rotation");
    println!("  --ambient A           Night side brightness (default: 0.15)");
    println!("  --ambient-rgb R,G,B   Night side brightness per channel");
    println!("  --shade-area P        Day-side shading band, percent 0-100");
    println!("  --transition P        Terminator softness, percent 0-100");
    println!("  --grid STYLE          dull (white) or nice (bright terrain)");
    println!("  --grid1 N             Grid lines per quarter (default: 6)");
    println!("  --grid2 N             Dot density per line (default: 15)");
    println!("  --no-stars            No star background");
    println!("  --star-freq F         Stars per pixel (default: 0.002)");
    println!("  --timewarp F          Simulated seconds per second");
    println!("  --once                Render one frame and exit");
    println!("  --wait SECS           Seconds between frames (default: 300)");
    println!("  --output FILE, -o     Output PNG (default: globewall.png)");
    println!("  --seed N              RNG seed for reproducible frames");
    println!("  --help                Show this help message");
}

/// Parse "X,Y" (also accepts "+X+Y" style with explicit signs)
fn parse_pair(v: &str) -> Option<(f64, f64)> {
    let parts: Vec<&str> = v.split(',').collect();
    if parts.len() == 2 {
        return Some((parts[0].parse().ok()?, parts[1].parse().ok()?));
    }
    None
}

fn parse_view_pos(v: &str) -> Option<ViewPosition> {
    match v {
        "moon" => return Some(ViewPosition::MoonTracking),
        "random" => return Some(ViewPosition::Random),
        _ => {},
    }
    let (kind, rest) = v.split_once(':')?;
    match kind {
        "fixed" => {
            let (lat, lon) = parse_pair(rest)?;
            Some(ViewPosition::Fixed { lat, lon })
        },
        "sunrel" => {
            let (lat_offset, lon_offset) = parse_pair(rest)?;
            Some(ViewPosition::SunRelative {
                lat_offset,
                lon_offset,
            })
        },
        "orbit" => {
            let parts: Vec<f64> = rest.split(',').filter_map(|p| p.parse().ok()).collect();
            match parts.as_slice() {
                [period_hours, inclination] => Some(ViewPosition::Orbit {
                    period_hours: *period_hours,
                    inclination: *inclination,
                    shift: 0.0,
                }),
                [period_hours, inclination, shift] => Some(ViewPosition::Orbit {
                    period_hours: *period_hours,
                    inclination: *inclination,
                    shift: *shift,
                }),
                _ => None,
            }
        },
        _ => None,
    }
}

fn load_map_or_exit(path: &std::path::Path) -> TextureMap {
    TextureMap::load(path).unwrap_or_else(|e| {
        eprintln!("{:#}", e);
        exit(EXIT_MAP);
    })
}

fn build_renderer(settings: &Settings, seed: u64) -> SphereRenderer {
    let Some(map_path) = &settings.map else {
        eprintln!("no map file given (use --map FILE)");
        exit(EXIT_MAP);
    };
    let map = load_map_or_exit(map_path);
    eprintln!("map size: {}x{}", map.width(), map.height());

    let mut renderer = SphereRenderer::new(settings.width, settings.height, map, seed);

    if let Some(path) = &settings.night_map {
        renderer.set_night_map(load_map_or_exit(path));
    }
    if let Some(path) = &settings.back_image {
        renderer.set_back_image(load_map_or_exit(path), settings.tiled);
    }
    if let Some(path) = &settings.cloud_map {
        renderer.set_cloud_map(path.clone(), settings.cloud_filter);
        if let Err(e) = renderer.reload_clouds() {
            eprintln!("{:#}", e);
            exit(EXIT_CLOUD);
        }
    }

    if settings.show_markers && !settings.marker_files.is_empty() {
        let mut list = MarkerList::new();
        list.set_font_scale(settings.marker_font_scale);
        for path in &settings.marker_files {
            if let Err(e) = list.append_from_file(path) {
                eprintln!("{:#}", e);
                exit(EXIT_MARKER);
            }
        }
        renderer.set_markers(list);
    }

    let (ar, ag, ab) = settings
        .ambient_rgb
        .unwrap_or((settings.ambient, settings.ambient, settings.ambient));
    renderer.set_ambient_rgb(ar, ag, ab);

    renderer.set_zoom(settings.zoom);
    renderer.set_fov(settings.fov);
    renderer.set_rotation(settings.rotation);
    renderer.set_shift(settings.shift_x, settings.shift_y);
    renderer.set_shade_area(settings.shade_area);
    renderer.set_transition(settings.transition);
    renderer.set_grid(
        settings.grid,
        settings.grid_lines,
        settings.grid_dots * settings.grid_lines * 4,
    );
    renderer.set_stars(settings.star_frequency, settings.show_stars);
    renderer.show_label(settings.show_label);
    renderer.set_label_pos(settings.label_x, settings.label_y);

    renderer
}

fn run(settings: &Settings) -> Result<()> {
    let seed = settings
        .seed
        .unwrap_or_else(|| Utc::now().timestamp() as u64);
    let mut renderer = build_renderer(settings, seed);
    let mut view_rng = Rng::new(seed.wrapping_add(1));

    let start = Utc::now().timestamp();
    loop {
        let now = Utc::now().timestamp();
        let t = if settings.time_warp == 1.0 {
            now
        } else {
            start + ((now - start) as f64 * settings.time_warp) as i64
        };

        renderer.set_time(t);
        let (lat, lon) = settings.view.compute(t, &mut view_rng);
        renderer.set_view_pos(lat, lon);

        if let Err(e) = renderer.render_frame() {
            // only the cloud hot reload can fail here
            eprintln!("{:#}", e);
            exit(EXIT_CLOUD);
        }

        renderer
            .image()
            .to_image()
            .save(&settings.output)
            .map_err(|e| anyhow::anyhow!("cannot write \"{}\": {}", settings.output.display(), e))?;

        if settings.once {
            break;
        }
        thread::sleep(Duration::from_secs(settings.wait));
    }
    Ok(())
}

fn main() {
    let args: Vec<String> = std::env::args().collect();
    let settings = parse_args(&args);
    if let Err(e) = run(&settings) {
        eprintln!("{:#}", e);
        exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        std::iter::once("globewall")
            .chain(list.iter().copied())
            .map(String::from)
            .collect()
    }

    #[test]
    fn test_marker_scale_parses_and_survives_bad_input() {
        let s = parse_args(&args(&["--marker-scale", "2"]));
        assert_eq!(s.marker_font_scale, Some(2));

        // unparsable value keeps the default instead of dropping labels
        let s = parse_args(&args(&["--marker-scale", "big"]));
        assert_eq!(s.marker_font_scale, Settings::default().marker_font_scale);

        let s = parse_args(&args(&["--no-marker-labels"]));
        assert_eq!(s.marker_font_scale, None);
    }

    #[test]
    fn test_parse_pair() {
        assert_eq!(parse_pair("3,-4"), Some((3.0, -4.0)));
        assert_eq!(parse_pair("1.5,2.5"), Some((1.5, 2.5)));
        assert_eq!(parse_pair("nope"), None);
        assert_eq!(parse_pair("1,2,3"), None);
    }

    #[test]
    fn test_parse_view_pos() {
        assert_eq!(
            parse_view_pos("fixed:48.1,11.6"),
            Some(ViewPosition::Fixed {
                lat: 48.1,
                lon: 11.6
            })
        );
        assert_eq!(
            parse_view_pos("sunrel:0,-30"),
            Some(ViewPosition::SunRelative {
                lat_offset: 0.0,
                lon_offset: -30.0
            })
        );
        assert_eq!(parse_view_pos("moon"), Some(ViewPosition::MoonTracking));
        assert_eq!(parse_view_pos("random"), Some(ViewPosition::Random));
        assert_eq!(
            parse_view_pos("orbit:2,45"),
            Some(ViewPosition::Orbit {
                period_hours: 2.0,
                inclination: 45.0,
                shift: 0.0
            })
        );
        assert_eq!(
            parse_view_pos("orbit:24,90,10"),
            Some(ViewPosition::Orbit {
                period_hours: 24.0,
                inclination: 90.0,
                shift: 10.0
            })
        );
        assert_eq!(parse_view_pos("bogus"), None);
        assert_eq!(parse_view_pos("orbit:1"), None);
    }
}
