//! Shared utilities: deterministic RNG and color parsing

/// Simple deterministic RNG using xorshift64.
/// Every consumer (clouds, stars, markers, random view positions) draws from
/// an explicitly owned instance, so a fixed seed reproduces a frame exactly.
pub struct Rng {
    state: u64,
    // gaussian() produces deviates in pairs; the second one is kept here
    spare: Option<f64>,
}

impl Rng {
    /// Create a new RNG with the given seed
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed.max(1), // Ensure non-zero
            spare: None,
        }
    }

    /// Get the next random u64
    #[inline]
    pub fn next_u64(&mut self) -> u64 {
        self.state ^= self.state << 13;
        self.state ^= self.state >> 7;
        self.state ^= self.state << 17;
        self.state
    }

    /// Get a random f64 in [0, 1)
    #[inline]
    pub fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Get a random integer in [0, modulus)
    ///
    /// # Panics
    /// Panics in debug builds if `modulus` is zero
    #[inline]
    pub fn below(&mut self, modulus: u32) -> u32 {
        debug_assert!(modulus > 0, "below: modulus must be non-zero");
        (self.next_u64() % modulus as u64) as u32
    }

    /// Standard normal deviate via the polar (Marsaglia) method
    pub fn gaussian(&mut self) -> f64 {
        if let Some(v) = self.spare.take() {
            return v;
        }
        loop {
            let v1 = self.next_f64() * 2.0 - 1.0;
            let v2 = self.next_f64() * 2.0 - 1.0;
            let rsq = v1 * v1 + v2 * v2;
            if rsq >= 1.0 || rsq == 0.0 {
                continue;
            }
            let fac = (-2.0 * rsq.ln() / rsq).sqrt();
            self.spare = Some(v1 * fac);
            return v2 * fac;
        }
    }
}

/// Named colors accepted in marker files, a small X11-ish subset
const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("black", (0, 0, 0)),
    ("white", (255, 255, 255)),
    ("red", (255, 0, 0)),
    ("green", (0, 255, 0)),
    ("blue", (0, 0, 255)),
    ("yellow", (255, 255, 0)),
    ("cyan", (0, 255, 255)),
    ("magenta", (255, 0, 255)),
    ("orange", (255, 165, 0)),
    ("purple", (160, 32, 240)),
    ("pink", (255, 192, 203)),
    ("gray", (190, 190, 190)),
    ("grey", (190, 190, 190)),
    ("brown", (165, 42, 42)),
    ("gold", (255, 215, 0)),
    ("violet", (238, 130, 238)),
];

/// Parse `#rrggbb` or a named color. Returns None for anything else.
pub fn parse_color(s: &str) -> Option<(u8, u8, u8)> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix('#') {
        if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return None;
        }
        let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
        let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
        let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
        return Some((r, g, b));
    }
    let lower = s.to_ascii_lowercase();
    NAMED_COLORS
        .iter()
        .find(|(name, _)| *name == lower)
        .map(|&(_, rgb)| rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rng_deterministic() {
        let mut a = Rng::new(42);
        let mut b = Rng::new(42);
        for _ in 0..100 {
            assert_eq!(a.next_u64(), b.next_u64());
        }
    }

    #[test]
    fn test_below_range() {
        let mut rng = Rng::new(7);
        for _ in 0..1000 {
            let v = rng.below(360);
            assert!(v < 360);
        }
    }

    #[test]
    fn test_next_f64_range() {
        let mut rng = Rng::new(99);
        for _ in 0..1000 {
            let v = rng.next_f64();
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_gaussian_is_finite_and_centered() {
        let mut rng = Rng::new(1234);
        let mut sum = 0.0;
        for _ in 0..10_000 {
            let v = rng.gaussian();
            assert!(v.is_finite());
            sum += v;
        }
        // mean of 10k standard normal draws should be close to zero
        assert!((sum / 10_000.0).abs() < 0.1);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_color("#ff8000"), Some((255, 128, 0)));
        assert_eq!(parse_color("#FF8000"), Some((255, 128, 0)));
        assert_eq!(parse_color("#ff800"), None);
        assert_eq!(parse_color("#gg0000"), None);
    }

    #[test]
    fn test_parse_named_color() {
        assert_eq!(parse_color("red"), Some((255, 0, 0)));
        assert_eq!(parse_color("Orange"), Some((255, 165, 0)));
        assert_eq!(parse_color("nosuchcolor"), None);
    }
}
