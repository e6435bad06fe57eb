//! Sub-solar and sub-lunar point computation
//!
//! Two independent algorithms, both pure functions of a Unix timestamp:
//! the sun from Kepler's equation and Greenwich Sidereal Time, the moon
//! from the truncated periodic series in Meeus, "Astronomical Formulae
//! for Calculators", chapter 30. Results are (latitude, longitude) of the
//! point on the globe directly beneath the body, in radians.

use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::{PI, TAU};

const RADS_PER_DEG: f64 = PI / 180.0;

// Orbital elements of the sun, epoch 1990 January 0.0
const EPOCH_START: f64 = 631_065_600.0; // Unix time of the 1990.0 epoch
const ECLIPTIC_LONGITUDE_EPOCH: f64 = 279.403303 * RADS_PER_DEG;
const PERIGEE_LONGITUDE: f64 = 282.768422 * RADS_PER_DEG;
const ECCENTRICITY: f64 = 0.016713;
const MEAN_OBLIQUITY: f64 = 23.441884 * RADS_PER_DEG;

fn normalize(mut angle: f64) -> f64 {
    while angle < -PI {
        angle += TAU;
    }
    while angle > PI {
        angle -= TAU;
    }
    angle
}

fn utc(t: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(t, 0).unwrap_or_else(|| DateTime::<Utc>::UNIX_EPOCH)
}

/// Julian date of a calendar day at 0h UT (Gregorian calendar)
fn julian_date(year: i32, month: u32, day: u32) -> f64 {
    let (y, m) = if month <= 2 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };
    let a = y.div_euclid(100);
    let b = 2 - a + a / 4;
    (365.25 * (y + 4716) as f64).floor() + (30.6001 * (m + 1) as f64).floor()
        + day as f64
        + b as f64
        - 1524.5
}

/// Greenwich Sidereal Time in hours for the given instant
fn gst(t: i64) -> f64 {
    let dt = utc(t);
    let jd = julian_date(dt.year(), dt.month(), dt.day());
    let tc = (jd - 2_451_545.0) / 36_525.0;
    let mut t0 = 6.697374558 + 2400.051336 * tc + 0.000025862 * tc * tc;
    t0 = t0.rem_euclid(24.0);

    let ut = dt.hour() as f64 + dt.minute() as f64 / 60.0 + dt.second() as f64 / 3600.0;
    (t0 + ut * 1.002737909).rem_euclid(24.0)
}

/// Solve Kepler's equation E - e*sin(E) = M iteratively
fn solve_keplers_equation(m: f64) -> f64 {
    let mut e = m;
    loop {
        let delta = e - ECCENTRICITY * e.sin() - m;
        if delta.abs() <= 1e-10 {
            return e;
        }
        e -= delta / (1.0 - ECCENTRICITY * e.cos());
    }
}

/// Ecliptic longitude of the sun at the given time
fn sun_ecliptic_longitude(t: i64) -> f64 {
    let days = (t as f64 - EPOCH_START) / 86_400.0;
    let n = ((TAU / 365.242191) * days).rem_euclid(TAU);
    let mean_anomaly =
        (n + ECLIPTIC_LONGITUDE_EPOCH - PERIGEE_LONGITUDE).rem_euclid(TAU);
    let e = solve_keplers_equation(mean_anomaly);
    let v = 2.0
        * (((1.0 + ECCENTRICITY) / (1.0 - ECCENTRICITY)).sqrt() * (e / 2.0).tan()).atan();
    (v + PERIGEE_LONGITUDE).rem_euclid(TAU)
}

/// Ecliptic (lambda, beta) to equatorial right ascension / declination, radians
fn ecliptic_to_equatorial(lambda: f64, beta: f64) -> (f64, f64) {
    let sin_eps = MEAN_OBLIQUITY.sin();
    let cos_eps = MEAN_OBLIQUITY.cos();
    let alpha = (lambda.sin() * cos_eps - beta.tan() * sin_eps).atan2(lambda.cos());
    let delta = (beta.sin() * cos_eps + beta.cos() * sin_eps * lambda.sin()).asin();
    (alpha, delta)
}

/// Sub-solar point (latitude, longitude) in radians at a Unix timestamp
pub fn sun_position(t: i64) -> (f64, f64) {
    let lambda = sun_ecliptic_longitude(t);
    let (alpha, delta) = ecliptic_to_equatorial(lambda, 0.0);
    let lon = normalize(alpha - (TAU / 24.0) * gst(t));
    (delta, lon)
}

// ---------------------------------------------------------------------------
// Moon
// ---------------------------------------------------------------------------

/// Cubic polynomial a1 + t*(a2 + t*(a3 + t*a4))
fn poly(a1: f64, a2: f64, a3: f64, a4: f64, t: f64) -> f64 {
    a1 + t * (a2 + t * (a3 + t * a4))
}

/// sin of an angle given in degrees
fn s(deg: f64) -> f64 {
    (deg * RADS_PER_DEG).sin()
}

/// cos of an angle given in degrees
fn c(deg: f64) -> f64 {
    (deg * RADS_PER_DEG).cos()
}

/// Julian centuries since 1900 January 0.5 for the lunar series
fn jcentury(t: i64) -> f64 {
    let dt = utc(t);
    let (year, month) = if dt.month() < 3 {
        (dt.year() - 1, dt.month() + 12)
    } else {
        (dt.year(), dt.month())
    };
    let a = year / 100;
    let b = (2 - a + a / 4) as f64;
    let c = (365.25 * year as f64).trunc();
    let d = (30.6001 * (month + 1) as f64).trunc();
    let e = dt.day() as f64
        + dt.hour() as f64 / 24.0
        + dt.minute() as f64 / 1440.0
        + dt.second() as f64 / 86_400.0;
    let jd = b + c + d + e + 1_720_994.5;
    (jd - 2_415_020.0) / 36_525.0
}

/// Mean obliquity of the ecliptic for the 1900-based century T
fn compute_obliquity(t: f64) -> f64 {
    poly(23.452294, -1.30125e-2, -1.64e-6, 5.03e-7, t) * RADS_PER_DEG
}

/// Geocentric ecliptic (longitude, latitude) of the moon in radians.
/// Truncated periodic series; each term list is carried in full from the
/// reference so positional accuracy stays within a few arc minutes.
fn moon_ecliptic(t: f64) -> (f64, f64) {
    let mut m = poly(358.475833, 35999.04975, -1.500e-4, -3.30e-6, t);
    let mut lp = poly(270.434164, 481267.8831, -1.133e-3, 1.90e-6, t);
    let mut mp = poly(296.104608, 477198.8491, 9.192e-3, 1.44e-5, t);
    let mut d = poly(350.737486, 445267.1142, -1.436e-3, 1.90e-6, t);
    let mut f = poly(11.250889, 483202.0251, -3.211e-3, -3.00e-7, t);
    let omega = poly(259.183275, -1934.142, 2.078e-3, 2.2e-6, t);

    let venus_term = s(poly(346.56, 132.87, -9.1731e-3, 0.0, t));
    lp += 2.330e-4 * s(51.2 + 20.2 * t) + 1.964e-3 * s(omega) + 3.964e-3 * venus_term;
    m -= 1.778e-3 * s(51.2 + 20.2 * t);
    mp += 8.170e-4 * s(51.2 + 20.2 * t) + 2.541e-3 * s(omega) + 3.964e-3 * venus_term;
    d += 2.011e-3 * s(51.2 + 20.2 * t) + 1.964e-3 * s(omega) + 3.964e-3 * venus_term;
    f -= 2.4691e-2 * s(omega) - 4.3280e-3 * s(omega + 275.05 - 2.3 * t)
        + 3.9640e-3 * venus_term;

    let e = 1.0 - t * (2.495e-3 + 7.52e-6 * t);
    let e2 = e * e;

    let lambda = lp
        + 6.28875 * s(mp)
        + 1.274018 * s(2.0 * d - mp)
        + 0.658309 * s(2.0 * d)
        + 0.213616 * s(2.0 * mp)
        - e * 0.185596 * s(m)
        - 0.114336 * s(2.0 * f)
        + 0.058793 * s(2.0 * (d - mp))
        + e * 0.057212 * s(2.0 * d - m - mp)
        + 0.05332 * s(2.0 * d + mp)
        + e * 0.045874 * s(2.0 * d - m)
        + e * 0.041024 * s(mp - m)
        - 0.034718 * s(d)
        - e * 0.030465 * s(m + mp)
        + 0.015326 * s(2.0 * (d - f))
        - 0.012528 * s(2.0 * f - mp)
        - 0.01098 * s(2.0 * f - mp)
        + 0.010674 * s(4.0 * d - mp)
        + 0.010034 * s(3.0 * mp)
        + 0.008548 * s(4.0 * d - 2.0 * mp)
        - e * 0.00791 * s(m - mp + 2.0 * d)
        - e * 0.006783 * s(2.0 * d + m)
        + 0.005162 * s(mp - d)
        + e * 0.005 * s(m + d)
        + e * 0.004049 * s(mp - m + 2.0 * d)
        + 0.003996 * s(2.0 * (mp + d))
        + 0.003862 * s(4.0 * d)
        + 0.003665 * s(2.0 * d - 3.0 * mp)
        + e * 0.002695 * s(2.0 * mp - m)
        + 0.002602 * s(mp - 2.0 * f - 2.0 * d)
        + e * 0.002396 * s(2.0 * d - m - 2.0 * mp)
        - 0.002349 * s(mp + d)
        + e2 * 0.002249 * s(2.0 * (d - m))
        - e * 0.002125 * s(2.0 * mp + m)
        - e2 * 0.002079 * s(2.0 * m)
        + e2 * 0.002059 * s(2.0 * d - mp - 2.0 * m)
        - 0.001773 * s(mp + 2.0 * d - 2.0 * f)
        - 0.001595 * s(2.0 * (f + d))
        + e * 0.00122 * s(4.0 * d - m - mp)
        - 0.00111 * s(2.0 * (mp + f))
        + 0.000892 * s(mp - 3.0 * d)
        - e * 0.000811 * s(m + mp + 2.0 * d)
        + e * 0.000761 * s(4.0 * d - m - 2.0 * mp)
        + e2 * 0.000717 * s(mp - 2.0 * m)
        + e2 * 0.000704 * s(mp - 2.0 * m - 2.0 * d)
        + e * 0.000693 * s(m - 2.0 * mp + 2.0 * d)
        + e * 0.000598 * s(2.0 * d - m - 2.0 * f)
        + 0.00055 * s(mp + 4.0 * d)
        + 0.000538 * s(4.0 * mp)
        + e * 0.000521 * s(4.0 * d - m)
        + 0.000486 * s(2.0 * mp - d);

    let b = 5.128189 * s(f)
        + 0.280606 * s(mp + f)
        + 0.277693 * s(mp - f)
        + 0.173238 * s(2.0 * d - f)
        + 0.055413 * s(2.0 * d + f - mp)
        + 0.046272 * s(2.0 * d - f - mp)
        + 0.032573 * s(2.0 * d + f)
        + 0.017198 * s(2.0 * mp + f)
        + 0.009267 * s(2.0 * d + mp - f)
        + 0.008823 * s(2.0 * mp - f)
        + e * 0.008247 * s(2.0 * d - m - f)
        + 0.004323 * s(2.0 * d - f - 2.0 * mp)
        + 0.0042 * s(2.0 * d + f + mp)
        + e * 0.003372 * s(f - m - 2.0 * d)
        + e * 0.002472 * s(2.0 * d + f - m - mp)
        + e * 0.002222 * s(2.0 * d + f - m)
        + e * 0.002072 * s(2.0 * d - f - m - mp)
        + e * 0.001877 * s(f - m + mp)
        + 0.001828 * s(4.0 * d - f - mp)
        - e * 0.001803 * s(f + m)
        - 0.00175 * s(3.0 * f)
        + e * 0.00157 * s(mp - m - f)
        - 0.001487 * s(f + d)
        - e * 0.001481 * s(f + m + mp)
        + e * 0.001417 * s(f - m - mp)
        + e * 0.00135 * s(f - m)
        + 0.00133 * s(f - d)
        + 0.001106 * s(f + 3.0 * mp)
        + 0.00102 * s(4.0 * d - f)
        + 0.000833 * s(f + 4.0 * d - mp)
        + 0.000781 * s(mp - 3.0 * f)
        + 0.00067 * s(f + 4.0 * d - 2.0 * mp)
        + 0.000606 * s(2.0 * d - 3.0 * f)
        + 0.000597 * s(2.0 * d + 2.0 * mp - f)
        + e * 0.000492 * s(2.0 * d + mp - m - f)
        + 0.00045 * s(2.0 * mp - f - 2.0 * d)
        + 0.000439 * s(3.0 * mp - f)
        + 0.000423 * s(f + 2.0 * d + 2.0 * mp)
        + 0.000422 * s(2.0 * d - f - 3.0 * mp)
        - e * 0.000367 * s(m + f + 2.0 * d - mp)
        - e * 0.000353 * s(m + f + 2.0 * d)
        + 0.000331 * s(f + 4.0 * d)
        + e * 0.000317 * s(2.0 * d + f - m + mp)
        + e2 * 0.000306 * s(2.0 * (d - m) - f)
        - 0.000283 * s(mp + 3.0 * f);

    let omega1 = 0.0004664 * c(omega);
    let omega2 = 0.0000754 * c(omega + 275.05 - 2.3 * t);
    let beta = b * (1.0 - omega1 - omega2);

    (lambda * RADS_PER_DEG, beta * RADS_PER_DEG)
}

/// Equatorial right ascension (hours) and declination (radians) from
/// ecliptic coordinates, using the obliquity for century T
fn moon_ra_dec(lon: f64, lat: f64, eps: f64) -> (f64, f64) {
    let delta = (eps.sin() * lon.sin() * lat.cos() + lat.sin() * eps.cos()).asin();
    let mut alpha =
        (eps.cos() * lon.sin() - lat.tan() * eps.sin()).atan2(lon.cos()) / RADS_PER_DEG;
    alpha /= 15.0;
    alpha = alpha.rem_euclid(24.0);
    (alpha, delta)
}

/// Greenwich Mean Sidereal Time in hours, 1900-based century formula
fn gmst(t: i64) -> f64 {
    let dt = utc(t);
    let midnight = t - i64::from(dt.num_seconds_from_midnight());
    let t0 = jcentury(midnight);
    let mut g = poly(6.6460656, 2400.051262, 0.00002581, 0.0, t0);
    let ut = dt.hour() as f64 + dt.minute() as f64 / 60.0 + dt.second() as f64 / 3600.0;
    g += ut * 1.002737908;
    g.rem_euclid(24.0)
}

/// Sub-lunar point (latitude, longitude) in radians at a Unix timestamp
pub fn moon_position(t: i64) -> (f64, f64) {
    let tc = jcentury(t);
    let eps = compute_obliquity(tc);
    let (moon_lon, moon_lat) = moon_ecliptic(tc);
    let (alpha, delta) = moon_ra_dec(moon_lon, moon_lat, eps);
    let lon = normalize(TAU * (alpha - gmst(t)) / 24.0);
    (delta, lon)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> i64 {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap().timestamp()
    }

    #[test]
    fn test_julian_date_known_values() {
        // J2000.0 is JD 2451545.0 = 2000 Jan 1, 12h; at 0h UT it is 2451544.5
        assert!((julian_date(2000, 1, 1) - 2_451_544.5).abs() < 1e-9);
        assert!((julian_date(1990, 1, 1) - 2_447_892.5).abs() < 1e-9);
    }

    #[test]
    fn test_sun_latitude_at_equinox_is_near_zero() {
        // March equinox 2000 was at 07:35 UTC
        let (lat, _) = sun_position(ts(2000, 3, 20, 7, 35));
        assert!(lat.abs() < 0.01, "sub-solar latitude {} rad", lat);
    }

    #[test]
    fn test_sun_latitude_at_solstice() {
        // June solstice: sub-solar latitude near +23.44 degrees
        let (lat, _) = sun_position(ts(2000, 6, 21, 2, 0));
        assert!(
            (lat - 23.44 * RADS_PER_DEG).abs() < 0.01,
            "sub-solar latitude {} deg",
            lat / RADS_PER_DEG
        );
    }

    #[test]
    fn test_sun_longitude_near_noon_at_greenwich() {
        // at mean solar noon the sub-solar point is close to 0 longitude;
        // the equation of time keeps it within about 4 degrees year round
        let (_, lon) = sun_position(ts(2000, 6, 21, 12, 0));
        assert!(lon.abs() < 4.0 * RADS_PER_DEG, "sub-solar lon {} deg", lon / RADS_PER_DEG);
    }

    #[test]
    fn test_sun_moves_west_over_an_hour() {
        let (_, lon1) = sun_position(ts(2010, 9, 1, 10, 0));
        let (_, lon2) = sun_position(ts(2010, 9, 1, 11, 0));
        // about 15 degrees per hour, westward
        let delta = normalize(lon2 - lon1);
        assert!(
            (delta + 15.0 * RADS_PER_DEG).abs() < 0.5 * RADS_PER_DEG,
            "hourly drift {} deg",
            delta / RADS_PER_DEG
        );
    }

    #[test]
    fn test_moon_latitude_within_declination_band() {
        // sub-lunar latitude can never leave the maximum declination band
        for day in 0..60 {
            let (lat, lon) = moon_position(ts(2005, 1, 1, 0, 0) + day * 86_400);
            assert!(lat.abs() < 30.0 * RADS_PER_DEG, "lat {} deg", lat / RADS_PER_DEG);
            assert!(lon.abs() <= PI + 1e-9);
        }
    }

    #[test]
    fn test_moon_position_is_continuous() {
        // the sub-lunar point drifts smoothly, just under 15 deg/hour westward
        let t0 = ts(2015, 7, 14, 0, 0);
        let (lat1, lon1) = moon_position(t0);
        let (lat2, lon2) = moon_position(t0 + 600);
        assert!((lat2 - lat1).abs() < 0.01);
        assert!(normalize(lon2 - lon1).abs() < 0.05);
    }

    #[test]
    fn test_obliquity_reasonable() {
        let t = jcentury(ts(2000, 1, 1, 0, 0));
        let eps = compute_obliquity(t);
        assert!((eps / RADS_PER_DEG - 23.44).abs() < 0.02);
    }
}
