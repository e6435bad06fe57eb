//! 3x3 rotation + scale matrix for mapping camera-space points onto the globe
//!
//! The forward matrix takes a point on the view-aligned sphere into
//! planet-local coordinates (for latitude/longitude lookup); the transposed
//! matrix is its orthonormal inverse and maps planet-local unit vectors back
//! toward the camera (used by the grid and marker projection).

/// Rotation matrix built from in-plane rotation, view longitude and view
/// latitude, uniformly scaled by `radius`.
///
/// Angle conventions: positive rotation is clockwise on screen, longitude is
/// east-positive. All angles in radians.
#[derive(Debug, Clone, Copy)]
pub struct RotMatrix {
    m11: f64,
    m12: f64,
    m13: f64,
    m21: f64,
    m22: f64,
    m23: f64,
    m31: f64,
    m32: f64,
    m33: f64,
}

impl RotMatrix {
    pub fn new(rot: f64, lon: f64, lat: f64, radius: f64) -> Self {
        let crot = rot.cos() * radius;
        let srot = rot.sin() * radius;
        let clon = lon.cos();
        let slon = lon.sin();
        let clat = lat.cos();
        let slat = lat.sin();

        Self {
            m11: crot * clon - slat * slon * srot,
            m12: srot * clon - slat * slon * crot,
            m13: clat * slon * radius,
            m21: srot * clat,
            m22: clat * crot,
            m23: slat * radius,
            m31: -slon * crot - slat * clon * srot,
            m32: slon * srot - slat * clon * crot,
            m33: clat * clon * radius,
        }
    }

    /// Apply the matrix to a vector
    #[inline]
    pub fn transform(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        (
            self.m11 * x + self.m12 * y + self.m13 * z,
            self.m21 * x + self.m22 * y + self.m23 * z,
            self.m31 * x + self.m32 * y + self.m33 * z,
        )
    }

    /// Swap the off-diagonal pairs in place. For radius 1 the matrix is
    /// orthonormal and this yields the exact inverse rotation.
    pub fn transpose(&mut self) {
        std::mem::swap(&mut self.m12, &mut self.m21);
        std::mem::swap(&mut self.m13, &mut self.m31);
        std::mem::swap(&mut self.m23, &mut self.m32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_2, PI};

    const EPS: f64 = 1e-9;

    fn assert_vec_close(a: (f64, f64, f64), b: (f64, f64, f64)) {
        assert!(
            (a.0 - b.0).abs() < EPS && (a.1 - b.1).abs() < EPS && (a.2 - b.2).abs() < EPS,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_identity_at_zero_angles() {
        let mat = RotMatrix::new(0.0, 0.0, 0.0, 1.0);
        assert_vec_close(mat.transform(1.0, 0.0, 0.0), (1.0, 0.0, 0.0));
        assert_vec_close(mat.transform(0.0, 1.0, 0.0), (0.0, 1.0, 0.0));
        assert_vec_close(mat.transform(0.0, 0.0, 1.0), (0.0, 0.0, 1.0));
    }

    #[test]
    fn test_longitude_quarter_turn() {
        // view longitude 90 degrees east maps the camera axis onto +x
        let mat = RotMatrix::new(0.0, FRAC_PI_2, 0.0, 1.0);
        assert_vec_close(mat.transform(0.0, 0.0, 1.0), (1.0, 0.0, 0.0));
    }

    #[test]
    fn test_transpose_inverts_rotation() {
        let rot = 0.7;
        let lon = -2.1;
        let lat = 0.9;
        let mat = RotMatrix::new(rot, lon, lat, 1.0);
        let mut inv = mat;
        inv.transpose();

        let v = (0.3, -0.8, 0.52);
        let (x, y, z) = mat.transform(v.0, v.1, v.2);
        assert_vec_close(inv.transform(x, y, z), v);
    }

    #[test]
    fn test_radius_scales_output() {
        let mat = RotMatrix::new(0.0, 0.0, 0.0, 1000.0);
        let (x, y, z) = mat.transform(0.0, 0.0, 1.0);
        assert_vec_close((x, y, z), (0.0, 0.0, 1000.0));
    }

    #[test]
    fn test_rotation_preserves_length() {
        let mat = RotMatrix::new(1.3, 0.4, -0.6, 1.0);
        let (x, y, z) = mat.transform(0.6, 0.0, 0.8);
        let len = (x * x + y * y + z * z).sqrt();
        assert!((len - 1.0).abs() < EPS);
    }

    #[test]
    fn test_pole_view_maps_axis_to_pole() {
        // looking at the north pole sends the camera axis to +y
        let mat = RotMatrix::new(0.0, 0.0, FRAC_PI_2, 1.0);
        assert_vec_close(mat.transform(0.0, 0.0, 1.0), (0.0, 1.0, 0.0));
        // full turn of longitude is a no-op
        let mat = RotMatrix::new(0.0, 2.0 * PI, 0.0, 1.0);
        assert_vec_close(mat.transform(0.0, 0.0, 1.0), (0.0, 0.0, 1.0));
    }
}
