//! Local shading frames.
//!
//! BxDFs and phase functions work in a local coordinate system (LCS) whose
//! z-axis is the surface normal or, inside a medium, the propagation
//! direction. These helpers move vectors between that frame and world space.

use crate::Vec3;

/// Build two unit vectors `(v, u)` completing `n` to an orthonormal basis.
///
/// Branches on `|n.x|` versus `|n.y|` to stay away from the degenerate cross
/// product; `u = n × v`, so `(v, u, n)` is right-handed.
pub fn generate_orthonormal_cs(n: Vec3) -> (Vec3, Vec3) {
    let v = if n.x.abs() > n.y.abs() {
        Vec3::new(-n.z, 0.0, n.x) / (n.x * n.x + n.z * n.z).sqrt()
    } else {
        Vec3::new(0.0, n.z, -n.y) / (n.y * n.y + n.z * n.z).sqrt()
    };
    let u = n.cross(v);
    (v, u)
}

/// Express world vector `v` in the frame `(ss, ts, ns)`.
#[inline]
pub fn to_lcs(v: Vec3, ns: Vec3, ss: Vec3, ts: Vec3) -> Vec3 {
    Vec3::new(v.dot(ss), v.dot(ts), v.dot(ns))
}

/// Inverse of [`to_lcs`].
#[inline]
pub fn to_world(v: Vec3, ns: Vec3, ss: Vec3, ts: Vec3) -> Vec3 {
    ss * v.x + ts * v.y + ns * v.z
}

/// An orthonormal frame with `n` as its z-axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frame {
    pub s: Vec3,
    pub t: Vec3,
    pub n: Vec3,
}

impl Frame {
    /// Frame around a unit vector.
    pub fn from_normal(n: Vec3) -> Self {
        let (s, t) = generate_orthonormal_cs(n);
        Self { s, t, n }
    }

    #[inline]
    pub fn to_local(&self, v: Vec3) -> Vec3 {
        to_lcs(v, self.n, self.s, self.t)
    }

    #[inline]
    pub fn to_world(&self, v: Vec3) -> Vec3 {
        to_world(v, self.n, self.s, self.t)
    }
}

/// Cosine of the angle to the local z-axis.
#[inline]
pub fn cos_theta(w: Vec3) -> f32 {
    w.z
}

/// Whether two local directions lie in the same hemisphere.
#[inline]
pub fn same_hemisphere(a: Vec3, b: Vec3) -> bool {
    a.z * b.z > 0.0
}

/// Mirror `v` about `n` (both pointing away from the surface).
#[inline]
pub fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    2.0 * v.dot(n) * n - v
}
