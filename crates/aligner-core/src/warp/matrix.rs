//! 2×3 affine and 3×3 projective matrices.
//!
//! Both map a source pixel `(x, y)` to a destination pixel. Matrices are
//! row-major in the usual sense:
//!
//! ```text
//! [ a b c ]        x' = a*x + b*y + c
//! [ d e f ]        y' = d*x + e*y + f
//! [ g h i ]        w' = g*x + h*y + i   (homography only)
//! ```

use nalgebra::{Matrix2x3, Matrix3, SMatrix, SVector};

use crate::consts::MIN_QUAD_AREA;
use crate::coords::Point;
use crate::error::GeometryError;

/// Determinants below this are treated as non-invertible.
const SINGULAR_EPS: f64 = 1e-12;

/// Rotation + uniform scale + translation in one 2×3 matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Affine2 {
    pub m: Matrix2x3<f64>,
}

impl Affine2 {
    pub fn identity() -> Self {
        Self {
            m: Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0),
        }
    }

    pub fn new(m: Matrix2x3<f64>) -> Self {
        Self { m }
    }

    /// Embed as a 3×3 matrix with `[0 0 1]` as the last row.
    pub fn to_homogeneous(&self) -> Matrix3<f64> {
        let m = &self.m;
        Matrix3::new(
            m[(0, 0)],
            m[(0, 1)],
            m[(0, 2)],
            m[(1, 0)],
            m[(1, 1)],
            m[(1, 2)],
            0.0,
            0.0,
            1.0,
        )
    }

    /// Drop the last row of a 3×3 matrix. The caller guarantees it is `[0 0 1]`.
    pub fn from_homogeneous(h: &Matrix3<f64>) -> Self {
        Self {
            m: Matrix2x3::new(
                h[(0, 0)],
                h[(0, 1)],
                h[(0, 2)],
                h[(1, 0)],
                h[(1, 1)],
                h[(1, 2)],
            ),
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        let m = &self.m;
        Point::new(
            m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)],
            m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)],
        )
    }

    pub fn apply_quad(&self, quad: &[Point; 4]) -> [Point; 4] {
        quad.map(|p| self.apply(p))
    }

    pub fn inverse(&self) -> Option<Self> {
        self.to_homogeneous()
            .try_inverse()
            .map(|inv| Self::from_homogeneous(&inv))
    }

    /// `self · first`: the result applies `first`, then `self`.
    pub fn compose(&self, first: &Affine2) -> Affine2 {
        Self::from_homogeneous(&(self.to_homogeneous() * first.to_homogeneous()))
    }
}

/// Projective transform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub m: Matrix3<f64>,
}

impl Homography {
    pub fn identity() -> Self {
        Self {
            m: Matrix3::identity(),
        }
    }

    pub fn new(m: Matrix3<f64>) -> Self {
        Self { m }
    }

    pub fn from_affine(a: &Affine2) -> Self {
        Self {
            m: a.to_homogeneous(),
        }
    }

    /// Direct perspective solve mapping `src[i]` onto `dst[i]`.
    ///
    /// Both quads must be finite, strictly convex and wound TL, TR, BR, BL
    /// (positive signed area in image coordinates).
    pub fn from_quads(src: &[Point; 4], dst: &[Point; 4]) -> Result<Self, GeometryError> {
        validate_quad(src)?;
        validate_quad(dst)?;

        Self::from_point_pairs(src, dst).ok_or(GeometryError::Singular)
    }

    /// Exact four-point solve without any shape checks.
    ///
    /// Returns `None` for singular systems, e.g. three colinear points.
    pub fn from_point_pairs(src: &[Point; 4], dst: &[Point; 4]) -> Option<Self> {
        // [x y 1 0 0 0 -x*X -y*X] [a..h]^T = X
        // [0 0 0 x y 1 -x*Y -y*Y]           = Y
        let mut a = SMatrix::<f64, 8, 8>::zeros();
        let mut b = SVector::<f64, 8>::zeros();
        for i in 0..4 {
            let s = src[i];
            let d = dst[i];
            let r0 = 2 * i;
            let r1 = r0 + 1;

            a[(r0, 0)] = s.x;
            a[(r0, 1)] = s.y;
            a[(r0, 2)] = 1.0;
            a[(r0, 6)] = -d.x * s.x;
            a[(r0, 7)] = -d.x * s.y;
            b[r0] = d.x;

            a[(r1, 3)] = s.x;
            a[(r1, 4)] = s.y;
            a[(r1, 5)] = 1.0;
            a[(r1, 6)] = -d.y * s.x;
            a[(r1, 7)] = -d.y * s.y;
            b[r1] = d.y;
        }

        let x = a.lu().solve(&b)?;
        let m = Matrix3::new(x[0], x[1], x[2], x[3], x[4], x[5], x[6], x[7], 1.0);
        if !m.iter().all(|v| v.is_finite()) || m.determinant().abs() < SINGULAR_EPS {
            return None;
        }
        Some(Self { m })
    }

    /// Project a point; `None` when it maps onto the line at infinity.
    pub fn apply(&self, p: Point) -> Option<Point> {
        let m = &self.m;
        let w = m[(2, 0)] * p.x + m[(2, 1)] * p.y + m[(2, 2)];
        if w.abs() < SINGULAR_EPS {
            return None;
        }
        Some(Point::new(
            (m[(0, 0)] * p.x + m[(0, 1)] * p.y + m[(0, 2)]) / w,
            (m[(1, 0)] * p.x + m[(1, 1)] * p.y + m[(1, 2)]) / w,
        ))
    }

    /// `self · first`: the result applies `first`, then `self`.
    pub fn compose(&self, first: &Homography) -> Homography {
        Homography {
            m: self.m * first.m,
        }
    }

    pub fn inverse(&self) -> Option<Self> {
        self.m.try_inverse().map(|m| Self { m })
    }

    /// Scale so that `m[2][2] == 1` when possible.
    pub fn normalized(&self) -> Self {
        let k = self.m[(2, 2)];
        if k.abs() < SINGULAR_EPS {
            *self
        } else {
            Self { m: self.m / k }
        }
    }
}

/// Shoelace signed area; positive for TL, TR, BR, BL winding with y down.
pub fn signed_area(quad: &[Point; 4]) -> f64 {
    let mut sum = 0.0;
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        sum += a.x * b.y - b.x * a.y;
    }
    sum * 0.5
}

/// Reject non-finite, colinear, reflected or non-convex quads.
pub fn validate_quad(quad: &[Point; 4]) -> Result<(), GeometryError> {
    if !quad.iter().all(|p| p.x.is_finite() && p.y.is_finite()) {
        return Err(GeometryError::NonFinite);
    }
    let area = signed_area(quad);
    if area < MIN_QUAD_AREA {
        return Err(GeometryError::DegenerateQuad { area });
    }
    for i in 0..4 {
        let a = quad[i];
        let b = quad[(i + 1) % 4];
        let c = quad[(i + 2) % 4];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross <= MIN_QUAD_AREA {
            return Err(GeometryError::DegenerateQuad { area });
        }
    }
    Ok(())
}
