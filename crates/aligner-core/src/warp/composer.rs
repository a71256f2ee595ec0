use tracing::warn;

use crate::coords::{rect_corners, Point, ScaleContext};
use crate::error::GeometryError;
use crate::params::{AlignmentParams, Quad};

use super::matrix::{Affine2, Homography};

/// Rotation + scale about the image centre, then translation.
///
/// Follows the `getRotationMatrix2D` convention: positive `theta` rotates
/// counter-clockwise on screen (y axis pointing down).
pub fn affine_matrix(params: &AlignmentParams, img_w: u32, img_h: u32) -> Affine2 {
    let cx = img_w as f64 / 2.0;
    let cy = img_h as f64 / 2.0;
    let rad = params.theta.to_radians();
    let alpha = params.scale * rad.cos();
    let beta = params.scale * rad.sin();

    let mut a = Affine2::identity();
    a.m[(0, 0)] = alpha;
    a.m[(0, 1)] = beta;
    a.m[(0, 2)] = (1.0 - alpha) * cx - beta * cy + params.tx;
    a.m[(1, 0)] = -beta;
    a.m[(1, 1)] = alpha;
    a.m[(1, 2)] = beta * cx + (1.0 - alpha) * cy + params.ty;
    a
}

/// Direct perspective solve from the canonical source corners to the quad.
///
/// Without a quad the canonical corners map to themselves.
pub fn homography(
    params: &AlignmentParams,
    img_w: u32,
    img_h: u32,
) -> Result<Homography, GeometryError> {
    match &params.quad {
        Some(quad) => Homography::from_quads(&rect_corners(img_w, img_h), quad),
        None => Ok(Homography::identity()),
    }
}

/// Perspective relative to the current affine pose: the homography is solved
/// from the affine-warped corners to the quad and applied after the affine.
pub fn combined_homography(
    params: &AlignmentParams,
    img_w: u32,
    img_h: u32,
    quad: &Quad,
) -> Result<Homography, GeometryError> {
    let affine = affine_matrix(params, img_w, img_h);
    let posed = affine.apply_quad(&rect_corners(img_w, img_h));
    let perspective = Homography::from_quads(&posed, quad)?;
    Ok(perspective
        .compose(&Homography::from_affine(&affine))
        .normalized())
}

/// Forward mapping from a moving image into the base frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WarpTransform {
    Affine(Affine2),
    Perspective(Homography),
}

impl WarpTransform {
    pub fn identity() -> Self {
        Self::Affine(Affine2::identity())
    }

    pub fn as_homography(&self) -> Homography {
        match self {
            Self::Affine(a) => Homography::from_affine(a),
            Self::Perspective(h) => *h,
        }
    }

    pub fn apply(&self, p: Point) -> Option<Point> {
        match self {
            Self::Affine(a) => Some(a.apply(p)),
            Self::Perspective(h) => h.apply(p),
        }
    }

    /// Same transform expressed in full-resolution coordinates.
    pub fn lift(&self, ctx: &ScaleContext) -> Self {
        match self {
            Self::Affine(a) => Self::Affine(ctx.lift_affine_to_full(a)),
            Self::Perspective(h) => Self::Perspective(ctx.lift_homography_to_full(h)),
        }
    }

    pub fn is_perspective(&self) -> bool {
        matches!(self, Self::Perspective(_))
    }
}

/// Transform chosen for one image plus any geometry problem met on the way.
#[derive(Clone, Copy, Debug)]
pub struct WarpPlan {
    pub transform: WarpTransform,
    /// Outline corners in destination space, in TL, TR, BR, BL order.
    pub outline: [Point; 4],
    pub geometry_error: Option<GeometryError>,
}

/// Pick the affine or affine+perspective path for `params`.
///
/// A quad equal to `default_quad` renders affine. An unsolvable quad falls
/// back to an identity perspective part (pure affine) and reports the error.
pub fn plan_warp(
    params: &AlignmentParams,
    img_w: u32,
    img_h: u32,
    default_quad: &Quad,
) -> WarpPlan {
    let affine = affine_matrix(params, img_w, img_h);
    let corners = rect_corners(img_w, img_h);
    let affine_plan = |geometry_error| WarpPlan {
        transform: WarpTransform::Affine(affine),
        outline: affine.apply_quad(&corners),
        geometry_error,
    };

    let quad = match &params.quad {
        Some(q) if params.uses_perspective(default_quad) => q,
        _ => return affine_plan(None),
    };

    match combined_homography(params, img_w, img_h, quad) {
        Ok(h) => WarpPlan {
            transform: WarpTransform::Perspective(h),
            outline: *quad,
            geometry_error: None,
        },
        Err(e) => {
            warn!(error = %e, "Perspective quad unsolvable, falling back to affine");
            affine_plan(Some(e))
        }
    }
}
