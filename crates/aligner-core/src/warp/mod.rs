pub mod composer;
pub mod matrix;
pub mod resample;

pub use composer::{affine_matrix, combined_homography, homography, plan_warp, WarpPlan, WarpTransform};
pub use matrix::{Affine2, Homography};
pub use resample::{warp_rgb, WarpedImage};
