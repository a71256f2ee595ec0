use ndarray::{Array2, Zip};

use crate::filters::gaussian_blur::gaussian_blur_window;
use crate::frame::{Frame, Mask};

const C1: f32 = 0.01 * 0.01;
const C2: f32 = 0.03 * 0.03;

/// Per-pixel SSIM map over a Gaussian window, clipped to `[0, 1]`.
pub fn ssim_map(x: &Frame, y: &Frame, window: usize, sigma: f32) -> Array2<f32> {
    let blur = |a: &Array2<f32>| gaussian_blur_window(a, window, sigma);

    let ux = blur(&x.data);
    let uy = blur(&y.data);
    let uxx = blur(&(&x.data * &x.data));
    let uyy = blur(&(&y.data * &y.data));
    let uxy = blur(&(&x.data * &y.data));

    let mut map = Array2::<f32>::zeros(x.data.dim());
    Zip::from(&mut map)
        .and(&ux)
        .and(&uy)
        .and(&uxx)
        .and(&uyy)
        .and(&uxy)
        .for_each(|out, &mx, &my, &sxx, &syy, &sxy| {
            let vx = sxx - mx * mx;
            let vy = syy - my * my;
            let cxy = sxy - mx * my;
            let num = (2.0 * mx * my + C1) * (2.0 * cxy + C2);
            let den = (mx * mx + my * my + C1) * (vx + vy + C2);
            *out = (num / (den + 1e-12)).clamp(0.0, 1.0);
        });
    map
}

/// Mean SSIM over the masked pixels; 0 for an empty mask.
pub fn ssim(x: &Frame, y: &Frame, mask: &Mask, window: usize, sigma: f32) -> f64 {
    let map = ssim_map(x, y, window, sigma);
    masked_mean(&map, mask)
}

pub(crate) fn masked_mean(values: &Array2<f32>, mask: &Mask) -> f64 {
    let mut sum = 0.0f64;
    let mut n = 0usize;
    Zip::from(values).and(&mask.data).for_each(|&v, &m| {
        if m {
            sum += v as f64;
            n += 1;
        }
    });
    sum / n.max(1) as f64
}
