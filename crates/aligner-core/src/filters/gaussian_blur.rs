use ndarray::Array2;
use rayon::prelude::*;

use crate::consts::PARALLEL_PIXEL_THRESHOLD;

/// Separable Gaussian blur with an explicit (odd) window size.
///
/// Borders replicate the edge pixel.
pub fn gaussian_blur_window(data: &Array2<f32>, window: usize, sigma: f32) -> Array2<f32> {
    let kernel = make_gaussian_kernel(window, sigma);
    let row_pass = convolve(data, &kernel, Axis::Row);
    convolve(&row_pass, &kernel, Axis::Col)
}

fn make_gaussian_kernel(window: usize, sigma: f32) -> Vec<f32> {
    let size = window.max(1) | 1;
    let radius = size / 2;
    let s2 = 2.0 * sigma.max(f32::EPSILON) * sigma.max(f32::EPSILON);
    let mut kernel: Vec<f32> = (0..size)
        .map(|i| {
            let x = i as f32 - radius as f32;
            (-x * x / s2).exp()
        })
        .collect();

    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

#[derive(Clone, Copy)]
enum Axis {
    Row,
    Col,
}

fn convolve(data: &Array2<f32>, kernel: &[f32], axis: Axis) -> Array2<f32> {
    let (h, w) = data.dim();
    let radius = kernel.len() as isize / 2;

    let convolve_row = |row: usize| -> Vec<f32> {
        (0..w)
            .map(|col| {
                let mut sum = 0.0f32;
                for (ki, &kv) in kernel.iter().enumerate() {
                    let offset = ki as isize - radius;
                    let v = match axis {
                        Axis::Row => {
                            let c = (col as isize + offset).clamp(0, w as isize - 1) as usize;
                            data[[row, c]]
                        }
                        Axis::Col => {
                            let r = (row as isize + offset).clamp(0, h as isize - 1) as usize;
                            data[[r, col]]
                        }
                    };
                    sum += v * kv;
                }
                sum
            })
            .collect()
    };

    let rows: Vec<Vec<f32>> = if h * w >= PARALLEL_PIXEL_THRESHOLD {
        (0..h).into_par_iter().map(convolve_row).collect()
    } else {
        (0..h).map(convolve_row).collect()
    };

    let flat: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((h, w), flat).expect("buffer size matches dimensions")
}
