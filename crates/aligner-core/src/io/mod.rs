pub mod image_io;

pub use image_io::{
    downscale_to, is_supported, list_source_images, load_rgb, png_name, save_png,
    unique_png_names,
};
