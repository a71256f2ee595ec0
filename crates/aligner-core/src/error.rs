use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AlignError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image format error: {0}")]
    ImageError(#[from] image::ImageError),

    #[error("Invalid image dimensions: {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("{0} output folder not set")]
    MissingOutputDir(&'static str),

    #[error("No base image loaded")]
    NoBaseImage,

    #[error("Image is not part of the source set: {}", .0.display())]
    UnknownImage(PathBuf),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Worker pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Failure to build a perspective transform from a quad.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("quad contains non-finite coordinates")]
    NonFinite,

    #[error("quad is degenerate (area {area:.3})")]
    DegenerateQuad { area: f64 },

    #[error("perspective system is singular")]
    Singular,
}

pub type Result<T> = std::result::Result<T, AlignError>;
