pub mod consts;
pub mod coords;
pub mod crop;
pub mod error;
pub mod filters;
pub mod frame;
pub mod history;
pub mod io;
pub mod params;
pub mod project;
pub mod render;
pub mod session;
pub mod similarity;
pub mod warp;
