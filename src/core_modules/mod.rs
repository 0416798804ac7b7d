pub mod bin_mask;
pub mod colors;
pub mod debounce;
pub mod editor;
pub mod handles;
pub mod polygon;
pub mod raster;
pub mod region_file;
pub mod region_model;
