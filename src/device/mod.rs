pub(crate) mod backend;
pub(crate) mod headless;
pub(crate) mod raster;
pub(crate) mod scope;
pub(crate) mod types;
