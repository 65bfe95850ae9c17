pub(crate) mod presenter;
pub(crate) mod root_surface;
