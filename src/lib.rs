pub mod api;
pub mod compositor;
pub mod config;
pub mod datauri;
pub mod gui_app;
pub mod masks;
pub mod selection;
