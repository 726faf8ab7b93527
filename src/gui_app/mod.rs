pub mod iced_ui;
pub mod viewer;

pub use iced_ui::run_iced_app;
