fn main() -> iced::Result {
    env_logger::init();
    building_painter::gui_app::run_iced_app()
}
