// main.rs
mod app;
mod humanizer;
mod utils;

use app::App;
use eframe::NativeOptions;

fn main() {
    let native_options = NativeOptions {
        initial_window_size: Some(egui::Vec2::new(1000.0, 760.0)),
        resizable: true,
        ..Default::default()
    };
    eframe::run_native(
        app::TITLE,
        native_options,
        Box::new(|_cc| Box::new(App::default())),
    );
}
