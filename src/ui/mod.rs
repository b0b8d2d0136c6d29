//! Desktop chat window built on eframe/egui

mod app;
pub mod autoscroll;
pub mod components;
pub mod state;
mod theme;

pub use app::{VoxApp, NEW_CHAT_SHORTCUT};
pub use autoscroll::{AutoScroll, ScrollMode};
pub use state::{AppState, BoxedRecognitionEngine, ClientEvent, Notification};
pub use theme::Theme;

/// Open the main window and run until it is closed
pub fn run(state: AppState) -> eframe::Result<()> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([960.0, 720.0])
            .with_min_inner_size([560.0, 420.0])
            .with_title("VoxAI"),
        ..Default::default()
    };

    eframe::run_native(
        "VoxAI",
        options,
        Box::new(move |cc| Ok(Box::new(VoxApp::new(cc, state)))),
    )
}
