//! Toast notifications in the top-right corner

use crate::ui::state::AppState;
use crate::ui::theme::Theme;
use egui::{self, Align2, RichText};

pub struct Notifications<'a> {
    state: &'a mut AppState,
    theme: &'a Theme,
}

impl<'a> Notifications<'a> {
    pub fn new(state: &'a mut AppState, theme: &'a Theme) -> Self {
        Self { state, theme }
    }

    pub fn show(self, ctx: &egui::Context) {
        if self.state.notifications().is_empty() {
            return;
        }

        let mut dismissed = None;
        egui::Area::new(egui::Id::new("notifications"))
            .anchor(Align2::RIGHT_TOP, [-self.theme.spacing, self.theme.spacing])
            .show(ctx, |ui| {
                ui.set_max_width(320.0);
                for (index, note) in self.state.notifications().iter().enumerate() {
                    let accent = if note.is_error {
                        self.theme.error
                    } else {
                        self.theme.success
                    };
                    egui::Frame::none()
                        .fill(self.theme.bg_secondary)
                        .stroke(egui::Stroke::new(1.0, accent))
                        .rounding(self.theme.card_rounding)
                        .inner_margin(self.theme.spacing_sm)
                        .show(ui, |ui| {
                            ui.horizontal(|ui| {
                                ui.vertical(|ui| {
                                    let title = ui.label(
                                        RichText::new(&note.title).strong().color(accent),
                                    );
                                    title.widget_info(|| {
                                        egui::WidgetInfo::labeled(
                                            egui::WidgetType::Label,
                                            true,
                                            format!("Notification: {}", note.title),
                                        )
                                    });
                                    if !note.description.is_empty() {
                                        ui.label(
                                            RichText::new(&note.description)
                                                .size(12.0)
                                                .color(self.theme.text_secondary),
                                        );
                                    }
                                });
                                let close = ui.small_button("✕");
                                close.widget_info(|| {
                                    egui::WidgetInfo::labeled(
                                        egui::WidgetType::Button,
                                        true,
                                        "Dismiss notification",
                                    )
                                });
                                if close.clicked() {
                                    dismissed = Some(index);
                                }
                            });
                        });
                    ui.add_space(self.theme.spacing_sm * 0.5);
                }
            });

        if let Some(index) = dismissed {
            self.state.dismiss_notification(index);
        }
    }
}
