//! Input bar: mode selector, text input, voice and send controls

use crate::messages::ChatMode;
use crate::ui::state::AppState;
use crate::ui::theme::Theme;
use egui::{self, Key, RichText, Vec2};

pub struct InputBar<'a> {
    state: &'a mut AppState,
    theme: &'a Theme,
}

impl<'a> InputBar<'a> {
    pub fn new(state: &'a mut AppState, theme: &'a Theme) -> Self {
        Self { state, theme }
    }

    pub fn show(mut self, ui: &mut egui::Ui) {
        egui::Frame::none()
            .fill(self.theme.bg_secondary)
            .rounding(self.theme.card_rounding)
            .inner_margin(self.theme.spacing_sm)
            .show(ui, |ui| {
                self.show_mode_selector(ui);

                if self.state.mode() == ChatMode::Pdf {
                    ui.add_space(self.theme.spacing_sm);
                    self.show_pdf_row(ui);
                }

                ui.add_space(self.theme.spacing_sm);
                ui.horizontal(|ui| {
                    self.show_voice_button(ui);
                    self.show_dictation_button(ui);
                    self.show_text_input(ui);
                    if self.state.mode() == ChatMode::Web {
                        self.show_search_button(ui);
                    }
                    self.show_send_button(ui);
                });
            });
    }

    fn show_mode_selector(&mut self, ui: &mut egui::Ui) {
        let current = self.state.mode();
        let locked = self.state.conversation.is_mode_locked();

        ui.horizontal(|ui| {
            for mode in ChatMode::ALL {
                let selected = mode == current;
                let text = RichText::new(mode.label()).color(if selected {
                    self.theme.primary
                } else {
                    self.theme.text_secondary
                });
                let response = ui.add_enabled(!locked || selected, egui::SelectableLabel::new(selected, text));
                response.widget_info(|| {
                    egui::WidgetInfo::selected(
                        egui::WidgetType::SelectableLabel,
                        !locked || selected,
                        selected,
                        format!("Mode: {}", mode.label()),
                    )
                });
                if response.clicked() && !selected {
                    let _ = self.state.set_mode(mode);
                }
                response.on_hover_text(mode.description());
            }

            if locked {
                ui.label(
                    RichText::new("🔒")
                        .size(12.0)
                        .color(self.theme.text_muted),
                )
                .on_hover_text("Start a new chat (Ctrl+K) to switch modes");
            }
        });
    }

    fn show_pdf_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let selected = self.state.pdf.selected().map(|f| f.name.clone());
            match selected {
                Some(name) => {
                    let status = if self.state.document.is_some() {
                        format!("📄 {}", name)
                    } else {
                        format!("📄 {} (uploading...)", name)
                    };
                    ui.label(RichText::new(status).color(self.theme.text_secondary));
                    let remove = ui.button("Remove");
                    remove.widget_info(|| {
                        egui::WidgetInfo::labeled(egui::WidgetType::Button, true, "Remove PDF")
                    });
                    if remove.clicked() {
                        self.state.remove_pdf();
                    }
                }
                None => {
                    let path_id = ui.id().with("pdf_path");
                    let mut path: String = ui.data(|d| d.get_temp(path_id)).unwrap_or_default();
                    let edit = ui.add(
                        egui::TextEdit::singleline(&mut path)
                            .hint_text("Path to a PDF")
                            .desired_width(260.0),
                    );
                    edit.widget_info(|| {
                        egui::WidgetInfo::labeled(egui::WidgetType::TextEdit, true, "PDF path")
                    });

                    let upload = ui.add_enabled(!path.trim().is_empty(), egui::Button::new("Upload"));
                    if upload.clicked() {
                        if self.state.select_pdf_path(path.trim()).is_ok() {
                            path.clear();
                        }
                    }
                    ui.data_mut(|d| d.insert_temp(path_id, path));

                    if let Some(error) = self.state.pdf.error() {
                        ui.label(RichText::new(error).size(12.0).color(self.theme.error));
                    }
                }
            }
        });
    }

    fn show_voice_button(&mut self, ui: &mut egui::Ui) {
        let active = self.state.is_voice_active();
        let (icon, tooltip, label) = if active {
            ("⏹", "Stop voice mode", "Stop voice")
        } else {
            ("🎙", "Start voice mode", "Start voice")
        };

        let mut button = egui::Button::new(RichText::new(icon).size(18.0))
            .min_size(Vec2::splat(40.0))
            .rounding(self.theme.button_rounding);
        if active {
            button = button.fill(self.theme.recording.gamma_multiply(0.3));
        }

        let response = ui.add(button);
        response.widget_info(|| egui::WidgetInfo::labeled(egui::WidgetType::Button, true, label));
        if response.clicked() {
            self.state.toggle_voice();
        }
        response.on_hover_text(tooltip);

        if active {
            ui.ctx().request_repaint();
        }
    }

    fn show_dictation_button(&mut self, ui: &mut egui::Ui) {
        if !self.state.dictation_supported() {
            return;
        }
        let listening = self.state.is_dictating();
        let color = if listening {
            self.theme.recording
        } else {
            self.theme.text_secondary
        };
        let response = ui.add(
            egui::Button::new(RichText::new("🗣").size(16.0).color(color))
                .min_size(Vec2::splat(40.0))
                .rounding(self.theme.button_rounding),
        );
        let label = if listening { "Stop dictation" } else { "Start dictation" };
        response.widget_info(|| egui::WidgetInfo::labeled(egui::WidgetType::Button, true, label));
        if response.clicked() {
            if listening {
                self.state.stop_dictation();
            } else {
                self.state.start_dictation();
            }
        }
    }

    fn show_text_input(&mut self, ui: &mut egui::Ui) {
        let hint = match self.state.mode() {
            ChatMode::Web => "Search the web or ask anything...",
            ChatMode::Pdf => "Ask about your document...",
            _ => "Type a message...",
        };
        let reserved = if self.state.mode() == ChatMode::Web { 104.0 } else { 56.0 };
        let width = (ui.available_width() - reserved).max(120.0);

        let response = ui.add(
            egui::TextEdit::singleline(&mut self.state.input_text)
                .id(egui::Id::new("message_input"))
                .hint_text(hint)
                .desired_width(width)
                .margin(egui::Margin::symmetric(10.0, 8.0)),
        );
        response.widget_info(|| {
            egui::WidgetInfo::labeled(egui::WidgetType::TextEdit, true, "Message input")
        });

        let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
        if submitted && !self.state.input_text.trim().is_empty() {
            self.state.send_message();
            response.request_focus();
        }
    }

    fn show_search_button(&mut self, ui: &mut egui::Ui) {
        let query = self.state.input_text.trim().to_string();
        let enabled = !query.is_empty() && !self.state.is_searching;
        let response = ui.add_enabled(
            enabled,
            egui::Button::new(RichText::new("🔍").size(16.0))
                .min_size(Vec2::splat(40.0))
                .rounding(self.theme.button_rounding),
        );
        response.widget_info(|| {
            egui::WidgetInfo::labeled(egui::WidgetType::Button, enabled, "Search web")
        });
        if response.clicked() {
            self.state.web_search(&query);
        }
    }

    fn show_send_button(&mut self, ui: &mut egui::Ui) {
        let can_send = !self.state.input_text.trim().is_empty() && !self.state.is_busy();

        let fill = if can_send {
            self.theme.primary
        } else {
            self.theme.bg_tertiary
        };
        let button = egui::Button::new(RichText::new("➤").size(16.0).color(egui::Color32::WHITE))
            .min_size(Vec2::splat(40.0))
            .rounding(self.theme.button_rounding)
            .fill(fill);

        let response = ui.add_enabled(can_send, button);
        response.widget_info(|| {
            egui::WidgetInfo::labeled(egui::WidgetType::Button, can_send, "Send message")
        });
        if response.clicked() {
            self.state.send_message();
        }
        response.on_hover_text("Send message (Enter)");
    }
}
