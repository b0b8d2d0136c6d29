//! Conversation view
//!
//! Finalized messages, then the reply still streaming in, then the typing
//! indicator. Scrolling is driven by [`AutoScroll`].

use crate::api::SearchResults;
use crate::messages::Message;
use crate::ui::autoscroll::AutoScroll;
use crate::ui::state::AppState;
use crate::ui::theme::Theme;
use egui::{self, Align, RichText};
use std::time::Instant;

pub struct MessageList<'a> {
    state: &'a AppState,
    theme: &'a Theme,
    scroll: &'a mut AutoScroll,
}

/// Changes whenever anything that affects the content height changes
fn content_signature(state: &AppState) -> (usize, usize, bool) {
    (
        state.conversation.messages.len(),
        state.streaming_text.len(),
        state.is_typing,
    )
}

impl<'a> MessageList<'a> {
    pub fn new(state: &'a AppState, theme: &'a Theme, scroll: &'a mut AutoScroll) -> Self {
        Self {
            state,
            theme,
            scroll,
        }
    }

    /// Returns true when a message was copied to the clipboard this frame
    pub fn show(mut self, ui: &mut egui::Ui) -> bool {
        let messages = self.state.conversation.messages.get_all();
        let signature_id = ui.id().with("content_signature");
        let signature = content_signature(self.state);
        let previous: Option<(usize, usize, bool)> = ui.data(|d| d.get_temp(signature_id));
        ui.data_mut(|d| d.insert_temp(signature_id, signature));

        let now = Instant::now();
        self.scroll.tick(now);
        let jump = previous != Some(signature) && self.scroll.on_content_changed();
        let mut copied = false;

        let output = egui::ScrollArea::vertical()
            .id_salt("messages")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                ui.add_space(self.theme.spacing);

                if messages.is_empty() && !self.state.is_typing {
                    self.show_empty_state(ui);
                } else {
                    for message in &messages {
                        copied |= self.show_message(ui, message);
                        ui.add_space(self.theme.spacing_sm);
                    }
                    if !self.state.streaming_text.is_empty() {
                        self.show_streaming(ui);
                    } else if self.state.is_typing {
                        self.show_typing(ui);
                    }
                }

                if let Some((query, results)) = &self.state.search_results {
                    self.show_search_results(ui, query, results);
                }

                ui.add_space(self.theme.spacing);
                if jump {
                    ui.scroll_to_cursor(Some(Align::BOTTOM));
                }
            });

        let max_offset = (output.content_size.y - output.inner_rect.height()).max(0.0);
        self.scroll.on_scroll(output.state.offset.y, max_offset, now);
        copied
    }

    fn show_empty_state(&self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(80.0);
            ui.label(
                RichText::new("How can I help you today?")
                    .size(22.0)
                    .color(self.theme.text_primary),
            );
            ui.add_space(self.theme.spacing_sm);
            ui.label(
                RichText::new(self.state.mode().description())
                    .size(13.0)
                    .color(self.theme.text_muted),
            );
        });
    }

    fn show_message(&self, ui: &mut egui::Ui, message: &Message) -> bool {
        let is_user = message.is_user();
        let (bubble, text_color, align) = if is_user {
            (self.theme.user_bubble, egui::Color32::WHITE, Align::RIGHT)
        } else {
            (self.theme.assistant_bubble, self.theme.text_primary, Align::LEFT)
        };

        ui.with_layout(egui::Layout::top_down(align), |ui| {
            ui.label(
                RichText::new(if is_user { "You" } else { "VoxAI" })
                    .size(11.0)
                    .color(self.theme.text_muted),
            );

            let max_width = ui.available_width() * 0.75;
            egui::Frame::none()
                .fill(bubble)
                .rounding(self.theme.bubble_rounding)
                .inner_margin(egui::Margin::symmetric(12.0, 8.0))
                .show(ui, |ui| {
                    ui.set_max_width(max_width);
                    let label = if is_user {
                        format!("User message: {}", message.content)
                    } else {
                        format!("Assistant response: {}", message.content)
                    };
                    let response = ui.label(RichText::new(&message.content).color(text_color));
                    response.widget_info(|| {
                        egui::WidgetInfo::labeled(egui::WidgetType::Label, true, &label)
                    });
                });

            ui.horizontal(|ui| {
                if let Some(timestamp) = message.timestamp {
                    let local = timestamp.with_timezone(&chrono::Local);
                    ui.label(
                        RichText::new(local.format("%H:%M").to_string())
                            .size(10.0)
                            .color(self.theme.text_muted),
                    );
                }

                let copy = ui.add(
                    egui::Button::new(RichText::new("Copy").size(10.0).color(self.theme.text_muted))
                        .frame(false),
                );
                copy.widget_info(|| {
                    egui::WidgetInfo::labeled(
                        egui::WidgetType::Button,
                        true,
                        format!("Copy message: {}", message.content),
                    )
                });
                if copy.clicked() {
                    ui.ctx().copy_text(message.content.clone());
                    return true;
                }
                false
            })
            .inner
        })
        .inner
    }

    fn show_streaming(&self, ui: &mut egui::Ui) {
        ui.with_layout(egui::Layout::top_down(Align::LEFT), |ui| {
            let max_width = ui.available_width() * 0.75;
            egui::Frame::none()
                .fill(self.theme.assistant_bubble)
                .rounding(self.theme.bubble_rounding)
                .inner_margin(egui::Margin::symmetric(12.0, 8.0))
                .show(ui, |ui| {
                    ui.set_max_width(max_width);
                    let text = &self.state.streaming_text;
                    let response =
                        ui.label(RichText::new(text).color(self.theme.text_primary));
                    response.widget_info(|| {
                        egui::WidgetInfo::labeled(
                            egui::WidgetType::Label,
                            true,
                            format!("Streaming response: {}", text),
                        )
                    });
                });
        });
    }

    fn show_typing(&self, ui: &mut egui::Ui) {
        let t = ui.ctx().input(|i| i.time);
        let response = ui.horizontal(|ui| {
            for i in 0..3 {
                let alpha = ((t * 3.0 + i as f64 * 0.5).sin() * 0.5 + 0.5) as f32;
                ui.label(
                    RichText::new("●")
                        .size(10.0)
                        .color(self.theme.text_muted.gamma_multiply(alpha)),
                );
            }
        });
        response.response.widget_info(|| {
            egui::WidgetInfo::labeled(egui::WidgetType::Label, true, "Typing indicator")
        });
        ui.ctx().request_repaint();
    }

    fn show_search_results(&self, ui: &mut egui::Ui, query: &str, results: &SearchResults) {
        egui::Frame::none()
            .fill(self.theme.bg_secondary)
            .rounding(self.theme.card_rounding)
            .inner_margin(self.theme.spacing_sm)
            .show(ui, |ui| {
                ui.label(
                    RichText::new(format!("Web results for \"{}\"", query))
                        .strong()
                        .color(self.theme.text_secondary),
                );
                if let Some(answer) = &results.answer {
                    ui.label(RichText::new(answer).color(self.theme.text_primary));
                }
                for hit in &results.results {
                    ui.hyperlink_to(hit.title.as_str(), &hit.url);
                    if !hit.content.is_empty() {
                        ui.label(
                            RichText::new(&hit.content)
                                .size(12.0)
                                .color(self.theme.text_muted),
                        );
                    }
                }
            });
    }
}
