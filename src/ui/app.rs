//! Main window and eframe integration

use crate::ui::autoscroll::AutoScroll;
use crate::ui::components::{InputBar, MessageList, Notifications};
use crate::ui::state::AppState;
use crate::ui::theme::Theme;
use egui::{self, CentralPanel, Key, KeyboardShortcut, Modifiers, RichText, TopBottomPanel};
use std::time::Duration;

const IDLE_POLL: Duration = Duration::from_millis(250);

/// Ctrl+K (Cmd+K on macOS) starts a new chat
pub const NEW_CHAT_SHORTCUT: KeyboardShortcut = KeyboardShortcut::new(Modifiers::COMMAND, Key::K);

pub struct VoxApp {
    state: AppState,
    theme: Theme,
    scroll: AutoScroll,
    initialized: bool,
}

impl VoxApp {
    pub fn new(cc: &eframe::CreationContext<'_>, state: AppState) -> Self {
        let theme = Theme::dark();
        theme.apply(&cc.egui_ctx);
        Self::with_state(state, theme)
    }

    /// Build without a window, e.g. for a test harness
    pub fn with_state(state: AppState, theme: Theme) -> Self {
        let scroll = AutoScroll::new(&state.config.scroll);
        Self {
            state,
            theme,
            scroll,
            initialized: false,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AppState {
        &mut self.state
    }

    fn initialize(&mut self) {
        if self.initialized {
            return;
        }
        self.initialized = true;
        if self.state.is_connected() {
            self.state.load_chats();
        }
    }

    fn handle_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.input_mut(|i| i.consume_shortcut(&NEW_CHAT_SHORTCUT)) {
            self.state.new_chat();
            self.scroll.scroll_to_bottom();
        }
    }

    fn show_header(&mut self, ctx: &egui::Context) {
        TopBottomPanel::top("header")
            .frame(egui::Frame::none().fill(self.theme.bg_secondary).inner_margin(10.0))
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.label(
                        RichText::new("VoxAI")
                            .size(20.0)
                            .strong()
                            .color(self.theme.text_primary),
                    );

                    let title = if self.state.conversation.title.is_empty() {
                        "Untitled conversation".to_string()
                    } else {
                        self.state.conversation.title.clone()
                    };
                    ui.label(RichText::new(title).size(14.0).color(self.theme.text_muted));

                    ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                        let new_chat = ui
                            .button("＋ New chat")
                            .on_hover_text("New chat (Ctrl+K)");
                        new_chat.widget_info(|| {
                            egui::WidgetInfo::labeled(egui::WidgetType::Button, true, "New chat")
                        });
                        if new_chat.clicked() {
                            self.state.new_chat();
                            self.scroll.scroll_to_bottom();
                        }

                        if self.state.is_voice_active() {
                            ui.label(
                                RichText::new("● Listening")
                                    .size(12.0)
                                    .color(self.theme.recording),
                            );
                        }
                    });
                });
            });
    }

    fn show_input_area(&mut self, ctx: &egui::Context) {
        TopBottomPanel::bottom("input_area")
            .frame(egui::Frame::none().fill(self.theme.bg_primary).inner_margin(self.theme.spacing_sm))
            .show(ctx, |ui| {
                let was_busy = self.state.is_busy();
                InputBar::new(&mut self.state, &self.theme).show(ui);
                // A message just went out
                if !was_busy && self.state.is_busy() {
                    self.scroll.scroll_to_bottom();
                }
            });
    }

    fn show_content(&mut self, ctx: &egui::Context) {
        CentralPanel::default()
            .frame(egui::Frame::none().fill(self.theme.bg_primary).inner_margin(self.theme.spacing_sm))
            .show(ctx, |ui| {
                if MessageList::new(&self.state, &self.theme, &mut self.scroll).show(ui) {
                    self.state
                        .notify("Copied to clipboard", "Message content has been copied.");
                }
            });
    }

    /// One frame of the UI, shared by eframe and test harnesses
    pub fn ui(&mut self, ctx: &egui::Context) {
        self.initialize();
        self.state.poll_events();
        self.handle_shortcuts(ctx);

        self.show_header(ctx);
        self.show_input_area(ctx);
        self.show_content(ctx);
        Notifications::new(&mut self.state, &self.theme).show(ctx);

        if self.state.is_busy() || self.state.is_voice_active() || self.state.is_dictating() {
            ctx.request_repaint();
        } else {
            // Keep draining background results while idle
            ctx.request_repaint_after(IDLE_POLL);
        }
    }
}

impl eframe::App for VoxApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.ui(ctx);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.state.stop_voice();
        self.state.stop_dictation();
    }
}
