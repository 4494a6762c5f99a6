//! Desktop window (eframe/egui).
//!
//! Runs on the main thread. Background work reaches the window only through
//! [`UiEvent`]s, drained at the start of every frame.

use std::sync::Arc;

use egui::{Color32, RichText};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use crate::context::{AppContext, SpeakOutcome};
use crate::events::UiEvent;
use crate::pronunciation::{Pronouncer, Pronunciation};
use crate::settings::{Settings, MAX_SPEECH_RATE, MIN_SPEECH_RATE};
use crate::speech::DispatchState;
use crate::update::UpdateInfo;

const ACCENT: Color32 = Color32::from_rgb(0x1a, 0x73, 0xe8);
const WARN: Color32 = Color32::from_rgb(0xff, 0x98, 0x00);
const ERROR: Color32 = Color32::from_rgb(0xd9, 0x30, 0x25);

#[derive(Debug, Clone, PartialEq)]
enum Status {
    Ready,
    Speaking(String),
    Info(String),
    Error(String),
}

impl Status {
    fn text(&self) -> String {
        match self {
            Self::Ready => "Ready".into(),
            Self::Speaking(text) => format!("Speaking: {text}"),
            Self::Info(msg) | Self::Error(msg) => msg.clone(),
        }
    }

    fn color(&self) -> Color32 {
        match self {
            Self::Ready | Self::Info(_) => Color32::GRAY,
            Self::Speaking(_) => WARN,
            Self::Error(_) => ERROR,
        }
    }
}

struct SettingsDialog {
    draft: Settings,
    voices: Vec<String>,
    error: Option<String>,
}

enum UpdateDialog {
    Checking,
    UpToDate,
    Available(UpdateInfo),
    Failed(String),
}

pub struct PronounceApp {
    app: Arc<AppContext>,
    events: UnboundedReceiver<UiEvent>,
    pronouncer: Pronouncer,
    entry: String,
    ipa: Pronunciation,
    status: Status,
    active_request: Option<u64>,
    settings_dialog: Option<SettingsDialog>,
    update_dialog: Option<UpdateDialog>,
    about_open: bool,
    focused: bool,
}

/// Open the main window and block until it closes.
pub fn run(
    app: Arc<AppContext>,
    events: UnboundedReceiver<UiEvent>,
    pronouncer: Pronouncer,
) -> Result<(), eframe::Error> {
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("TTS Pronunciation Practice")
            .with_inner_size([520.0, 560.0])
            .with_min_inner_size([400.0, 420.0]),
        ..Default::default()
    };

    eframe::run_native(
        "TTS Pronunciation Practice",
        options,
        Box::new(move |cc| {
            let repaint = cc.egui_ctx.clone();
            app.events().set_waker(move || repaint.request_repaint());
            Ok(Box::new(PronounceApp::new(app, events, pronouncer)))
        }),
    )
}

impl PronounceApp {
    fn new(app: Arc<AppContext>, events: UnboundedReceiver<UiEvent>, pronouncer: Pronouncer) -> Self {
        app.start_clipboard_watcher();
        app.spawn_update_check();

        Self {
            app,
            events,
            pronouncer,
            entry: String::new(),
            ipa: Pronunciation::Hidden,
            status: Status::Ready,
            active_request: None,
            settings_dialog: None,
            update_dialog: None,
            about_open: false,
            focused: true,
        }
    }

    fn speak_entry(&mut self) {
        let text = self.entry.trim().to_string();
        if text.is_empty() {
            self.status = Status::Error("Please enter some text.".into());
            return;
        }

        self.ipa = self.pronouncer.describe(&text, self.app.settings().show_ipa);
        match self.app.speak(&text) {
            SpeakOutcome::Started(id) => {
                self.active_request = Some(id);
                self.status = Status::Info("Initializing TTS engine...".into());
            }
            SpeakOutcome::Disabled => {
                self.status = Status::Info("TTS is disabled in settings".into());
            }
            SpeakOutcome::Ignored => {}
        }
    }

    fn stop(&mut self) {
        self.app.stop();
        self.active_request = None;
        self.status = Status::Ready;
    }

    fn drain_events(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
    }

    fn handle_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::SpeechStarted { request, text } if self.active_request == Some(request) => {
                self.status = Status::Speaking(text);
            }
            UiEvent::SpeechFinished { request } if self.active_request == Some(request) => {
                self.active_request = None;
                self.status = Status::Ready;
            }
            UiEvent::SpeechFailed { request, error } if self.active_request == Some(request) => {
                self.active_request = None;
                self.status = Status::Error(format!("TTS failed: {error}"));
            }
            UiEvent::SpeechStarted { .. }
            | UiEvent::SpeechFinished { .. }
            | UiEvent::SpeechFailed { .. } => {}
            UiEvent::ClipboardText(text) => {
                self.entry = text;
                self.ipa = self.pronouncer.describe(&self.entry, self.app.settings().show_ipa);
                if self.app.settings().auto_speak {
                    self.speak_entry();
                }
            }
            UiEvent::UpdateAvailable(info) => {
                info!("Showing update dialog for {}", info.version);
                self.app.announce_update(&info, self.focused);
                self.update_dialog = Some(UpdateDialog::Available(info));
            }
            UiEvent::UpdateCheckDone(result) => {
                if matches!(self.update_dialog, Some(UpdateDialog::Checking)) {
                    self.update_dialog = Some(match result {
                        Ok(Some(info)) => UpdateDialog::Available(info),
                        Ok(None) => UpdateDialog::UpToDate,
                        Err(e) => UpdateDialog::Failed(e),
                    });
                }
            }
        }
    }

    fn open_settings(&mut self) {
        self.settings_dialog = Some(SettingsDialog {
            draft: self.app.settings(),
            voices: self.app.voices(),
            error: None,
        });
    }

    fn check_for_updates(&mut self) {
        self.update_dialog = Some(UpdateDialog::Checking);
        self.app.check_updates_now();
    }

    fn menu_bar(&mut self, ctx: &egui::Context, ui: &mut egui::Ui) {
        egui::menu::bar(ui, |ui| {
            ui.menu_button("File", |ui| {
                if ui.button("Settings").clicked() {
                    self.open_settings();
                    ui.close_menu();
                }
                if ui.button("Clear History").clicked() {
                    self.app.clear_history();
                    ui.close_menu();
                }
                ui.separator();
                if ui.button("Quit").clicked() {
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                }
            });
            ui.menu_button("Edit", |ui| {
                if ui.button("Copy IPA").clicked() {
                    if let Pronunciation::Found(ipa) = &self.ipa {
                        ctx.copy_text(ipa.clone());
                    }
                    ui.close_menu();
                }
                if ui.button("Clear Entry").clicked() {
                    self.entry.clear();
                    self.ipa = Pronunciation::Hidden;
                    ui.close_menu();
                }
            });
            ui.menu_button("Help", |ui| {
                if ui.button("Check for Updates").clicked() {
                    self.check_for_updates();
                    ui.close_menu();
                }
                if ui.button("About").clicked() {
                    self.about_open = true;
                    ui.close_menu();
                }
            });
        });
    }

    fn main_panel(&mut self, ui: &mut egui::Ui) {
        ui.vertical_centered(|ui| {
            ui.add_space(8.0);
            ui.heading("Pronunciation Practice");
            ui.add_space(8.0);

            let response = ui.add(
                egui::TextEdit::singleline(&mut self.entry)
                    .hint_text("Type or copy a word")
                    .font(egui::TextStyle::Heading)
                    .desired_width(f32::INFINITY),
            );
            if response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter)) {
                self.speak_entry();
                response.request_focus();
            }

            ui.add_space(6.0);
            ui.horizontal(|ui| {
                let speaking = self.app.speech_state() == DispatchState::Speaking;
                let label = if speaking { "Speaking..." } else { "Speak" };
                if ui.button(RichText::new(label).size(16.0)).clicked() {
                    self.speak_entry();
                }
                if speaking && ui.button(RichText::new("Stop").size(16.0)).clicked() {
                    self.stop();
                }
            });

            ui.add_space(10.0);
            let color = if self.ipa.is_found() { ACCENT } else { ERROR };
            ui.label(RichText::new(self.ipa.display_text()).size(22.0).color(color));
        });

        ui.add_space(10.0);
        ui.label("History:");
        let history = self.app.history();
        let mut clicked = None;
        egui::ScrollArea::vertical()
            .max_height(150.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                for word in &history {
                    let button = egui::Button::new(word.as_str()).min_size(egui::vec2(ui.available_width(), 0.0));
                    if ui.add(button).clicked() {
                        clicked = Some(word.clone());
                    }
                }
            });
        if let Some(word) = clicked {
            self.entry = word;
            self.speak_entry();
        }
    }

    fn settings_window(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.settings_dialog.as_mut() else {
            return;
        };

        let mut open = true;
        let mut action = None;
        egui::Window::new("Settings")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                let draft = &mut dialog.draft;

                ui.strong("Text-to-Speech");
                ui.checkbox(&mut draft.tts_enabled, "Enable Text-to-Speech");
                ui.checkbox(&mut draft.auto_speak, "Auto-speak when text is copied");
                ui.add(
                    egui::Slider::new(&mut draft.speech_rate, MIN_SPEECH_RATE..=MAX_SPEECH_RATE)
                        .text("Speech rate"),
                );
                ui.add(egui::Slider::new(&mut draft.volume, 0.0..=1.0).text("Volume"));

                egui::ComboBox::from_label("Voice")
                    .selected_text(draft.voice_name.as_str())
                    .show_ui(ui, |ui| {
                        for voice in &dialog.voices {
                            ui.selectable_value(&mut draft.voice_name, voice.clone(), voice.as_str());
                        }
                    });

                ui.separator();
                ui.strong("Clipboard");
                ui.checkbox(&mut draft.clipboard_monitoring, "Monitor clipboard");

                ui.separator();
                ui.strong("Display");
                ui.checkbox(&mut draft.show_ipa, "Show IPA pronunciation");

                if let Some(err) = &dialog.error {
                    ui.colored_label(ERROR, err);
                }

                ui.separator();
                ui.horizontal(|ui| {
                    if ui.button("Save").clicked() {
                        action = Some(SettingsAction::Save);
                    }
                    if ui.button("Reset to Defaults").clicked() {
                        action = Some(SettingsAction::Reset);
                    }
                    if ui.button("Cancel").clicked() {
                        action = Some(SettingsAction::Cancel);
                    }
                });
            });

        match action {
            Some(SettingsAction::Save) => match self.app.save_settings(dialog.draft.clone()) {
                Ok(()) => {
                    self.status = Status::Info("Settings saved".into());
                    self.settings_dialog = None;
                }
                Err(e) => {
                    warn!("{e}");
                    dialog.error = Some(format!("Failed to save settings: {e}"));
                }
            },
            Some(SettingsAction::Reset) => {
                dialog.draft = Settings::default();
                dialog.error = self.app.reset_settings().err().map(|e| e.to_string());
            }
            Some(SettingsAction::Cancel) => self.settings_dialog = None,
            None if !open => self.settings_dialog = None,
            None => {}
        }
    }

    fn update_window(&mut self, ctx: &egui::Context) {
        let Some(dialog) = &self.update_dialog else {
            return;
        };

        let mut open = true;
        let mut close = false;
        let mut check_again = false;
        egui::Window::new("Updates")
            .open(&mut open)
            .collapsible(false)
            .show(ctx, |ui| {
                ui.label(format!("Current version: {}", self.app.current_version()));
                if let Some(when) = self.app.last_update_check() {
                    ui.label(format!("Last checked: {}", when.format("%Y-%m-%d %H:%M")));
                }
                ui.separator();

                match dialog {
                    UpdateDialog::Checking => {
                        ui.horizontal(|ui| {
                            ui.spinner();
                            ui.label("Checking for updates...");
                        });
                    }
                    UpdateDialog::UpToDate => {
                        ui.label("You are running the latest version.");
                    }
                    UpdateDialog::Failed(err) => {
                        ui.colored_label(ERROR, format!("Update check failed: {err}"));
                    }
                    UpdateDialog::Available(info) => {
                        ui.label(RichText::new(format!("Version {} is available", info.version)).strong());
                        egui::ScrollArea::vertical().max_height(200.0).show(ui, |ui| {
                            ui.label(info.notes.as_str());
                        });
                        if ui.button("Download Update").clicked() {
                            ctx.open_url(egui::OpenUrl::new_tab(&info.url));
                            close = true;
                        }
                    }
                }

                ui.horizontal(|ui| {
                    if !matches!(dialog, UpdateDialog::Checking) && ui.button("Check Again").clicked() {
                        check_again = true;
                    }
                    if ui.button("Close").clicked() {
                        close = true;
                    }
                });
            });

        if check_again {
            self.check_for_updates();
        } else if close || !open {
            self.update_dialog = None;
        }
    }

    fn about_window(&mut self, ctx: &egui::Context) {
        egui::Window::new("About")
            .open(&mut self.about_open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                ui.heading("TTS Pronunciation Practice");
                ui.label(format!("Version {}", self.app.current_version()));
                ui.label("Copy or type an English word to hear it spoken and see its IPA.");
            });
    }
}

enum SettingsAction {
    Save,
    Reset,
    Cancel,
}

impl eframe::App for PronounceApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.focused = ctx.input(|i| i.focused);
        self.drain_events();

        egui::TopBottomPanel::top("menu").show(ctx, |ui| self.menu_bar(ctx, ui));
        egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
            ui.label(RichText::new(self.status.text()).color(self.status.color()));
        });
        egui::CentralPanel::default().show(ctx, |ui| self.main_panel(ui));

        self.settings_window(ctx);
        self.update_window(ctx);
        self.about_window(ctx);
    }
}

/// Best-effort native error box for failures before or instead of the window.
pub fn show_error(title: &str, message: &str) {
    rfd::MessageDialog::new()
        .set_level(rfd::MessageLevel::Error)
        .set_title(title)
        .set_description(message)
        .set_buttons(rfd::MessageButtons::Ok)
        .show();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_text() {
        assert_eq!(Status::Ready.text(), "Ready");
        assert_eq!(Status::Speaking("hello".into()).text(), "Speaking: hello");
        assert_eq!(Status::Error("TTS failed".into()).color(), ERROR);
    }
}
