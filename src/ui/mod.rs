use crate::app::{ConverterApp, Dialog};
use crate::constants::{APP_NAME, PROGRESS_REPAINT_INTERVAL_MS};
use crate::formats::OutputFormat;
use eframe::egui;

impl eframe::App for ConverterApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.update_status();

        let mut style = (*ctx.style()).clone();
        style.spacing.button_padding = egui::vec2(12.0, 6.0);
        style.spacing.item_spacing = egui::vec2(8.0, 8.0);
        ctx.set_style(style);
        ctx.set_visuals(egui::Visuals::dark());

        egui::TopBottomPanel::top("header")
            .frame(egui::Frame::none().fill(egui::Color32::from_gray(15)).inner_margin(12.0))
            .show(ctx, |ui| {
                ui.vertical_centered(|ui| {
                    ui.heading(
                        egui::RichText::new(format!("🎬 {}", APP_NAME))
                            .size(24.0)
                            .color(egui::Color32::WHITE)
                            .strong(),
                    );
                });
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            let enabled = !self.is_converting();

            card(ui, "Configuration: FFmpeg Location", |ui| {
                ui.add_enabled_ui(enabled, |ui| self.show_encoder_row(ui));
            });
            card(ui, "Step 1: Select Input File", |ui| {
                ui.add_enabled_ui(enabled, |ui| self.show_input_row(ui));
            });
            card(ui, "Step 2: Output Settings", |ui| {
                ui.add_enabled_ui(enabled, |ui| self.show_output_row(ui));
            });

            self.show_actions(ui);
            ui.add(
                egui::ProgressBar::new(self.progress)
                    .show_percentage()
                    .animate(self.is_converting()),
            );
            ui.add_space(6.0);
            self.show_log(ui);
        });

        self.show_dialog(ctx);

        if self.is_converting() {
            ctx.request_repaint_after(std::time::Duration::from_millis(PROGRESS_REPAINT_INTERVAL_MS));
        }
    }
}

fn card(ui: &mut egui::Ui, title: &str, add_contents: impl FnOnce(&mut egui::Ui)) {
    egui::Frame::none()
        .fill(egui::Color32::from_gray(30))
        .stroke(egui::Stroke::new(1.0, egui::Color32::from_gray(45)))
        .rounding(8.0)
        .inner_margin(12.0)
        .show(ui, |ui| {
            ui.label(egui::RichText::new(title).color(egui::Color32::WHITE).size(15.0));
            ui.add_space(4.0);
            add_contents(ui);
        });
    ui.add_space(6.0);
}

impl ConverterApp {
    fn show_encoder_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let width = ui.available_width() - 90.0;
            ui.add(egui::TextEdit::singleline(&mut self.encoder_path).desired_width(width));
            if ui.button("Browse...").clicked() {
                self.select_encoder();
            }
        });
    }

    fn show_input_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            let width = ui.available_width() - 90.0;
            ui.add(egui::TextEdit::singleline(&mut self.input_file).desired_width(width));
            if ui.button("Browse...").clicked() {
                self.select_input();
            }
        });
    }

    fn show_output_row(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.label("Format:");

            let previous = self.format;
            egui::ComboBox::from_id_source("output_format")
                .selected_text(self.format.display_name())
                .width(80.0)
                .show_ui(ui, |ui| {
                    for format in OutputFormat::ALL {
                        ui.selectable_value(&mut self.format, format, format.display_name());
                    }
                });
            if self.format != previous {
                self.update_output_extension();
            }

            let width = ui.available_width() - 90.0;
            ui.add(egui::TextEdit::singleline(&mut self.output_file).desired_width(width));
            if ui.button("Save As...").clicked() {
                self.select_output();
            }
        });
    }

    fn show_actions(&mut self, ui: &mut egui::Ui) {
        ui.columns(2, |columns| {
            let convert = egui::Button::new(egui::RichText::new("Convert").size(16.0))
                .min_size(egui::vec2(columns[0].available_width(), 32.0));
            if columns[0].add_enabled(self.can_start(), convert).clicked() {
                self.start_conversion();
            }

            let abort = egui::Button::new(egui::RichText::new("Abort").size(16.0))
                .min_size(egui::vec2(columns[1].available_width(), 32.0));
            if columns[1].add_enabled(self.can_abort(), abort).clicked() {
                self.abort_conversion();
            }
        });
        ui.add_space(6.0);
    }

    fn show_log(&self, ui: &mut egui::Ui) {
        egui::Frame::none()
            .fill(egui::Color32::from_gray(15))
            .inner_margin(8.0)
            .show(ui, |ui| {
                egui::ScrollArea::vertical()
                    .stick_to_bottom(true)
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        for line in &self.log {
                            ui.label(egui::RichText::new(line).monospace());
                        }
                    });
            });
    }

    fn show_dialog(&mut self, ctx: &egui::Context) {
        let Some(dialog) = self.dialog.clone() else {
            return;
        };

        let (title, message, color) = match &dialog {
            Dialog::Info { title, message } => (title, message, egui::Color32::LIGHT_GREEN),
            Dialog::Error { title, message } => (title, message, egui::Color32::LIGHT_RED),
        };

        egui::Window::new(title.as_str())
            .collapsible(false)
            .resizable(false)
            .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
            .show(ctx, |ui| {
                ui.label(egui::RichText::new(message.as_str()).color(color));
                ui.add_space(8.0);
                if ui.button("OK").clicked() {
                    self.acknowledge();
                }
            });
    }
}
