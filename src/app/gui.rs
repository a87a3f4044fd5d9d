use std::sync::mpsc::channel;
use crate::app::{App, ImageFileInfo};
use crate::app::file_dialogs;
use crate::app::image_processing;
use egui::{Color32, Frame, ProgressBar, Rounding, Slider, Stroke, RichText};
use egui_extras::RetainedImage;

const ACCENT: Color32 = Color32::from_rgb(100, 200, 250);
const TEXT: Color32 = Color32::from_rgb(200, 200, 200);
const PREVIEW_HEIGHT: f32 = 380.0;

pub fn render(app: &mut App, ctx: &egui::Context) {
    let frame = Frame {
        fill: Color32::from_rgb(30, 30, 40),
        rounding: Rounding::same(10.0),
        stroke: Stroke::new(1.0, ACCENT),
        inner_margin: egui::style::Margin::same(20.0),
        ..Default::default()
    };

    egui::CentralPanel::default().frame(frame).show(ctx, |ui| {
        ui.heading(RichText::new("Optimize images").size(28.0).color(ACCENT));
        ui.add_space(20.0);

        let optimizing = app.view_model.is_optimizing();

        ui.horizontal(|ui| {
            if ui.add_enabled(!optimizing, egui::Button::new("Select image")).clicked() {
                select_image(app);
            }

            ui.add_space(10.0);

            let mut mode = app.view_model.selected_mode();
            egui::ComboBox::from_id_source("compression_mode")
                .selected_text(mode.label())
                .width(260.0)
                .show_ui(ui, |ui| {
                    for candidate in app.view_model.modes() {
                        ui.selectable_value(&mut mode, *candidate, candidate.label());
                    }
                });
            if mode != app.view_model.selected_mode() {
                app.logger.log(format!("Mode set to {}", mode.label()));
                app.view_model.set_selected_mode(mode);
            }

            let lossy = mode == crate::app::CompressionMode::Lossy;
            ui.add_enabled(lossy, Slider::new(&mut app.settings.lossy_quality, 1.0..=100.0).text("Quality"));

            ui.add_space(10.0);

            let can_optimize = app.view_model.selected_image().is_some() && !optimizing;
            if ui.add_enabled(can_optimize, egui::Button::new("Optimize")).clicked() {
                start_optimization(app);
            }
        });

        ui.add_space(20.0);

        ui.columns(2, |columns| {
            columns[0].group(|ui| {
                ui.set_min_width(ui.available_width());
                let title = match app.view_model.selected_image() {
                    Some(info) => format!("Original: {}", info.name()),
                    None => "Original".to_string(),
                };
                ui.label(RichText::new(title).size(16.0).color(ACCENT));
                preview(ui, app.selected_preview.as_ref());
                ui.label(RichText::new(app.view_model.selected_image_info_str()).color(TEXT));
            });

            if app.show_optimized {
                columns[1].group(|ui| {
                    ui.set_min_width(ui.available_width());
                    let title = match app.view_model.optimized_image() {
                        Some(optimized) => format!("Optimized: {}", optimized.mode.label()),
                        None => "Optimized".to_string(),
                    };
                    ui.label(RichText::new(title).size(16.0).color(ACCENT));

                    if app.view_model.is_optimizing() {
                        ui.add(ProgressBar::new(0.5).animate(true).text("Optimizing..."));
                    } else if let Some(error) = &app.last_error {
                        ui.label(RichText::new(format!("Optimization failed: {}", error)).color(Color32::RED));
                    } else {
                        preview(ui, app.optimized_preview.as_ref());
                        ui.label(RichText::new(app.view_model.optimized_image_info_str()).color(TEXT));
                        if let Some(ratio) = app.view_model.savings_ratio() {
                            ui.label(RichText::new(format!("Savings: {:.2}%", ratio * 100.0)).color(TEXT));
                        }
                        if let Some(optimized) = app.view_model.optimized_image() {
                            if !optimized.replaced {
                                ui.label(RichText::new("Already optimal, original bytes kept").color(Color32::YELLOW));
                            }
                        }
                    }
                });
            }
        });

        ui.add_space(20.0);

        ui.group(|ui| {
            ui.set_min_width(ui.available_width());
            ui.label(RichText::new("Log").size(16.0).color(ACCENT));

            egui::ScrollArea::vertical()
                .max_height(160.0)
                .auto_shrink([false; 2])
                .show(ui, |ui| {
                let logs = app.log_messages.lock();
                for log in logs.iter() {
                    if log.contains("error") || log.contains("failed") {
                        ui.label(RichText::new(log).color(Color32::RED));
                    } else {
                        ui.label(log);
                    }
                }
            });
        });
    });
}

fn preview(ui: &mut egui::Ui, image: Option<&RetainedImage>) {
    match image {
        Some(image) => {
            image.show_max_size(ui, egui::vec2(ui.available_width(), PREVIEW_HEIGHT));
        }
        None => {
            ui.add_space(PREVIEW_HEIGHT);
        }
    }
}

fn select_image(app: &mut App) {
    let Some(path) = file_dialogs::select_image() else {
        return;
    };

    match ImageFileInfo::from_path(&path) {
        Ok(info) => {
            app.logger.log(format!("Selected {}", info.path.display()));
            app.view_model.set_selected_image(Some(info));
            app.show_optimized = false;
            app.last_error = None;
        }
        Err(e) => {
            app.logger.log(format!("Reading {} failed: {}", path.display(), e));
        }
    }
}

fn start_optimization(app: &mut App) {
    if app.view_model.is_optimizing() {
        return;
    }
    let Some(source) = app.view_model.selected_image().map(|info| info.path.clone()) else {
        return;
    };

    let (sender, receiver) = channel();
    let mode = app.view_model.selected_mode();
    match image_processing::spawn_optimization(source, mode, app.settings, app.logger.clone(), sender) {
        Ok(()) => {
            app.view_model.set_optimizing(true);
            app.optimization_receiver = Some(receiver);
            app.show_optimized = true;
            app.last_error = None;
        }
        Err(e) => {
            app.logger.log(format!("Starting the optimizer failed: {}", e));
        }
    }
}
