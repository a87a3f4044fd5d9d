// app.rs
pub mod gui;
pub mod image_processing;
pub mod file_dialogs;
pub mod view_model;

use eframe::egui;
use eframe::App as EframeApp;
use egui_extras::RetainedImage;
use image_processing::{OptimizeError, OptimizerSettings};
use parking_lot::Mutex;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use tempfile::TempDir;
use view_model::{Property, ViewModel};

use crate::utils::Logger;

pub const TITLE: &str = "Optimize images";
pub const BUSY_TITLE: &str = "Optimizing image";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CompressionMode {
    #[default]
    Lossless,
    Lossy,
}

impl CompressionMode {
    pub const ALL: [CompressionMode; 2] = [CompressionMode::Lossless, CompressionMode::Lossy];

    pub fn label(self) -> &'static str {
        match self {
            CompressionMode::Lossless => "Lossless",
            CompressionMode::Lossy => "Lossy (May result in degraded image)",
        }
    }
}

/// A file on disk and its length at the time it was last read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageFileInfo {
    pub path: PathBuf,
    pub length: u64,
}

impl ImageFileInfo {
    pub fn from_path(path: impl Into<PathBuf>) -> io::Result<Self> {
        let path = path.into();
        let length = std::fs::metadata(&path)?.len();
        Ok(Self { path, length })
    }

    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// The optimized copy of the selected image. Dropping it removes the
/// temporary directory the copy lives in.
#[derive(Debug)]
pub struct OptimizedImage {
    pub file: ImageFileInfo,
    pub mode: CompressionMode,
    /// False when re-encoding did not beat the original and the copy was kept as is.
    pub replaced: bool,
    temp_dir: Option<TempDir>,
}

impl OptimizedImage {
    pub fn new(file: ImageFileInfo, mode: CompressionMode, replaced: bool) -> Self {
        Self { file, mode, replaced, temp_dir: None }
    }

    pub fn with_temp_dir(mut self, temp_dir: TempDir) -> Self {
        self.temp_dir = Some(temp_dir);
        self
    }
}

pub enum OptimizationUpdate {
    Finished(Result<OptimizedImage, OptimizeError>),
}

pub struct App {
    pub view_model: ViewModel,
    pub settings: OptimizerSettings,
    pub log_messages: Arc<Mutex<Vec<String>>>,
    pub logger: Logger,
    pub selected_preview: Option<RetainedImage>,
    pub optimized_preview: Option<RetainedImage>,
    pub show_optimized: bool,
    pub last_error: Option<String>,
    pub optimization_receiver: Option<Receiver<OptimizationUpdate>>,
    property_changes: Receiver<Property>,
}

impl Default for App {
    fn default() -> Self {
        let log_messages = Arc::new(Mutex::new(Vec::new()));
        let logger = Logger::new(log_messages.clone());
        let mut view_model = ViewModel::new();
        let property_changes = view_model.subscribe();

        Self {
            view_model,
            settings: OptimizerSettings::default(),
            log_messages,
            logger,
            selected_preview: None,
            optimized_preview: None,
            show_optimized: false,
            last_error: None,
            optimization_receiver: None,
            property_changes,
        }
    }
}

impl App {
    /// Applies the outcome of a running optimization, if one has arrived.
    /// A worker that went away without reporting counts as a failed job.
    pub fn poll_optimization(&mut self) {
        let Some(receiver) = &self.optimization_receiver else {
            return;
        };

        let result = match receiver.try_recv() {
            Ok(OptimizationUpdate::Finished(result)) => result.map_err(|e| e.to_string()),
            Err(TryRecvError::Empty) => return,
            Err(TryRecvError::Disconnected) => {
                self.logger.log("Optimization failed: the worker exited without a result");
                Err("the optimizer stopped unexpectedly".to_string())
            }
        };

        match result {
            Ok(optimized) => {
                self.last_error = None;
                self.view_model.set_optimized_image(Some(optimized));
            }
            Err(e) => {
                self.last_error = Some(e);
                self.view_model.set_optimized_image(None);
            }
        }
        self.view_model.set_optimizing(false);
        self.optimization_receiver = None;
    }
}

impl EframeApp for App {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        let mut needs_redraw = false;

        self.poll_optimization();

        while let Ok(property) = self.property_changes.try_recv() {
            match property {
                Property::SelectedImage => {
                    self.selected_preview = self
                        .view_model
                        .selected_image()
                        .and_then(|info| load_preview(&info.path, &self.logger));
                }
                Property::OptimizedImage => {
                    self.optimized_preview = self
                        .view_model
                        .optimized_image()
                        .and_then(|optimized| load_preview(&optimized.file.path, &self.logger));
                }
                Property::IsOptimizing => {
                    let title = if self.view_model.is_optimizing() { BUSY_TITLE } else { TITLE };
                    frame.set_window_title(title);
                }
                Property::SelectedImageInfo
                | Property::OptimizedImageInfo
                | Property::SelectedMode => {}
            }
            needs_redraw = true;
        }

        gui::render(self, ctx);

        // Keep polling the worker while it runs.
        if needs_redraw || self.optimization_receiver.is_some() {
            ctx.request_repaint();
        }
    }
}

fn load_preview(path: &Path, logger: &Logger) -> Option<RetainedImage> {
    let decoded = image::io::Reader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.decode());

    match decoded {
        Ok(img) => {
            let rgba = img.to_rgba8();
            let size = [rgba.width() as usize, rgba.height() as usize];
            let color_image = egui::ColorImage::from_rgba_unmultiplied(size, rgba.as_raw());
            Some(RetainedImage::from_color_image(path.display().to_string(), color_image))
        }
        Err(e) => {
            logger.log(format!("Failed to load preview for {}: {}", path.display(), e));
            None
        }
    }
}
