// view_model.rs
use crate::app::{CompressionMode, ImageFileInfo, OptimizedImage};
use crate::humanizer::humanize_len;
use std::sync::mpsc::{channel, Receiver, Sender};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Property {
    SelectedImage,
    SelectedImageInfo,
    OptimizedImage,
    OptimizedImageInfo,
    SelectedMode,
    IsOptimizing,
}

/// State behind the window. Every setter announces what changed to all
/// subscribers.
#[derive(Default)]
pub struct ViewModel {
    selected_image: Option<ImageFileInfo>,
    optimized_image: Option<OptimizedImage>,
    selected_mode: CompressionMode,
    is_optimizing: bool,
    subscribers: Vec<Sender<Property>>,
}

impl ViewModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self) -> Receiver<Property> {
        let (sender, receiver) = channel();
        self.subscribers.push(sender);
        receiver
    }

    fn notify(&mut self, property: Property) {
        self.subscribers.retain(|subscriber| subscriber.send(property).is_ok());
    }

    pub fn selected_image(&self) -> Option<&ImageFileInfo> {
        self.selected_image.as_ref()
    }

    pub fn optimized_image(&self) -> Option<&OptimizedImage> {
        self.optimized_image.as_ref()
    }

    pub fn selected_mode(&self) -> CompressionMode {
        self.selected_mode
    }

    pub fn is_optimizing(&self) -> bool {
        self.is_optimizing
    }

    pub fn modes(&self) -> &'static [CompressionMode] {
        &CompressionMode::ALL
    }

    /// Replaces the selection. Any previous optimization result is discarded.
    pub fn set_selected_image(&mut self, info: Option<ImageFileInfo>) {
        self.selected_image = info;
        self.notify(Property::SelectedImage);
        self.notify(Property::SelectedImageInfo);
        self.set_optimized_image(None);
    }

    pub fn set_optimized_image(&mut self, optimized: Option<OptimizedImage>) {
        self.optimized_image = optimized;
        self.notify(Property::OptimizedImage);
        self.notify(Property::OptimizedImageInfo);
    }

    pub fn set_selected_mode(&mut self, mode: CompressionMode) {
        self.selected_mode = mode;
        self.notify(Property::SelectedMode);
    }

    pub fn set_optimizing(&mut self, optimizing: bool) {
        self.is_optimizing = optimizing;
        self.notify(Property::IsOptimizing);
    }

    pub fn selected_image_info_str(&self) -> String {
        match &self.selected_image {
            Some(info) => format!("Size: {}", size_str(info.length)),
            None => String::new(),
        }
    }

    pub fn optimized_image_info_str(&self) -> String {
        let (Some(selected), Some(optimized)) = (&self.selected_image, &self.optimized_image) else {
            return String::new();
        };

        let optimized_length = optimized.file.length;
        let diff = size_str(selected.length.abs_diff(optimized_length));
        let sign = if optimized_length < selected.length { '-' } else { '+' };
        format!("Size: {} ({}{})", size_str(optimized_length), sign, diff)
    }

    /// Fraction of the original size saved by the optimized copy.
    pub fn savings_ratio(&self) -> Option<f64> {
        let selected = self.selected_image.as_ref()?;
        let optimized = self.optimized_image.as_ref()?;
        if selected.length == 0 {
            return None;
        }
        Some(1.0 - optimized.file.length as f64 / selected.length as f64)
    }
}

fn size_str(length: u64) -> String {
    humanize_len(length).unwrap_or_else(|e| e.to_string())
}
