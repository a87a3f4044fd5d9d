// file_dialogs.rs
use rfd::FileDialog;
use std::path::PathBuf;

pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp", "tif", "tiff", "webp"];

pub fn select_image() -> Option<PathBuf> {
    FileDialog::new()
        .set_title("Select an image")
        .add_filter("Image", IMAGE_EXTENSIONS)
        .add_filter("All files", &["*"])
        .pick_file()
}
