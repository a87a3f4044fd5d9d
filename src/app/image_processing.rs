// image_processing.rs
use crate::app::{CompressionMode, ImageFileInfo, OptimizationUpdate, OptimizedImage};
use crate::utils::{Logger, measure_time, get_memory_usage};
use image::codecs::gif::GifDecoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::io::Reader as ImageReader;
use image::{AnimationDecoder, ColorType, DynamicImage, ImageEncoder, ImageError, ImageFormat};
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OptimizeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("image codec error: {0}")]
    Image(#[from] ImageError),
    #[error("failed to encode image: {0}")]
    Encoding(String),
    #[error("unrecognized image format: {}", .0.display())]
    UnknownFormat(PathBuf),
}

/// Largest width or height libwebp accepts.
pub const WEBP_MAX_DIMENSION: u32 = 16383;

#[derive(Clone, Copy, Debug)]
pub struct OptimizerSettings {
    /// Quality used by lossy encoders, 1 to 100.
    pub lossy_quality: f32,
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self { lossy_quality: 80.0 }
    }
}

impl OptimizerSettings {
    pub fn quality(&self) -> f32 {
        self.lossy_quality.clamp(1.0, 100.0)
    }
}

/// Copies `source` into a fresh temporary directory and optimizes the copy.
///
/// The copy is only overwritten when the re-encoded bytes are smaller, so
/// the result is never larger than the source. The source is left untouched.
pub fn optimize_image(
    source: &Path,
    mode: CompressionMode,
    settings: &OptimizerSettings,
    logger: &Logger,
) -> Result<OptimizedImage, OptimizeError> {
    logger.log(format!("Optimizing {} ({})", source.display(), mode.label()));
    logger.log(get_memory_usage());

    let temp_dir = tempfile::Builder::new().prefix("image-optimizer-").tempdir()?;
    let copy_path = temp_dir.path().join(temp_file_name(source));
    fs::copy(source, &copy_path)?;
    let original_length = fs::metadata(&copy_path)?.len();
    logger.log(format!("Copied source to {}", copy_path.display()));

    let (load_result, load_duration) = measure_time(|| load_image(&copy_path));
    let (img, format) = load_result?;
    logger.log(format!(
        "Loaded {}x{} {:?} image in {:?}",
        img.width(),
        img.height(),
        format,
        load_duration
    ));

    if let Some(reason) = keep_reason(&copy_path, &img, format, mode)? {
        logger.log(format!("Keeping the original bytes: {}", reason));
        let file = ImageFileInfo::from_path(copy_path)?;
        return Ok(OptimizedImage::new(file, mode, false).with_temp_dir(temp_dir));
    }

    let (encode_result, encode_duration) = measure_time(|| encode_image(&img, format, mode, settings));
    let (encoded, output_format) = encode_result?;
    logger.log(format!(
        "Encoded {:?} ({} bytes) in {:?}",
        output_format,
        encoded.len(),
        encode_duration
    ));

    let replaced = (encoded.len() as u64) < original_length;
    let output_path = if replaced {
        let output_path = match output_format.extensions_str().first() {
            Some(extension) => copy_path.with_extension(extension),
            None => copy_path.clone(),
        };
        let (save_result, save_duration) = measure_time(|| fs::write(&output_path, &encoded));
        save_result?;
        if output_path != copy_path {
            fs::remove_file(&copy_path)?;
        }
        logger.log(format!("Saved optimized file to {} in {:?}", output_path.display(), save_duration));
        output_path
    } else {
        logger.log("Re-encoded image is not smaller, keeping the original bytes");
        copy_path
    };

    let file = ImageFileInfo::from_path(output_path)?;
    logger.log(get_memory_usage());
    Ok(OptimizedImage::new(file, mode, replaced).with_temp_dir(temp_dir))
}

/// Runs [`optimize_image`] on a worker thread and reports the outcome on `sender`.
pub fn spawn_optimization(
    source: PathBuf,
    mode: CompressionMode,
    settings: OptimizerSettings,
    logger: Logger,
    sender: Sender<OptimizationUpdate>,
) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name("optimizer".to_string())
        .spawn(move || {
            let (result, duration) = measure_time(|| optimize_image(&source, mode, &settings, &logger));
            match &result {
                Ok(_) => logger.log(format!("Optimization finished in {:?}", duration)),
                Err(e) => logger.log(format!("Optimization failed: {}", e)),
            }
            // The receiver is gone if the window closed mid-job.
            let _ = sender.send(OptimizationUpdate::Finished(result));
        })
        .map(|_| ())
}

fn temp_file_name(source: &Path) -> String {
    let id = Uuid::new_v4();
    match source.extension() {
        Some(extension) => format!("{}.{}", id, extension.to_string_lossy()),
        None => id.to_string(),
    }
}

fn load_image(path: &Path) -> Result<(DynamicImage, ImageFormat), OptimizeError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    let format = reader
        .format()
        .ok_or_else(|| OptimizeError::UnknownFormat(path.to_path_buf()))?;
    Ok((reader.decode()?, format))
}

/// Why re-encoding the decoded image would lose content, if it would.
fn keep_reason(
    path: &Path,
    img: &DynamicImage,
    format: ImageFormat,
    mode: CompressionMode,
) -> Result<Option<&'static str>, OptimizeError> {
    // Decoding keeps only the first frame.
    if is_animated(path, format)? {
        return Ok(Some("animated images are not re-encoded"));
    }
    let eight_bit = matches!(
        img,
        DynamicImage::ImageLuma8(_)
            | DynamicImage::ImageLumaA8(_)
            | DynamicImage::ImageRgb8(_)
            | DynamicImage::ImageRgba8(_)
    );
    if mode == CompressionMode::Lossless && format != ImageFormat::Png && !eight_bit {
        return Ok(Some("lossless WebP only holds 8-bit samples"));
    }
    Ok(None)
}

fn is_animated(path: &Path, format: ImageFormat) -> Result<bool, OptimizeError> {
    match format {
        ImageFormat::Gif => {
            let decoder = GifDecoder::new(BufReader::new(File::open(path)?))?;
            Ok(decoder.into_frames().take(2).count() > 1)
        }
        ImageFormat::WebP => {
            // RIFF header, then a VP8X chunk whose flags byte carries the animation bit.
            let bytes = fs::read(path)?;
            Ok(bytes.len() > 20 && &bytes[12..16] == b"VP8X" && bytes[20] & 0x02 != 0)
        }
        _ => Ok(false),
    }
}

fn encode_image(
    img: &DynamicImage,
    format: ImageFormat,
    mode: CompressionMode,
    settings: &OptimizerSettings,
) -> Result<(Vec<u8>, ImageFormat), OptimizeError> {
    match (mode, format) {
        (CompressionMode::Lossless, ImageFormat::Png) => Ok((encode_to_png(img)?, ImageFormat::Png)),
        (CompressionMode::Lossless, _) => Ok((encode_to_webp(img, None)?, ImageFormat::WebP)),
        (CompressionMode::Lossy, ImageFormat::Jpeg) => {
            Ok((encode_to_jpeg(img, settings.quality())?, ImageFormat::Jpeg))
        }
        (CompressionMode::Lossy, _) => {
            Ok((encode_to_webp(img, Some(settings.quality()))?, ImageFormat::WebP))
        }
    }
}

fn encode_to_png(img: &DynamicImage) -> Result<Vec<u8>, OptimizeError> {
    // PNG has no float samples.
    let converted;
    let img = match img.color() {
        ColorType::Rgb32F | ColorType::Rgba32F => {
            converted = DynamicImage::ImageRgba16(img.to_rgba16());
            &converted
        }
        _ => img,
    };

    let mut bytes = Vec::new();
    PngEncoder::new_with_quality(&mut bytes, CompressionType::Best, FilterType::Adaptive)
        .write_image(img.as_bytes(), img.width(), img.height(), img.color())?;
    Ok(bytes)
}

fn encode_to_jpeg(img: &DynamicImage, quality: f32) -> Result<Vec<u8>, OptimizeError> {
    let rgb = img.to_rgb8();
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality.round() as u8)
        .encode(rgb.as_raw(), rgb.width(), rgb.height(), ColorType::Rgb8)?;
    Ok(bytes)
}

/// Lossless when `quality` is `None`.
fn encode_to_webp(img: &DynamicImage, quality: Option<f32>) -> Result<Vec<u8>, OptimizeError> {
    // The WebP encoder only takes 8-bit RGB(A).
    let converted;
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img,
        _ => {
            converted = DynamicImage::ImageRgba8(img.to_rgba8());
            &converted
        }
    };

    if img.width() > WEBP_MAX_DIMENSION || img.height() > WEBP_MAX_DIMENSION {
        return Err(OptimizeError::Encoding(format!(
            "{}x{} exceeds the WebP limit of {} pixels per side",
            img.width(),
            img.height(),
            WEBP_MAX_DIMENSION
        )));
    }

    let encoder = webp::Encoder::from_image(img).map_err(|e| OptimizeError::Encoding(e.to_string()))?;
    let webp = match quality {
        Some(quality) => encoder.encode_simple(false, quality),
        None => encoder.encode_simple(true, 75.0),
    }
    .map_err(|e| OptimizeError::Encoding(format!("{:?}", e)))?;
    Ok(webp.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Delay, Frame, ImageBuffer, Rgb, RgbImage, Rgba, RgbaImage};
    use parking_lot::Mutex;
    use std::sync::mpsc::channel;
    use std::sync::Arc;
    use std::time::Duration;

    fn logger() -> Logger {
        Logger::new(Arc::new(Mutex::new(Vec::new())))
    }

    fn gradient() -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| Rgb([(x * 4) as u8, (y * 4) as u8, 128]))
    }

    fn write_uncompressed_png(path: &Path, img: &RgbImage) {
        let file = File::create(path).unwrap();
        PngEncoder::new_with_quality(file, CompressionType::Fast, FilterType::NoFilter)
            .write_image(img.as_raw(), img.width(), img.height(), ColorType::Rgb8)
            .unwrap();
    }

    #[test]
    fn lossless_png_keeps_pixels_and_shrinks() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gradient.png");
        let img = gradient();
        write_uncompressed_png(&source, &img);
        let source_bytes = fs::read(&source).unwrap();

        let optimized = optimize_image(&source, CompressionMode::Lossless, &OptimizerSettings::default(), &logger()).unwrap();

        assert_eq!(optimized.mode, CompressionMode::Lossless);
        assert!(optimized.file.length <= source_bytes.len() as u64);
        assert_ne!(optimized.file.path.parent(), source.parent());
        assert!(image::open(&optimized.file.path).unwrap().to_rgb8() == img);
        assert_eq!(fs::read(&source).unwrap(), source_bytes);
    }

    #[test]
    fn lossy_bmp_becomes_webp() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("flat.bmp");
        RgbImage::from_pixel(128, 128, Rgb([200, 40, 40])).save(&source).unwrap();
        let source_length = fs::metadata(&source).unwrap().len();

        let optimized = optimize_image(&source, CompressionMode::Lossy, &OptimizerSettings::default(), &logger()).unwrap();

        assert!(optimized.replaced);
        assert!(optimized.file.length < source_length);
        assert_eq!(optimized.file.path.extension().unwrap(), "webp");
        let decoded = image::open(&optimized.file.path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (128, 128));
    }

    #[test]
    fn lossy_jpeg_stays_jpeg_and_never_grows() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("photo.jpg");
        gradient().save(&source).unwrap();
        let source_bytes = fs::read(&source).unwrap();

        let settings = OptimizerSettings { lossy_quality: 40.0 };
        let optimized = optimize_image(&source, CompressionMode::Lossy, &settings, &logger()).unwrap();

        assert!(optimized.file.length <= source_bytes.len() as u64);
        assert_eq!(image::open(&optimized.file.path).unwrap().width(), 64);
        if !optimized.replaced {
            assert_eq!(fs::read(&optimized.file.path).unwrap(), source_bytes);
        }
    }

    #[test]
    fn temp_dir_is_removed_with_the_result() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gradient.png");
        write_uncompressed_png(&source, &gradient());

        let optimized = optimize_image(&source, CompressionMode::Lossless, &OptimizerSettings::default(), &logger()).unwrap();
        let path = optimized.file.path.clone();
        assert!(path.exists());
        drop(optimized);
        assert!(!path.exists());
    }

    #[test]
    fn rejects_files_that_are_not_images() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("notes.txt");
        fs::write(&source, "definitely not pixels").unwrap();

        let result = optimize_image(&source, CompressionMode::Lossless, &OptimizerSettings::default(), &logger());
        assert!(matches!(result, Err(OptimizeError::UnknownFormat(_))));
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = optimize_image(
            &dir.path().join("missing.png"),
            CompressionMode::Lossy,
            &OptimizerSettings::default(),
            &logger(),
        );
        assert!(matches!(result, Err(OptimizeError::Io(_))));
    }

    #[test]
    fn worker_reports_back_on_the_channel() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("gradient.png");
        write_uncompressed_png(&source, &gradient());

        let (sender, receiver) = channel();
        spawn_optimization(source, CompressionMode::Lossless, OptimizerSettings::default(), logger(), sender).unwrap();

        match receiver.recv_timeout(Duration::from_secs(30)).unwrap() {
            OptimizationUpdate::Finished(result) => assert!(result.is_ok()),
        }
    }

    fn write_animated_gif(path: &Path, frames: u8) {
        let mut encoder = GifEncoder::new(File::create(path).unwrap());
        let frames = (0..frames).map(|i| {
            let img = RgbaImage::from_fn(32, 32, |x, y| Rgba([(x * 8) as u8, (y * 8) as u8, i * 20, 255]));
            Frame::from_parts(img, 0, 0, Delay::from_numer_denom_ms(100, 1))
        });
        encoder.encode_frames(frames).unwrap();
    }

    fn gif_frame_count(path: &Path) -> usize {
        let decoder = GifDecoder::new(BufReader::new(File::open(path).unwrap())).unwrap();
        decoder.into_frames().count()
    }

    #[test]
    fn animated_gif_keeps_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("spinner.gif");
        write_animated_gif(&source, 10);
        let source_bytes = fs::read(&source).unwrap();

        for mode in CompressionMode::ALL {
            let optimized = optimize_image(&source, mode, &OptimizerSettings::default(), &logger()).unwrap();

            assert!(!optimized.replaced);
            assert_eq!(fs::read(&optimized.file.path).unwrap(), source_bytes);
            assert_eq!(gif_frame_count(&optimized.file.path), 10);
        }
    }

    #[test]
    fn still_gif_is_still_optimized() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("still.gif");
        write_animated_gif(&source, 1);

        let optimized = optimize_image(&source, CompressionMode::Lossless, &OptimizerSettings::default(), &logger()).unwrap();
        assert!(optimized.file.length <= fs::metadata(&source).unwrap().len());
    }

    #[test]
    fn sixteen_bit_tiff_is_not_squeezed_into_webp() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("deep.tif");
        let img: ImageBuffer<Rgb<u16>, Vec<u16>> =
            ImageBuffer::from_fn(32, 32, |x, y| Rgb([(x * 2000) as u16, (y * 2000) as u16, 12345]));
        img.save(&source).unwrap();
        let source_bytes = fs::read(&source).unwrap();

        let optimized = optimize_image(&source, CompressionMode::Lossless, &OptimizerSettings::default(), &logger()).unwrap();

        assert!(!optimized.replaced);
        assert_eq!(fs::read(&optimized.file.path).unwrap(), source_bytes);
    }

    #[test]
    fn oversized_webp_is_an_encoding_error() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(WEBP_MAX_DIMENSION + 1, 2, Rgb([1, 2, 3])));

        assert!(matches!(encode_to_webp(&img, None), Err(OptimizeError::Encoding(_))));
        assert!(matches!(encode_to_webp(&img, Some(80.0)), Err(OptimizeError::Encoding(_))));
    }

    #[test]
    fn webp_at_the_size_limit_encodes() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(WEBP_MAX_DIMENSION, 2, Rgb([1, 2, 3])));
        assert!(!encode_to_webp(&img, None).unwrap().is_empty());
    }

    #[test]
    fn oversized_bmp_fails_instead_of_crashing_the_worker() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("banner.bmp");
        RgbImage::from_pixel(WEBP_MAX_DIMENSION + 1, 2, Rgb([9, 9, 9])).save(&source).unwrap();

        let (sender, receiver) = channel();
        spawn_optimization(source, CompressionMode::Lossy, OptimizerSettings::default(), logger(), sender).unwrap();

        match receiver.recv_timeout(Duration::from_secs(30)).unwrap() {
            OptimizationUpdate::Finished(result) => {
                assert!(matches!(result, Err(OptimizeError::Encoding(_))))
            }
        }
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(OptimizerSettings { lossy_quality: 0.0 }.quality(), 1.0);
        assert_eq!(OptimizerSettings { lossy_quality: 250.0 }.quality(), 100.0);
        assert_eq!(OptimizerSettings::default().quality(), 80.0);
    }
}
