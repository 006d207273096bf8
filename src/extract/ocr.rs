//! Image OCR through the `tesseract` command-line engine.

use std::io::Cursor;
use std::process::Stdio;

use async_trait::async_trait;
use image::ImageFormat;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{ExtractionError, ExtractionResult, Extractor, Upload};

/// OCR engine binary looked up on `PATH`.
pub const DEFAULT_OCR_BINARY: &str = "tesseract";

/// Language pack passed to the engine.
pub const DEFAULT_OCR_LANGUAGE: &str = "eng";

/// Reads text from label photos.
///
/// The image is decoded and converted to grayscale PNG before being piped
/// to the engine, so any format the `image` crate reads is accepted.
#[derive(Debug, Clone)]
pub struct OcrExtractor {
    binary: String,
    language: String,
}

impl Default for OcrExtractor {
    fn default() -> Self {
        Self {
            binary: DEFAULT_OCR_BINARY.to_string(),
            language: DEFAULT_OCR_LANGUAGE.to_string(),
        }
    }
}

impl OcrExtractor {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    /// Decode an image and re-encode it as grayscale PNG.
    pub fn normalize(bytes: &[u8]) -> ExtractionResult<Vec<u8>> {
        let image = image::load_from_memory(bytes)?.grayscale();
        let mut png = Cursor::new(Vec::new());
        image.write_to(&mut png, ImageFormat::Png)?;
        Ok(png.into_inner())
    }

    async fn run_engine(&self, png: Vec<u8>) -> ExtractionResult<String> {
        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", self.language.as_str()])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ExtractionError::OcrUnavailable {
                binary: self.binary.clone(),
                source,
            })?;

        // An engine that exits early breaks the pipe; its stderr says why,
        // so the write error is held until the exit status is known.
        let written = match child.stdin.take() {
            // Dropping stdin at the end of the arm closes the pipe.
            Some(mut stdin) => stdin.write_all(&png).await,
            None => Ok(()),
        };

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ExtractionError::Ocr(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }
        written?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl Extractor for OcrExtractor {
    async fn extract(&self, upload: &Upload) -> ExtractionResult<String> {
        let bytes = upload.bytes.clone();
        let png = tokio::task::spawn_blocking(move || Self::normalize(&bytes))
            .await
            .map_err(|e| ExtractionError::Task(e.to_string()))??;

        debug!(file = %upload.file_name, png_bytes = png.len(), "Running OCR");
        self.run_engine(png).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma, RgbImage};

    fn sample_png() -> Vec<u8> {
        let image = RgbImage::from_pixel(4, 4, image::Rgb([200, 10, 10]));
        let mut buf = Cursor::new(Vec::new());
        image.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    #[test]
    fn test_normalize_produces_grayscale_png() {
        let png = OcrExtractor::normalize(&sample_png()).unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!(decoded.color(), image::ColorType::L8);
        assert_eq!((decoded.width(), decoded.height()), (4, 4));
    }

    #[test]
    fn test_normalize_rejects_garbage() {
        let err = OcrExtractor::normalize(b"definitely not an image").unwrap_err();
        assert!(matches!(err, ExtractionError::Image(_)));
    }

    #[tokio::test]
    async fn test_missing_engine_is_reported() {
        let gray = GrayImage::from_pixel(2, 2, Luma([255]));
        let mut buf = Cursor::new(Vec::new());
        gray.write_to(&mut buf, ImageFormat::Png).unwrap();

        let extractor = OcrExtractor::new("arcticchat-no-such-ocr-engine", "eng");
        let err = extractor
            .extract(&Upload::new("label.png", buf.into_inner()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::OcrUnavailable { .. }));
    }

    /// Shell script standing in for the OCR engine.
    #[cfg(unix)]
    fn fake_engine(dir: &tempfile::TempDir, script: &str) -> String {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.path().join("fake-ocr");
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_output_is_returned() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = fake_engine(
            &dir,
            "#!/bin/sh\ncat > /dev/null\necho 'Ingredients: sugar, E951'\n",
        );

        let text = OcrExtractor::new(engine, "eng")
            .extract(&Upload::new("label.png", sample_png()))
            .await
            .unwrap();
        assert_eq!(text.trim(), "Ingredients: sugar, E951");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_engine_exiting_early_reports_its_stderr() {
        let dir = tempfile::TempDir::new().unwrap();
        // Exits without reading stdin, so the image write may hit a broken pipe
        let engine = fake_engine(
            &dir,
            "#!/bin/sh\necho \"Failed loading language 'xx'\" >&2\nexit 1\n",
        );
        let large = RgbImage::from_pixel(512, 512, image::Rgb([120, 80, 40]));
        let mut buf = Cursor::new(Vec::new());
        large.write_to(&mut buf, ImageFormat::Png).unwrap();

        let err = OcrExtractor::new(engine, "xx")
            .extract(&Upload::new("label.png", buf.into_inner()))
            .await
            .unwrap_err();
        match err {
            ExtractionError::Ocr(message) => {
                assert!(message.contains("Failed loading language"), "{message}")
            }
            other => panic!("expected an OCR failure, got {other:?}"),
        }
    }
}
