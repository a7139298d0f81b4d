//! Provide one scan.
//!
//! Capture on disk, recognize, log the outcome. The caller announces the result.

use std::path::Path;

use crate::module::error::ScanError;
use crate::module::vision::decoder::PredictionResult;
use crate::module::vision::preprocess::RawImage;
use crate::module::vision::Recognizer;

/// Recognize the banknote in the image at `image_path`.
///
/// Refused with the recognizer's own reason while it is not ready, so a second
/// scan never starts behind a pending one.
pub fn run<R: Recognizer + ?Sized>(
    recognizer: &R,
    image_path: &Path,
) -> Result<PredictionResult, ScanError> {
    let outcome = scan(recognizer, image_path);
    match &outcome {
        Ok(result) => log::info!(
            "Scan complete: {} ({} rupiah, {}%)",
            result.label,
            result.value,
            result.confidence
        ),
        Err(e) if e.is_fatal() => log::error!("Scan failed ({:?}): {}", e.kind(), e),
        Err(e) => log::warn!("Scan failed ({:?}): {}", e.kind(), e),
    }
    outcome
}

fn scan<R: Recognizer + ?Sized>(
    recognizer: &R,
    image_path: &Path,
) -> Result<PredictionResult, ScanError> {
    if !recognizer.is_ready() {
        return Err(ScanError::ModelNotReady(
            "recognizer is not ready to scan".to_string(),
        ));
    }
    log::debug!("Scanning {}", image_path.display());
    let image = RawImage::from_file(image_path)?;
    recognizer.predict(&image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::error::ErrorKind;
    use crate::module::vision::classifier::tests::FixedModel;
    use crate::module::vision::classifier::ModelHandle;
    use crate::module::vision::preprocess::tests::encode_png;
    use crate::module::vision::preprocess::ImagePreprocessor;
    use crate::module::vision::LocalRecognizer;
    use image::{Rgb, RgbImage};

    fn loaded(scores: Vec<f32>) -> LocalRecognizer {
        let model = ModelHandle::new();
        model
            .load_async(move || Ok(FixedModel::new(scores)))
            .unwrap()
            .join()
            .unwrap();
        LocalRecognizer::new(ImagePreprocessor::default(), model)
    }

    #[test]
    fn scans_capture_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.png");
        let img = RgbImage::from_pixel(640, 480, Rgb([120, 60, 30]));
        std::fs::write(&path, encode_png(&img)).unwrap();

        let recognizer = loaded(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 4.0]);
        let result = run(&recognizer, &path).unwrap();
        assert_eq!(result.value, 100_000);

        let boxed: Box<dyn Recognizer> = Box::new(recognizer);
        assert_eq!(run(boxed.as_ref(), &path).unwrap().value, 100_000);
    }

    #[test]
    fn missing_capture_is_reported() {
        let recognizer = loaded(vec![0.0; 7]);
        let err = run(&recognizer, Path::new("/nonexistent/capture.jpg")).unwrap_err();
        assert!(matches!(err, ScanError::Capture { .. }));
        assert_eq!(err.kind(), ErrorKind::ImageDecode);
    }

    #[test]
    fn scan_refused_while_not_ready() {
        let recognizer = LocalRecognizer::new(ImagePreprocessor::default(), ModelHandle::new());
        let err = run(&recognizer, Path::new("/nonexistent/capture.jpg")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ModelNotReady);
    }
}
