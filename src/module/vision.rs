//! Banknote recognition.
//!
//! A scan goes through a single capability, [`Recognizer`]. Two adapters
//! implement it: [`LocalRecognizer`] runs the ONNX classifier on device and
//! [`RemoteRecognizer`] uploads the capture to the prediction backend.

use std::thread;
use std::time::{Duration, Instant};

use crate::module::com::{BackendClient, BackendPrediction};
use crate::module::error::ScanError;
use crate::module::util::conf::InferenceBackend;
use crate::module::util::init::RupiahProperty;

pub mod classifier;
pub mod decoder;
pub mod denomination;
pub mod preprocess;

use classifier::{ModelHandle, ModelStatus};
use decoder::{PredictionResult, ResultDecoder};
use preprocess::{ImagePreprocessor, RawImage};

// Poll interval while waiting for readiness.
const READY_POLL: Duration = Duration::from_millis(50);

// File name the resized capture is uploaded under.
const UPLOAD_NAME: &str = "capture.jpg";

/// Recognize the denomination on a captured banknote.
///
pub trait Recognizer: Send + Sync {
    fn predict(&self, image: &RawImage) -> Result<PredictionResult, ScanError>;

    /// Whether a scan may start now.
    fn is_ready(&self) -> bool;

    /// Blocks until ready or `timeout` elapses.
    fn wait_ready(&self, timeout: Duration) -> Result<(), ScanError> {
        let deadline = Instant::now() + timeout;
        while !self.is_ready() {
            if Instant::now() >= deadline {
                return Err(ScanError::ModelNotReady(format!(
                    "not ready after {:?}",
                    timeout
                )));
            }
            thread::sleep(READY_POLL);
        }
        Ok(())
    }
}

/// On-device recognizer: preprocess, classify, decode.
///
pub struct LocalRecognizer {
    preprocessor: ImagePreprocessor,
    model: ModelHandle,
    decoder: ResultDecoder,
}

impl LocalRecognizer {
    pub fn new(preprocessor: ImagePreprocessor, model: ModelHandle) -> Self {
        Self {
            preprocessor,
            model,
            decoder: ResultDecoder,
        }
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }
}

impl Recognizer for LocalRecognizer {
    fn predict(&self, image: &RawImage) -> Result<PredictionResult, ScanError> {
        self.model.ensure_ready()?;
        let tensor = self.preprocessor.preprocess(image)?;
        let scores = self.model.predict(&tensor)?;
        self.decoder.decode(&scores)
    }

    fn is_ready(&self) -> bool {
        self.model.is_ready()
    }

    /// Returns early with the load error instead of waiting out the timeout.
    fn wait_ready(&self, timeout: Duration) -> Result<(), ScanError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.model.status() {
                ModelStatus::Ready(_) => return Ok(()),
                ModelStatus::Failed(msg) => {
                    return Err(ScanError::ModelNotReady(format!(
                        "model failed to load: {msg}"
                    )))
                }
                ModelStatus::NotReady if Instant::now() >= deadline => {
                    return Err(ScanError::ModelNotReady(format!(
                        "model still loading after {:?}",
                        timeout
                    )))
                }
                ModelStatus::NotReady => thread::sleep(READY_POLL),
            }
        }
    }
}

/// Backend recognizer: resize, upload, map the answer.
///
pub struct RemoteRecognizer {
    preprocessor: ImagePreprocessor,
    client: BackendClient,
}

impl RemoteRecognizer {
    pub fn new(preprocessor: ImagePreprocessor, client: BackendClient) -> Self {
        Self {
            preprocessor,
            client,
        }
    }

    pub fn client(&self) -> &BackendClient {
        &self.client
    }
}

impl Recognizer for RemoteRecognizer {
    fn predict(&self, image: &RawImage) -> Result<PredictionResult, ScanError> {
        if self.client.is_loading() {
            return Err(ScanError::Busy);
        }
        let jpeg = self.preprocessor.resize_to_jpeg(image)?;
        let answer = self.client.predict_bytes(UPLOAD_NAME, jpeg)?;
        from_backend(answer)
    }

    fn is_ready(&self) -> bool {
        !self.client.is_loading()
    }
}

/// Converts a backend answer into a prediction; `success == false` is an error.
pub fn from_backend(answer: BackendPrediction) -> Result<PredictionResult, ScanError> {
    if !answer.success {
        let reason = if answer.label.is_empty() {
            "backend reported no match".to_string()
        } else {
            answer.label
        };
        return Err(ScanError::Unrecognized(reason));
    }
    Ok(PredictionResult {
        label: answer.label,
        value: answer.value.round().max(0.0) as u32,
        confidence: answer.confidence.round().clamp(0.0, 100.0) as u8,
        probabilities: Vec::new(),
    })
}

/// Builds the recognizer selected in the config.
///
/// The local variant starts loading the model in the background and returns
/// immediately; scans are refused until the load completes.
pub fn build(property: &RupiahProperty) -> Result<Box<dyn Recognizer>, ScanError> {
    let conf = &property.conf;
    let preprocessor = ImagePreprocessor::new(conf.preprocess.resize_filter);
    match conf.inference.backend {
        InferenceBackend::Local => {
            let model = ModelHandle::new();
            let _loader = model.load_onnx_async(
                &conf.model.path,
                conf.model.intra_threads,
                conf.model.optimization_level,
            )?;
            Ok(Box::new(LocalRecognizer::new(preprocessor, model)))
        }
        InferenceBackend::Remote => {
            let endpoint = conf.backend.resolved_endpoint();
            log::info!("Using prediction backend at {}", endpoint);
            let client = BackendClient::new(&endpoint, conf.backend.timeout())?;
            Ok(Box::new(RemoteRecognizer::new(preprocessor, client)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::classifier::tests::FixedModel;
    use super::preprocess::tests::encode_png;
    use super::*;
    use crate::module::com::tests::serve_once;
    use image::{Rgb, RgbImage};

    fn capture() -> RawImage {
        let img = RgbImage::from_fn(300, 200, |x, y| Rgb([(x % 256) as u8, (y % 256) as u8, 90]));
        RawImage::from_bytes(encode_png(&img))
    }

    #[test]
    fn local_scan_end_to_end() {
        let model = ModelHandle::new();
        model
            .load_async(|| Ok(FixedModel::new(vec![0.0, 0.0, 0.0, 6.0, 0.0, 0.0, 0.0])))
            .unwrap()
            .join()
            .unwrap();
        let recognizer = LocalRecognizer::new(ImagePreprocessor::default(), model);
        recognizer.wait_ready(Duration::from_secs(1)).unwrap();
        let result = recognizer.predict(&capture()).unwrap();
        assert_eq!(result.label, "Sepuluh Ribu Rupiah");
        assert_eq!(result.value, 10_000);
        assert_eq!(result.probabilities.len(), 7);
        assert!(result.confidence >= 90);
    }

    #[test]
    fn local_scan_refused_until_loaded() {
        let recognizer = LocalRecognizer::new(ImagePreprocessor::default(), ModelHandle::new());
        assert!(!recognizer.is_ready());
        let err = recognizer.predict(&capture()).unwrap_err();
        assert!(matches!(err, ScanError::ModelNotReady(_)));
        assert!(recognizer.wait_ready(Duration::from_millis(100)).is_err());
    }

    #[test]
    fn local_wait_ready_reports_load_failure() {
        let model = ModelHandle::new();
        model
            .load_async(|| -> Result<FixedModel, ScanError> {
                Err(ScanError::ModelLoad("corrupt model".to_string()))
            })
            .unwrap()
            .join()
            .unwrap();
        let recognizer = LocalRecognizer::new(ImagePreprocessor::default(), model);
        let err = recognizer.wait_ready(Duration::from_secs(30)).unwrap_err();
        assert!(err.to_string().contains("corrupt model"));
    }

    #[test]
    fn local_scan_rejects_undecodable_capture() {
        let model = ModelHandle::new();
        model
            .load_async(|| Ok(FixedModel::new(vec![0.0; 7])))
            .unwrap()
            .join()
            .unwrap();
        let recognizer = LocalRecognizer::new(ImagePreprocessor::default(), model);
        let err = recognizer
            .predict(&RawImage::from_bytes(b"not an image".to_vec()))
            .unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }

    #[test]
    fn remote_scan_end_to_end() {
        let body = r#"{"success": true, "label": "Dua Puluh Ribu Rupiah", "value": 20000, "confidence": 88.6}"#;
        let (addr, server) = serve_once("200 OK", body, None);
        let client = BackendClient::new(&addr, Duration::from_secs(5)).unwrap();
        let recognizer = RemoteRecognizer::new(ImagePreprocessor::default(), client);
        let result = recognizer.predict(&capture()).unwrap();
        assert_eq!(result.value, 20_000);
        assert_eq!(result.confidence, 89);
        assert!(result.probabilities.is_empty());

        let (request, _) = server.join().unwrap();
        assert!(request.contains("filename=\"capture.jpg\""));
        assert!(request.contains("image/jpeg"));
    }

    #[test]
    fn unsuccessful_backend_answer_is_unrecognized() {
        let err = from_backend(BackendPrediction::default()).unwrap_err();
        assert!(matches!(err, ScanError::Unrecognized(_)));

        let ok = from_backend(BackendPrediction {
            success: true,
            label: "Seribu Rupiah".to_string(),
            value: 1000.0,
            confidence: 0.0,
        })
        .unwrap();
        assert_eq!(ok.confidence, 0);
        assert_eq!(ok.denomination(), Some(denomination::Denomination::Seribu));
    }
}
