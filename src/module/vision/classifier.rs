//! Provide Banknote Classification
//!
//! The model is a process-wide resource: it is loaded once in the background,
//! shared by every scan through [`ModelHandle`], and released explicitly.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::thread::{self, JoinHandle};

use crate::module::define;
use crate::module::error::ScanError;

use super::preprocess::NormalizedTensor;

/// Raw per-class scores in model output order.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreVector(pub Vec<f32>);

impl ScoreVector {
    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
    pub fn len(&self) -> usize {
        self.0.len()
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<f32>> for ScoreVector {
    fn from(scores: Vec<f32>) -> Self {
        Self(scores)
    }
}

/// Input/output description of a loaded model.
///
#[derive(Debug, Clone, PartialEq)]
pub struct ModelInfo {
    pub input_names: Vec<String>,
    pub output_names: Vec<String>,
    pub input_shape: [usize; 4],
}

/// A model that maps a normalized tensor to raw class scores.
///
pub trait ScoreModel: Send + Sync {
    fn info(&self) -> &ModelInfo;
    fn forward(&self, tensor: &NormalizedTensor) -> Result<ScoreVector, ScanError>;
}

pub mod onnx {
    use std::sync::Arc;

    use ndarray::CowArray;
    use ort::{
        environment::Environment, value::Value, ExecutionProvider, GraphOptimizationLevel,
        LoggingLevel, Session, SessionBuilder,
    };

    use super::{ModelInfo, ScoreModel, ScoreVector};
    use crate::module::define;
    use crate::module::error::ScanError;
    use crate::module::vision::preprocess::NormalizedTensor;

    /// ONNX Runtime session holding the banknote classifier.
    ///
    pub struct OnnxModel {
        _environment: Arc<Environment>,
        session: Session,
        info: ModelInfo,
    }

    impl OnnxModel {
        /// Builds a CPU session from a model file.
        ///
        /// # Arguments
        ///
        /// * `model_path` - Path to the `.onnx` file.
        /// * `intra_threads` - Threads used inside one operator.
        /// * `optimization_level` - Graph optimization, 0 (off) to 3 (all).
        ///
        pub fn load(
            model_path: &str,
            intra_threads: i16,
            optimization_level: u8,
        ) -> Result<Self, ScanError> {
            let load_err = |e: ort::OrtError| ScanError::ModelLoad(format!("{model_path}: {e}"));
            let environment = Environment::builder()
                .with_name(define::system::NAME)
                .with_log_level(LoggingLevel::Warning)
                .with_execution_providers([ExecutionProvider::CPU(Default::default())])
                .build()
                .map_err(load_err)?
                .into_arc();
            let level = match optimization_level {
                0 => GraphOptimizationLevel::Disable,
                1 => GraphOptimizationLevel::Level1,
                2 => GraphOptimizationLevel::Level2,
                _ => GraphOptimizationLevel::Level3,
            };
            let session = SessionBuilder::new(&environment)
                .map_err(load_err)?
                .with_optimization_level(level)
                .map_err(load_err)?
                .with_intra_threads(intra_threads)
                .map_err(load_err)?
                .with_model_from_file(model_path)
                .map_err(load_err)?;

            let info = ModelInfo {
                input_names: session.inputs.iter().map(|i| i.name.clone()).collect(),
                output_names: session.outputs.iter().map(|o| o.name.clone()).collect(),
                input_shape: define::tensor::SHAPE,
            };
            if info.input_names.is_empty() || info.output_names.is_empty() {
                return Err(ScanError::ModelLoad(format!(
                    "{model_path}: model declares no inputs or outputs"
                )));
            }
            Ok(Self {
                _environment: environment,
                session,
                info,
            })
        }
    }

    impl ScoreModel for OnnxModel {
        fn info(&self) -> &ModelInfo {
            &self.info
        }

        /// Runs the forward pass. The tensor feeds the first declared input and
        /// the scores are read from the first declared output.
        fn forward(&self, tensor: &NormalizedTensor) -> Result<ScoreVector, ScanError> {
            let infer_err = |e: ort::OrtError| ScanError::Inference(e.to_string());
            let array = CowArray::from(tensor.to_input_array()?);
            let inputs =
                vec![Value::from_array(self.session.allocator(), &array).map_err(infer_err)?];
            let outs = self.session.run(inputs).map_err(infer_err)?;
            let first = outs
                .first()
                .ok_or_else(|| ScanError::Inference("model produced no output".to_string()))?;
            let logits = first.try_extract::<f32>().map_err(infer_err)?;
            let scores: Vec<f32> = logits.view().iter().copied().collect();
            Ok(ScoreVector(scores))
        }
    }
}

/// Readiness of the shared model, as reported to callers.
///
#[derive(Debug, Clone, PartialEq)]
pub enum ModelStatus {
    NotReady,
    Ready(ModelInfo),
    Failed(String),
}

enum Slot {
    Empty,
    // `released` marks a load whose result is dropped on arrival.
    Loading { generation: u64, released: bool },
    Ready(Arc<dyn ScoreModel>),
    Failed(String),
}

/// Lifecycle-managed handle to the single classification model.
///
/// Clones share the same slot, so one handle can be owned by the application
/// context and injected wherever predictions are made.
#[derive(Clone)]
pub struct ModelHandle {
    slot: Arc<RwLock<Slot>>,
    generation: Arc<AtomicU64>,
}

impl Default for ModelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelHandle {
    pub fn new() -> Self {
        Self {
            slot: Arc::new(RwLock::new(Slot::Empty)),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts loading in a background thread.
    ///
    /// Fails immediately if a model is already loaded or loading, including a
    /// load that was released but has not finished yet. After a failure or a
    /// [`release`](Self::release) the handle may be loaded again. A panicking
    /// loader leaves the handle in the failed state.
    pub fn load_async<F, M>(&self, loader: F) -> Result<JoinHandle<()>, ScanError>
    where
        F: FnOnce() -> Result<M, ScanError> + Send + 'static,
        M: ScoreModel + 'static,
    {
        let generation = {
            let mut slot = self.write_slot()?;
            match &*slot {
                Slot::Loading { .. } => {
                    return Err(ScanError::ModelLoad("model is already loading".to_string()))
                }
                Slot::Ready(_) => {
                    return Err(ScanError::ModelLoad("model is already loaded".to_string()))
                }
                Slot::Empty | Slot::Failed(_) => {}
            }
            let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *slot = Slot::Loading {
                generation,
                released: false,
            };
            generation
        };
        log::info!("Loading classification model...");
        let handle = self.clone();
        Ok(thread::spawn(move || {
            let outcome = panic::catch_unwind(AssertUnwindSafe(loader)).unwrap_or_else(|_| {
                Err(ScanError::ModelLoad("model loader panicked".to_string()))
            });
            handle.finish_load(generation, outcome);
        }))
    }

    /// Loads the ONNX model at `model_path` in the background.
    pub fn load_onnx_async(
        &self,
        model_path: &str,
        intra_threads: i16,
        optimization_level: u8,
    ) -> Result<JoinHandle<()>, ScanError> {
        let path = model_path.to_string();
        self.load_async(move || onnx::OnnxModel::load(&path, intra_threads, optimization_level))
    }

    fn finish_load<M: ScoreModel + 'static>(
        &self,
        generation: u64,
        outcome: Result<M, ScanError>,
    ) {
        let mut slot = match self.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let released = match &*slot {
            Slot::Loading {
                generation: current,
                released,
            } if *current == generation => *released,
            _ => {
                log::warn!("Stale model load {} finished, result dropped", generation);
                return;
            }
        };
        if released {
            log::info!("Model load finished after release, result dropped");
            *slot = Slot::Empty;
            return;
        }
        *slot = match outcome {
            Ok(model) => {
                log::info!(
                    "Model loaded, inputs: {:?}, outputs: {:?}",
                    model.info().input_names,
                    model.info().output_names
                );
                Slot::Ready(Arc::new(model))
            }
            Err(e) => {
                log::error!("Failed to load model: {}", e);
                Slot::Failed(e.to_string())
            }
        };
    }

    pub fn status(&self) -> ModelStatus {
        match self.slot.read() {
            Ok(slot) => match &*slot {
                Slot::Empty | Slot::Loading { .. } => ModelStatus::NotReady,
                Slot::Ready(model) => ModelStatus::Ready(model.info().clone()),
                Slot::Failed(msg) => ModelStatus::Failed(msg.clone()),
            },
            Err(_) => ModelStatus::Failed("model state lock poisoned".to_string()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.status(), ModelStatus::Ready(_))
    }

    /// `Ok` when a prediction could run now, otherwise the reason it cannot.
    pub fn ensure_ready(&self) -> Result<(), ScanError> {
        self.model().map(|_| ())
    }

    /// Runs one forward pass and checks the output width.
    pub fn predict(&self, tensor: &NormalizedTensor) -> Result<ScoreVector, ScanError> {
        let model = self.model()?;
        let scores = model.forward(tensor)?;
        if scores.len() != define::model::NUM_CLASSES {
            return Err(ScanError::Inference(format!(
                "model produced {} scores, expected {}",
                scores.len(),
                define::model::NUM_CLASSES
            )));
        }
        log::debug!("Raw logits: {:?}", scores.as_slice());
        Ok(scores)
    }

    /// Drops the loaded model. Scans still running keep their reference until they finish.
    ///
    /// A load still in progress is marked released: its result is dropped when
    /// it arrives and the handle goes back to empty.
    pub fn release(&self) {
        let mut slot = match self.slot.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Slot::Loading { released, .. } = &mut *slot {
            *released = true;
            return;
        }
        if let Slot::Ready(_) = std::mem::replace(&mut *slot, Slot::Empty) {
            log::info!("Classification model released");
        }
    }

    fn model(&self) -> Result<Arc<dyn ScoreModel>, ScanError> {
        let slot = self
            .slot
            .read()
            .map_err(|_| ScanError::ModelNotReady("model state lock poisoned".to_string()))?;
        match &*slot {
            Slot::Ready(model) => Ok(Arc::clone(model)),
            Slot::Empty => Err(ScanError::ModelNotReady(
                "model has not been loaded".to_string(),
            )),
            Slot::Loading { released: false, .. } => Err(ScanError::ModelNotReady(
                "model is still loading".to_string(),
            )),
            Slot::Loading { released: true, .. } => Err(ScanError::ModelNotReady(
                "model has been released".to_string(),
            )),
            Slot::Failed(msg) => Err(ScanError::ModelNotReady(format!(
                "model failed to load: {msg}"
            ))),
        }
    }

    fn write_slot(&self) -> Result<std::sync::RwLockWriteGuard<'_, Slot>, ScanError> {
        self.slot
            .write()
            .map_err(|_| ScanError::ModelLoad("model state lock poisoned".to_string()))
    }
}
