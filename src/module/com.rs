//! Remote Inference Client
//!
//! Uploads a resized capture to the prediction backend and parses its answer.
//! At most one request is in flight per client; a scan attempt made while a
//! request is outstanding is refused before anything is sent.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::module::define::backend;
use crate::module::error::ScanError;

/// Single-flight request state.
///
/// `Idle -> InFlight -> Succeeded | Failed`, and a finished cycle accepts the
/// next request like `Idle` does.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestState {
    Idle,
    InFlight,
    Succeeded,
    Failed(String),
}

/// Backend answer, with missing or null fields defaulted.
///
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BackendPrediction {
    pub success: bool,
    pub label: String,
    pub value: f64,
    pub confidence: f64,
}

// Fields are loosely typed on the wire: numbers may arrive as strings and
// `success` as 0/1.
#[derive(Deserialize)]
struct WirePrediction {
    #[serde(default)]
    success: Value,
    #[serde(default)]
    label: Value,
    #[serde(default)]
    value: Value,
    #[serde(default)]
    confidence: Value,
}

impl From<WirePrediction> for BackendPrediction {
    fn from(wire: WirePrediction) -> Self {
        Self {
            success: truthy(&wire.success),
            label: text(&wire.label),
            value: number(&wire.value),
            confidence: number(&wire.confidence),
        }
    }
}

fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(false, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// Unparsable or non-finite values fall back to 0.
fn number(v: &Value) -> f64 {
    let n = match v {
        Value::Bool(true) => 1.0,
        Value::Number(n) => n.as_f64().unwrap_or_default(),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse::<f64>().unwrap_or_default(),
        _ => 0.0,
    };
    if n.is_finite() {
        n
    } else {
        0.0
    }
}

/// MIME type sent for an upload, from its file extension.
pub fn mime_for(file_name: &str) -> &'static str {
    let ext = file_name.rsplit('.').next().unwrap_or_default();
    if ext.eq_ignore_ascii_case("png") {
        "image/png"
    } else {
        "image/jpeg"
    }
}

/// Maps an HTTP status and body to a prediction or an error.
///
/// # Example
///
/// ```
/// use rupiahscan::module::com::interpret_response;
/// let p = interpret_response(200, r#"{"success": true, "label": "Seribu Rupiah", "value": 1000}"#).unwrap();
/// assert_eq!(p.confidence, 0.0);
/// assert!(interpret_response(500, "internal error").is_err());
/// ```
pub fn interpret_response(status: u16, body: &str) -> Result<BackendPrediction, ScanError> {
    if !(200..300).contains(&status) {
        return Err(ScanError::Server {
            status,
            body: body.to_string(),
        });
    }
    let wire: WirePrediction = serde_json::from_str(body).map_err(|e| ScanError::Server {
        status,
        body: format!("malformed response ({e}): {body}"),
    })?;
    Ok(wire.into())
}

/// HTTP client for the prediction backend.
///
pub struct BackendClient {
    client: Client,
    url: String,
    state: Mutex<RequestState>,
}

impl BackendClient {
    /// Creates a client for `<endpoint>/predict`.
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Base URL of the backend, e.g. `http://192.168.1.3:8000`.
    /// * `timeout` - Upper bound for one whole request.
    ///
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, ScanError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ScanError::Config(format!("http client: {e}")))?;
        Ok(Self {
            client,
            url: format!(
                "{}/{}",
                endpoint.trim_end_matches('/'),
                backend::PREDICT_PATH
            ),
            state: Mutex::new(RequestState::Idle),
        })
    }

    /// Full prediction URL, exposed for diagnostics.
    pub fn endpoint(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> RequestState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_loading(&self) -> bool {
        self.state() == RequestState::InFlight
    }

    /// Message of the last failed request, cleared when the next one starts.
    pub fn last_error(&self) -> Option<String> {
        match self.state() {
            RequestState::Failed(msg) => Some(msg),
            _ => None,
        }
    }

    /// Uploads an image file already resized by the caller.
    pub fn predict_file<P: AsRef<Path>>(&self, path: P) -> Result<BackendPrediction, ScanError> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("photo.jpg")
            .to_string();
        let flight = self.begin()?;
        let result = std::fs::read(path)
            .map_err(|source| ScanError::Capture {
                path: path.display().to_string(),
                source,
            })
            .and_then(|bytes| self.post(&file_name, bytes));
        self.complete(flight, result)
    }

    /// Uploads in-memory image bytes under `file_name`.
    pub fn predict_bytes(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<BackendPrediction, ScanError> {
        let flight = self.begin()?;
        let result = self.post(file_name, bytes);
        self.complete(flight, result)
    }

    fn complete(
        &self,
        flight: Flight<'_>,
        result: Result<BackendPrediction, ScanError>,
    ) -> Result<BackendPrediction, ScanError> {
        match &result {
            Ok(p) => log::info!(
                "Backend answered: {} ({}), confidence {}",
                p.label,
                p.value,
                p.confidence
            ),
            Err(e) => log::warn!("Backend request failed ({:?}): {}", e.kind(), e),
        }
        flight.finish(&result);
        result
    }

    fn post(&self, file_name: &str, bytes: Vec<u8>) -> Result<BackendPrediction, ScanError> {
        let part = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| ScanError::Config(format!("mime type: {e}")))?;
        // Content-Type with its boundary is left to reqwest.
        let form = Form::new().part(backend::FILE_FIELD, part);

        log::debug!("POST {} ({})", self.url, file_name);
        let res = self.client.post(&self.url).multipart(form).send()?;
        let status = res.status().as_u16();
        let body = res.text()?;
        log::debug!("Backend status {}", status);
        interpret_response(status, &body)
    }

    fn begin(&self) -> Result<Flight<'_>, ScanError> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| ScanError::Config("request state lock poisoned".to_string()))?;
        if *state == RequestState::InFlight {
            log::warn!("Scan rejected, a request is already in flight");
            return Err(ScanError::Busy);
        }
        *state = RequestState::InFlight;
        Ok(Flight {
            state: &self.state,
            done: false,
        })
    }
}

/// Marks the client in flight until finished or dropped.
struct Flight<'a> {
    state: &'a Mutex<RequestState>,
    done: bool,
}

impl Flight<'_> {
    fn finish(mut self, result: &Result<BackendPrediction, ScanError>) {
        let next = match result {
            Ok(_) => RequestState::Succeeded,
            Err(e) => RequestState::Failed(e.to_string()),
        };
        self.set(next);
        self.done = true;
    }

    fn set(&self, next: RequestState) {
        match self.state.lock() {
            Ok(mut state) => *state = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.set(RequestState::Failed("request aborted".to_string()));
        }
    }
}
