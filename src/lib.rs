//! Rupiah banknote recognition for visually impaired users.
//!
//! A captured photo is classified into one of seven rupiah denominations, either
//! on device with an ONNX model or by a remote prediction backend.

pub mod module;
