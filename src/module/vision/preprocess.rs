//! Image Preprocessing
//!
//! Turns captured image bytes into the planar, ImageNet-normalized tensor
//! the classifier consumes, or into a small JPEG for the remote backend.

use std::fmt;
use std::io::Cursor;
use std::path::Path;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{imageops::FilterType, DynamicImage, ImageOutputFormat, Pixel, Rgb, RgbImage};
use ndarray::{Array, ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::module::define::{backend, tensor};
use crate::module::error::ScanError;

/// Encoded image bytes as delivered by the camera.
///
#[derive(Debug, Clone)]
pub struct RawImage {
    bytes: Vec<u8>,
    base64: Option<String>,
}

impl RawImage {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            base64: None,
        }
    }

    /// Reads an encoded image from disk.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ScanError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|source| ScanError::Capture {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Decodes base64 text, with or without a `data:image/...;base64,` prefix.
    ///
    /// # Example
    ///
    /// ```
    /// use rupiahscan::module::vision::preprocess::RawImage;
    /// let img = RawImage::from_base64("data:image/jpeg;base64,AQID").unwrap();
    /// assert_eq!(img.bytes(), &[1, 2, 3]);
    /// ```
    pub fn from_base64(input: &str) -> Result<Self, ScanError> {
        let payload = strip_data_url(input.trim());
        let bytes = STANDARD.decode(payload)?;
        Ok(Self {
            bytes,
            base64: Some(payload.to_string()),
        })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The base64 payload this image was decoded from, prefix removed.
    pub fn base64(&self) -> Option<&str> {
        self.base64.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Removes a `data:image/<subtype>;base64,` prefix when present.
///
pub fn strip_data_url(input: &str) -> &str {
    if let Some(rest) = input.strip_prefix("data:image/") {
        if let Some((subtype, payload)) = rest.split_once(";base64,") {
            if !subtype.is_empty() && subtype.bytes().all(|b| b.is_ascii_lowercase()) {
                return payload;
            }
        }
    }
    input
}

/// Planar (channel, height, width) model input of fixed length.
///
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor {
    data: Vec<f32>,
}

impl NormalizedTensor {
    /// Wraps already-normalized values laid out as `[1, 3, 224, 224]`.
    pub fn from_vec(data: Vec<f32>) -> Result<Self, ScanError> {
        if data.len() != tensor::LEN {
            return Err(ScanError::Inference(format!(
                "tensor must hold {} values, got {}",
                tensor::LEN,
                data.len()
            )));
        }
        Ok(Self { data })
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// One colour plane; `c` is 0 (red), 1 (green) or 2 (blue), anything else is `None`.
    pub fn channel(&self, c: usize) -> Option<&[f32]> {
        let plane = tensor::LEN / tensor::CHANNELS;
        let start = c.checked_mul(plane)?;
        self.data.get(start..start.checked_add(plane)?)
    }

    /// Copies the values into a dynamic array of shape `[1, 3, 224, 224]`.
    pub fn to_input_array(&self) -> Result<ArrayD<f32>, ScanError> {
        ArrayD::from_shape_vec(IxDyn(&tensor::SHAPE), self.data.clone())
            .map_err(|e| ScanError::Inference(e.to_string()))
    }

    pub fn info(&self) -> TensorInfo {
        TensorInfo {
            len: self.data.len(),
            shape: tensor::SHAPE,
            memory_mb: (self.data.len() * std::mem::size_of::<f32>()) as f64 / 1024.0 / 1024.0,
        }
    }
}

/// Size summary of a tensor, for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorInfo {
    pub len: usize,
    pub shape: [usize; 4],
    pub memory_mb: f64,
}

impl fmt::Display for TensorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} f32 {:?} {:.2} MB",
            self.len, self.shape, self.memory_mb
        )
    }
}

/// Interpolation used to bring captures down to the model's input size.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeFilter {
    #[default]
    Bilinear,
    Nearest,
    Triangle,
    CatmullRom,
    Lanczos3,
}

impl ResizeFilter {
    /// Filter delegated to `image::imageops`, `None` for the built-in bilinear sampler.
    fn filter_type(&self) -> Option<FilterType> {
        match self {
            Self::Bilinear => None,
            Self::Nearest => Some(FilterType::Nearest),
            Self::Triangle => Some(FilterType::Triangle),
            Self::CatmullRom => Some(FilterType::CatmullRom),
            Self::Lanczos3 => Some(FilterType::Lanczos3),
        }
    }
}

/// Corner-aligned bilinear resize.
///
/// Destination pixel `(x, y)` samples the source at `(x * sw / width, y * sh / height)`
/// and blends the four surrounding pixels, clamping at the right and bottom edges.
pub fn resize_bilinear(src: &RgbImage, width: u32, height: u32) -> RgbImage {
    let (sw, sh) = src.dimensions();
    if sw == 0 || sh == 0 {
        return RgbImage::new(width, height);
    }
    let rx = sw as f32 / width as f32;
    let ry = sh as f32 / height as f32;

    RgbImage::from_fn(width, height, |x, y| {
        let sx = x as f32 * rx;
        let sy = y as f32 * ry;
        let x1 = (sx.floor() as u32).min(sw - 1);
        let y1 = (sy.floor() as u32).min(sh - 1);
        let x2 = (x1 + 1).min(sw - 1);
        let y2 = (y1 + 1).min(sh - 1);
        let wx = sx - x1 as f32;
        let wy = sy - y1 as f32;

        let p1 = src.get_pixel(x1, y1).0;
        let p2 = src.get_pixel(x2, y1).0;
        let p3 = src.get_pixel(x1, y2).0;
        let p4 = src.get_pixel(x2, y2).0;

        let mut out = [0u8; 3];
        for c in 0..3 {
            let v = p1[c] as f32 * (1.0 - wx) * (1.0 - wy)
                + p2[c] as f32 * wx * (1.0 - wy)
                + p3[c] as f32 * (1.0 - wx) * wy
                + p4[c] as f32 * wx * wy;
            out[c] = v.round().clamp(0.0, 255.0) as u8;
        }
        Rgb(out)
    })
}

/// Decode, resize and normalize captured images.
///
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    pub filter: ResizeFilter,
}

impl ImagePreprocessor {
    pub fn new(filter: ResizeFilter) -> Self {
        Self { filter }
    }

    /// Decodes JPEG, PNG or any other format the `image` crate understands into RGB.
    pub fn decode(&self, raw: &RawImage) -> Result<RgbImage, ScanError> {
        if raw.is_empty() {
            return Err(ScanError::Decode("image is empty".to_string()));
        }
        let img = image::load_from_memory(raw.bytes())?;
        Ok(img.to_rgb8())
    }

    /// Resizes to the model's square input size.
    pub fn resize(&self, img: &RgbImage) -> RgbImage {
        let sz = tensor::INPUT_SIZE;
        if img.dimensions() == (sz, sz) {
            return img.clone();
        }
        match self.filter.filter_type() {
            None => resize_bilinear(img, sz, sz),
            Some(filter) => image::imageops::resize(img, sz, sz, filter),
        }
    }

    /// Converts a 224x224 RGB image to a planar tensor.
    ///
    /// Each value is `(pixel / 255 - mean[c]) / std[c]` with the ImageNet statistics.
    pub fn normalize(&self, img: &RgbImage) -> Result<NormalizedTensor, ScanError> {
        let sz = tensor::INPUT_SIZE;
        let (w, h) = img.dimensions();
        if (w, h) != (sz, sz) {
            return Err(ScanError::Decode(format!(
                "expected a {sz}x{sz} image, got {w}x{h}"
            )));
        }
        let sz = sz as usize;
        let array = Array::from_shape_fn((1, tensor::CHANNELS, sz, sz), |(_, c, y, x)| {
            let pixel = img.get_pixel(x as u32, y as u32);
            let channels = pixel.channels();
            (channels[c] as f32 / 255.0 - tensor::MEAN[c]) / tensor::STD[c]
        });
        NormalizedTensor::from_vec(array.into_raw_vec())
    }

    /// Full local-inference preprocessing: decode, resize, normalize.
    pub fn preprocess(&self, raw: &RawImage) -> Result<NormalizedTensor, ScanError> {
        let decoded = self.decode(raw)?;
        log::debug!(
            "Decoded capture {}x{} ({} bytes)",
            decoded.width(),
            decoded.height(),
            raw.len()
        );
        let tensor = self.normalize(&self.resize(&decoded))?;
        log::debug!("Tensor built: {}", tensor.info());
        Ok(tensor)
    }

    /// Remote-inference preprocessing: decode, resize, re-encode as JPEG.
    pub fn resize_to_jpeg(&self, raw: &RawImage) -> Result<Vec<u8>, ScanError> {
        let resized = self.resize(&self.decode(raw)?);
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(resized)
            .write_to(
                &mut buf,
                ImageOutputFormat::Jpeg(backend::UPLOAD_JPEG_QUALITY),
            )
            .map_err(|e| ScanError::Decode(format!("failed to encode upload: {e}")))?;
        Ok(buf.into_inner())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Encodes an RGB image as PNG bytes.
    pub(crate) fn encode_png(img: &RgbImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut buf, ImageOutputFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    fn gray(w: u32, h: u32, values: &[u8]) -> RgbImage {
        RgbImage::from_fn(w, h, |x, y| {
            let v = values[(y * w + x) as usize];
            Rgb([v, v, v])
        })
    }

    #[test]
    fn strips_data_url_prefix() {
        assert_eq!(strip_data_url("data:image/png;base64,AAAA"), "AAAA");
        assert_eq!(strip_data_url("data:image/jpeg;base64,QQ=="), "QQ==");
        assert_eq!(strip_data_url("AAAA"), "AAAA");
        // Uppercase subtypes are not a recognized prefix.
        assert_eq!(
            strip_data_url("data:image/PNG;base64,AAAA"),
            "data:image/PNG;base64,AAAA"
        );
    }

    #[test]
    fn base64_input_keeps_payload() {
        let img = RawImage::from_base64("data:image/png;base64,AQID").unwrap();
        assert_eq!(img.bytes(), &[1, 2, 3]);
        assert_eq!(img.base64(), Some("AQID"));
        assert!(matches!(
            RawImage::from_base64("not base64!"),
            Err(ScanError::Decode(_))
        ));
    }

    #[test]
    fn garbage_bytes_fail_to_decode() {
        let pre = ImagePreprocessor::default();
        let err = pre
            .preprocess(&RawImage::from_bytes(vec![0x00, 0x01, 0x02, 0x03]))
            .unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
        let err = pre.preprocess(&RawImage::from_bytes(vec![])).unwrap_err();
        assert!(matches!(err, ScanError::Decode(_)));
    }

    #[test]
    fn bilinear_upscale_fixture() {
        let src = gray(2, 2, &[0, 100, 200, 255]);
        let out = resize_bilinear(&src, 4, 4);
        assert_eq!(out.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(out.get_pixel(1, 0).0, [50, 50, 50]);
        // Clamped at the right edge.
        assert_eq!(out.get_pixel(3, 0).0, [100, 100, 100]);
        // 0.25 * (0 + 100 + 200 + 255) = 138.75
        assert_eq!(out.get_pixel(1, 1).0, [139, 139, 139]);
        assert_eq!(out.get_pixel(0, 2).0, [200, 200, 200]);
    }

    #[test]
    fn bilinear_downscale_samples_grid_corners() {
        let values: Vec<u8> = (0..16).map(|v| v * 10).collect();
        let src = gray(4, 4, &values);
        let out = resize_bilinear(&src, 2, 2);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(1, 0).0[0], 20);
        assert_eq!(out.get_pixel(0, 1).0[0], 80);
        assert_eq!(out.get_pixel(1, 1).0[0], 100);
    }

    #[test]
    fn bilinear_keeps_uniform_colour() {
        let src = RgbImage::from_pixel(640, 480, Rgb([12, 34, 56]));
        let out = resize_bilinear(&src, 224, 224);
        assert!(out.pixels().all(|p| p.0 == [12, 34, 56]));
    }

    #[test]
    fn tensor_is_planar_and_normalized() {
        let pre = ImagePreprocessor::default();
        let img = RgbImage::from_pixel(224, 224, Rgb([255, 0, 128]));
        let t = pre.normalize(&img).unwrap();
        assert_eq!(t.len(), 3 * 224 * 224);

        let red = (1.0 - 0.485) / 0.229;
        let green = (0.0 - 0.456) / 0.224;
        let blue = (128.0 / 255.0 - 0.406) / 0.225;
        assert!(t.channel(0).unwrap().iter().all(|v| (v - red).abs() < 1e-5));
        assert!(t.channel(1).unwrap().iter().all(|v| (v - green).abs() < 1e-5));
        assert!(t.channel(2).unwrap().iter().all(|v| (v - blue).abs() < 1e-5));
        assert!(t.channel(3).is_none());
    }

    #[test]
    fn tensor_follows_row_major_pixels() {
        let pre = ImagePreprocessor::default();
        let mut img = RgbImage::from_pixel(224, 224, Rgb([0, 0, 0]));
        img.put_pixel(5, 2, Rgb([255, 255, 255]));
        let t = pre.normalize(&img).unwrap();
        let idx = 2 * 224 + 5;
        let white_red = (1.0 - 0.485) / 0.229;
        assert!((t.channel(0).unwrap()[idx] - white_red).abs() < 1e-5);
        assert!((t.channel(0).unwrap()[idx + 1] - white_red).abs() > 1.0);
    }

    #[test]
    fn normalize_rejects_wrong_size() {
        let pre = ImagePreprocessor::default();
        let img = RgbImage::new(100, 224);
        assert!(matches!(pre.normalize(&img), Err(ScanError::Decode(_))));
    }

    #[test]
    fn preprocess_encoded_capture() {
        let img = RgbImage::from_fn(320, 240, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let raw = RawImage::from_bytes(encode_png(&img));
        for filter in [
            ResizeFilter::Bilinear,
            ResizeFilter::Nearest,
            ResizeFilter::Triangle,
        ] {
            let t = ImagePreprocessor::new(filter).preprocess(&raw).unwrap();
            assert_eq!(t.len(), 3 * 224 * 224);
            assert!(t
                .as_slice()
                .iter()
                .all(|v| v.is_finite() && (-2.2..=2.7).contains(v)));
        }
    }

    #[test]
    fn resize_to_jpeg_produces_model_sized_image() {
        let img = RgbImage::from_pixel(500, 300, Rgb([200, 100, 50]));
        let raw = RawImage::from_bytes(encode_png(&img));
        let jpeg = ImagePreprocessor::default().resize_to_jpeg(&raw).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let back = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((back.width(), back.height()), (224, 224));
    }

    #[test]
    fn tensor_info_summary() {
        let t = NormalizedTensor::from_vec(vec![0.0; 3 * 224 * 224]).unwrap();
        let info = t.info();
        assert_eq!(info.shape, [1, 3, 224, 224]);
        assert_eq!(info.to_string(), "150528 f32 [1, 3, 224, 224] 0.57 MB");
        assert!(NormalizedTensor::from_vec(vec![0.0; 10]).is_err());
        assert_eq!(t.to_input_array().unwrap().shape(), &[1, 3, 224, 224]);
    }

    #[test]
    fn reads_capture_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.png");
        let img = RgbImage::from_pixel(10, 10, Rgb([1, 2, 3]));
        std::fs::write(&path, encode_png(&img)).unwrap();
        let raw = RawImage::from_file(&path).unwrap();
        assert!(!raw.is_empty());
        assert!(raw.base64().is_none());
        assert!(matches!(
            RawImage::from_file(dir.path().join("missing.jpg")),
            Err(ScanError::Capture { .. })
        ));
    }
}
