use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OcrError {
    #[error("OCR engine could not read the image: {0}")]
    ImageDecode(String),
    #[error("OCR engine failed: {0}")]
    Engine(String),
    #[error("No OCR engine available; build with the `tesseract` feature")]
    NotAvailable,
}

/// Axis-aligned box around one recognized word, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordBox {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

impl WordBox {
    pub fn new(left: u32, top: u32, width: u32, height: u32) -> Self {
        Self { left, top, width, height }
    }

    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// A text recognition engine fed PNG-encoded grayscale pages.
pub trait OcrBackend: Send + Sync {
    /// Plain recognized text.
    fn recognize(&self, image_png: &[u8]) -> Result<String, OcrError>;

    /// Word-level bounding boxes; the recognized text is discarded.
    fn word_boxes(&self, image_png: &[u8]) -> Result<Vec<WordBox>, OcrError>;
}

/// Returns pre-set text and boxes regardless of the image.
#[derive(Debug, Clone, Default)]
pub struct MockRecognizer {
    pub text: String,
    pub boxes: Vec<WordBox>,
}

impl MockRecognizer {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), boxes: Vec::new() }
    }

    pub fn with_boxes(mut self, boxes: Vec<WordBox>) -> Self {
        self.boxes = boxes;
        self
    }
}

impl OcrBackend for MockRecognizer {
    fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
        Ok(self.text.clone())
    }

    fn word_boxes(&self, _image_png: &[u8]) -> Result<Vec<WordBox>, OcrError> {
        Ok(self.boxes.clone())
    }
}

/// Stand-in used when the binary is built without an OCR engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableRecognizer;

impl OcrBackend for UnavailableRecognizer {
    fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
        Err(OcrError::NotAvailable)
    }

    fn word_boxes(&self, _image_png: &[u8]) -> Result<Vec<WordBox>, OcrError> {
        Err(OcrError::NotAvailable)
    }
}

// ── Tesseract ─────────────────────────────────────────────────────────────────

#[cfg(feature = "tesseract")]
pub mod tesseract_backend {
    use super::{OcrBackend, OcrError, WordBox};
    use leptess::{capi::TessPageIteratorLevel_RIL_WORD, LepTess};

    /// Runs libtesseract through leptess. A fresh engine is created per call,
    /// so one recognizer can serve several worker threads.
    pub struct TesseractRecognizer {
        tessdata: Option<String>,
        language: String,
    }

    impl TesseractRecognizer {
        pub fn new(tessdata: Option<String>, language: &str) -> Self {
            Self {
                tessdata,
                language: language.to_owned(),
            }
        }

        fn engine_for(&self, page_png: &[u8]) -> Result<LepTess, OcrError> {
            let mut engine = LepTess::new(self.tessdata.as_deref(), &self.language)
                .map_err(|e| OcrError::Engine(format!("init {}: {e}", self.language)))?;
            engine
                .set_image_from_mem(page_png)
                .map_err(|e| OcrError::ImageDecode(e.to_string()))?;
            Ok(engine)
        }
    }

    impl OcrBackend for TesseractRecognizer {
        fn recognize(&self, image_png: &[u8]) -> Result<String, OcrError> {
            self.engine_for(image_png)?
                .get_utf8_text()
                .map_err(|e| OcrError::Engine(e.to_string()))
        }

        fn word_boxes(&self, image_png: &[u8]) -> Result<Vec<WordBox>, OcrError> {
            let mut engine = self.engine_for(image_png)?;
            let Some(boxes) = engine.get_component_boxes(TessPageIteratorLevel_RIL_WORD, true) else {
                return Ok(Vec::new());
            };
            let clamp = |v: i32| v.max(0) as u32;
            Ok((&boxes)
                .into_iter()
                .map(|b| {
                    let g = b.get_geometry();
                    WordBox::new(clamp(g.x), clamp(g.y), clamp(g.w), clamp(g.h))
                })
                .collect())
        }
    }
}
