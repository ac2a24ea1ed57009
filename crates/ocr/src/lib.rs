pub mod config;
pub mod extract;
pub mod pipeline;
pub mod preprocess;
pub mod recognizer;
pub mod types;

pub use config::{ConfigError, PipelineConfig};
pub use extract::{ItemScanStart, PatternError, ReceiptExtractor, ReceiptParser};
pub use pipeline::{
    base_name, output_path_for, spawn_intake_watcher, BatchEntry, OcrResult, PipelineError,
    ReceiptPipeline,
};
pub use preprocess::{Conditioner, ImageStage, PreprocessError};
pub use recognizer::{MockRecognizer, OcrBackend, OcrError, UnavailableRecognizer, WordBox};
pub use types::{DateParts, PriceMatch};

#[cfg(feature = "tesseract")]
pub use recognizer::tesseract_backend::TesseractRecognizer;
