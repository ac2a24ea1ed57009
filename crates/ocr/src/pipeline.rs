use image::GrayImage;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tally_core::{JsonReceiptWriter, Receipt, ReceiptWriter, WriteError};
use thiserror::Error;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;

use crate::config::PipelineConfig;
use crate::extract::{PatternError, ReceiptExtractor, ReceiptParser};
use crate::preprocess::{self, Conditioner, PreprocessError};
use crate::recognizer::{OcrBackend, OcrError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("Could not load input image at {}: {source}", path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: PreprocessError,
    },
    #[error("Image conditioning failed: {0}")]
    Condition(#[from] PreprocessError),
    #[error("Text recognition failed: {0}")]
    Ocr(#[from] OcrError),
    #[error("Failed to serialize receipt: {0}")]
    Serialize(#[from] WriteError),
    #[error("Receipt processing timed out after {0:?}")]
    Timeout(Duration),
    #[error("Receipt worker failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("Output {} is already produced from {}", output.display(), first.display())]
    DuplicateOutput { output: PathBuf, first: PathBuf },
}

/// Everything produced for one receipt image.
#[derive(Debug)]
pub struct OcrResult {
    pub ocr_text: String,
    pub receipt: Receipt,
    /// Where the conditioned image was saved for inspection.
    pub conditioned_path: PathBuf,
    pub output_path: PathBuf,
}

/// Outcome of one file in a batch run.
#[derive(Debug)]
pub struct BatchEntry {
    pub input: PathBuf,
    pub output: PathBuf,
    pub result: Result<OcrResult, PipelineError>,
}

impl BatchEntry {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }
}

/// Orchestrates: load → condition → OCR → extract → write.
pub struct ReceiptPipeline<R: OcrBackend + 'static> {
    recognizer: Arc<R>,
    conditioner: Arc<Conditioner>,
    extractor: Arc<dyn ReceiptExtractor>,
    writer: Arc<dyn ReceiptWriter>,
    timeout: Duration,
}

impl<R: OcrBackend + 'static> Clone for ReceiptPipeline<R> {
    fn clone(&self) -> Self {
        Self {
            recognizer: Arc::clone(&self.recognizer),
            conditioner: Arc::clone(&self.conditioner),
            extractor: Arc::clone(&self.extractor),
            writer: Arc::clone(&self.writer),
            timeout: self.timeout,
        }
    }
}

impl<R: OcrBackend + 'static> ReceiptPipeline<R> {
    /// Standard stage sequence, configured patterns and JSON output.
    pub fn new(recognizer: R, config: &PipelineConfig) -> Result<Self, PatternError> {
        let recognizer = Arc::new(recognizer);
        let ocr: Arc<dyn OcrBackend> = recognizer.clone();
        Ok(Self {
            recognizer,
            conditioner: Arc::new(Conditioner::standard(config, ocr)),
            extractor: Arc::new(ReceiptParser::from_config(config)?),
            writer: Arc::new(JsonReceiptWriter),
            timeout: config.ocr.timeout(),
        })
    }

    pub fn from_parts(
        recognizer: Arc<R>,
        conditioner: Conditioner,
        extractor: Arc<dyn ReceiptExtractor>,
        writer: Arc<dyn ReceiptWriter>,
        timeout: Duration,
    ) -> Self {
        Self {
            recognizer,
            conditioner: Arc::new(conditioner),
            extractor,
            writer,
            timeout,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Process one image, writing the conditioned image next to `output`
    /// (extension replaced with `.png`) and the structured document to `output`.
    pub async fn process_file(&self, input: &Path, output: &Path) -> Result<OcrResult, PipelineError> {
        self.process_holding(input, output, None).await
    }

    /// `permit` is released only when the blocking work finishes, so a
    /// receipt that timed out still occupies its batch slot until then.
    async fn process_holding(
        &self,
        input: &Path,
        output: &Path,
        permit: Option<OwnedSemaphorePermit>,
    ) -> Result<OcrResult, PipelineError> {
        tracing::info!("Processing receipt: {}", input.display());

        let recognizer = Arc::clone(&self.recognizer);
        let conditioner = Arc::clone(&self.conditioner);
        let extractor = Arc::clone(&self.extractor);
        let path = input.to_path_buf();

        // Conditioning and OCR are CPU-bound and blocking.
        let work = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            recognize_file(&path, &conditioner, recognizer.as_ref(), extractor.as_ref())
        });
        let (png, ocr_text, receipt) = tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| PipelineError::Timeout(self.timeout))???;

        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let conditioned_path = output.with_extension("png");
        tokio::fs::write(&conditioned_path, png).await?;

        let mut document = Vec::new();
        self.writer.write(&receipt, &mut document)?;
        tokio::fs::write(output, document).await?;

        tracing::info!(
            items = receipt.items.len(),
            "Receipt written: {}",
            output.display()
        );

        Ok(OcrResult {
            ocr_text,
            receipt,
            conditioned_path,
            output_path: output.to_path_buf(),
        })
    }

    /// Process every regular file in `input_dir` with at most `workers`
    /// receipts in flight. Failures are recorded per entry and never abort
    /// the batch. Entries come back sorted by input path.
    ///
    /// Inputs sharing a base name would write the same documents; only the
    /// first in path order is processed, the rest fail with `DuplicateOutput`.
    pub async fn run_batch(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        workers: usize,
    ) -> Result<Vec<BatchEntry>, PipelineError> {
        tokio::fs::create_dir_all(output_dir).await?;
        let inputs = list_input_files(input_dir).await?;
        tracing::info!("Batch of {} receipts from {}", inputs.len(), input_dir.display());

        let permits = Arc::new(Semaphore::new(workers.max(1)));
        let mut tasks = JoinSet::new();
        let mut owners: HashMap<PathBuf, PathBuf> = HashMap::new();
        let mut entries = Vec::new();
        for input in inputs {
            let output = output_path_for(&input, output_dir);
            if let Some(first) = owners.get(&output) {
                tracing::warn!("Skipping {}: {} comes from {}", input.display(), output.display(), first.display());
                let result = Err(PipelineError::DuplicateOutput { output: output.clone(), first: first.clone() });
                entries.push(BatchEntry { input, output, result });
                continue;
            }
            owners.insert(output.clone(), input.clone());

            let pipeline = self.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let permit = permits.acquire_owned().await.ok();
                let result = pipeline.process_holding(&input, &output, permit).await;
                if let Err(e) = &result {
                    tracing::warn!("Receipt pipeline error for {}: {e}", input.display());
                }
                BatchEntry { input, output, result }
            });
        }

        while let Some(joined) = tasks.join_next().await {
            entries.push(joined?);
        }
        entries.sort_by(|a, b| a.input.cmp(&b.input));
        Ok(entries)
    }
}

fn recognize_file(
    path: &Path,
    conditioner: &Conditioner,
    recognizer: &dyn OcrBackend,
    extractor: &dyn ReceiptExtractor,
) -> Result<(Vec<u8>, String, Receipt), PipelineError> {
    let image: GrayImage = preprocess::load_grayscale(path).map_err(|source| PipelineError::Load {
        path: path.to_path_buf(),
        source,
    })?;
    let conditioned = conditioner.run(image)?;
    let png = preprocess::encode_png(&conditioned)?;
    let ocr_text = recognizer.recognize(&png)?;
    let receipt = extractor.extract(&ocr_text);
    Ok((png, ocr_text, receipt))
}

/// File name up to its first `.`, the key shared by outputs, labels and reports.
pub fn base_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    match name.split('.').next() {
        Some(base) if !base.is_empty() => base.to_string(),
        _ => name,
    }
}

/// `<output_dir>/<base name>.json`
pub fn output_path_for(input: &Path, output_dir: &Path) -> PathBuf {
    output_dir.join(format!("{}.json", base_name(input)))
}

async fn list_input_files(dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_file() {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

// ── Intake folder ─────────────────────────────────────────────────────────────

/// Spawn a notify watcher on `watch_dir` that sends newly created files to `tx`.
/// The returned watcher must be kept alive for events to keep flowing.
pub fn spawn_intake_watcher(
    watch_dir: &Path,
    tx: mpsc::Sender<PathBuf>,
) -> notify::Result<impl notify::Watcher> {
    use notify::{EventKind, RecursiveMode, Watcher};

    let mut watcher = notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
        match event {
            Ok(ev) if matches!(ev.kind, EventKind::Create(_)) => {
                for path in ev.paths.into_iter().filter(|p| p.is_file()) {
                    if tx.try_send(path).is_err() {
                        tracing::warn!("Intake queue full or closed, dropping event");
                    }
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Intake watcher error: {e}"),
        }
    })?;

    watcher.watch(watch_dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{MockRecognizer, WordBox};
    use image::{ImageBuffer, Luma};
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const RECEIPT_TEXT: &str = "Corner Shop\n05/11/2021\nMilk 2.50\nBread 1.99\nTotal 4.49";

    fn write_png(path: &Path) {
        let img: GrayImage = ImageBuffer::from_fn(60, 40, |x, y| {
            Luma([if (10..50).contains(&x) && (15..20).contains(&y) { 0 } else { 220 }])
        });
        img.save(path).unwrap();
    }

    fn pipeline() -> ReceiptPipeline<MockRecognizer> {
        let ocr = MockRecognizer::new(RECEIPT_TEXT).with_boxes(vec![WordBox::new(5, 10, 50, 15)]);
        ReceiptPipeline::new(ocr, &PipelineConfig::default()).unwrap()
    }

    /// Sleeps in `recognize`, recording how many calls overlap.
    #[derive(Default)]
    struct SlowRecognizer {
        running: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl OcrBackend for SlowRecognizer {
        fn recognize(&self, _image_png: &[u8]) -> Result<String, OcrError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(150));
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(String::new())
        }

        fn word_boxes(&self, _image_png: &[u8]) -> Result<Vec<WordBox>, OcrError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn process_file_writes_document_and_conditioned_image() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("r1.jpg.png");
        write_png(&input);
        let output = dir.path().join("out/r1.json");

        let result = pipeline().process_file(&input, &output).await.unwrap();

        assert_eq!(result.conditioned_path, dir.path().join("out/r1.png"));
        assert!(result.conditioned_path.exists());
        assert_eq!(result.receipt.total_whole_part, "4");
        assert_eq!(result.receipt.total_fractional_part, "49");
        assert_eq!(result.receipt.items.len(), 2);

        let written: Receipt = serde_json::from_slice(&std::fs::read(&output).unwrap()).unwrap();
        assert_eq!(written, result.receipt);
    }

    #[tokio::test]
    async fn unreadable_image_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("missing.png");
        let err = pipeline()
            .process_file(&input, &dir.path().join("missing.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Load { .. }));
        assert!(err.to_string().contains("missing.png"));
    }

    #[tokio::test]
    async fn slow_ocr_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("slow.png");
        write_png(&input);
        let slow = ReceiptPipeline::new(SlowRecognizer::default(), &PipelineConfig::default())
            .unwrap()
            .with_timeout(Duration::from_millis(20));
        let err = slow
            .process_file(&input, &dir.path().join("slow.json"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(_)));
    }

    #[tokio::test]
    async fn batch_isolates_failures() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = dir.path().join("in");
        let outputs = dir.path().join("out");
        std::fs::create_dir_all(inputs.join("subdir")).unwrap();
        write_png(&inputs.join("a.png"));
        write_png(&inputs.join("c.png"));
        std::fs::write(inputs.join("b.png"), b"not an image").unwrap();

        let entries = pipeline().run_batch(&inputs, &outputs, 2).await.unwrap();

        let names: Vec<_> = entries.iter().map(|e| base_name(&e.input)).collect();
        assert_eq!(names, ["a", "b", "c"]);
        assert!(entries[0].succeeded());
        assert!(!entries[1].succeeded());
        assert!(entries[2].succeeded());
        assert!(outputs.join("a.json").exists());
        assert!(!outputs.join("b.json").exists());
        assert!(outputs.join("c.json").exists());
    }

    #[tokio::test]
    async fn batch_gives_each_document_one_producer() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = dir.path().join("in");
        let outputs = dir.path().join("out");
        std::fs::create_dir_all(&inputs).unwrap();
        write_png(&inputs.join("a.png"));
        std::fs::copy(inputs.join("a.png"), inputs.join("a.scan.png")).unwrap();

        let entries = pipeline().run_batch(&inputs, &outputs, 2).await.unwrap();

        assert_eq!(entries.len(), 2);
        assert!(entries[0].succeeded());
        assert_eq!(entries[0].input, inputs.join("a.png"));
        match &entries[1].result {
            Err(PipelineError::DuplicateOutput { output, first }) => {
                assert_eq!(output, &outputs.join("a.json"));
                assert_eq!(first, &inputs.join("a.png"));
            }
            other => panic!("expected a duplicate output error, got {other:?}"),
        }

        let written: Vec<_> = entries.iter().filter(|e| e.succeeded()).map(|e| &e.output).collect();
        let distinct: HashSet<_> = written.iter().collect();
        assert_eq!(distinct.len(), written.len());
    }

    #[tokio::test]
    async fn timed_out_receipts_keep_their_worker_slot() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = dir.path().join("in");
        std::fs::create_dir_all(&inputs).unwrap();
        for name in ["r1.png", "r2.png", "r3.png"] {
            write_png(&inputs.join(name));
        }
        let ocr = SlowRecognizer::default();
        let peak = Arc::clone(&ocr.peak);
        let slow = ReceiptPipeline::new(ocr, &PipelineConfig::default())
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let entries = slow.run_batch(&inputs, &dir.path().join("out"), 1).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert!(entries
            .iter()
            .all(|e| matches!(e.result, Err(PipelineError::Timeout(_)))));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn injected_parts_replace_the_standard_chain() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("plain.png");
        write_png(&input);
        let pipeline = ReceiptPipeline::from_parts(
            Arc::new(MockRecognizer::new("tea 3.10")),
            Conditioner::new(Vec::new()),
            Arc::new(ReceiptParser::default()),
            Arc::new(JsonReceiptWriter),
            Duration::from_secs(5),
        );

        let result = pipeline
            .process_file(&input, &dir.path().join("plain.json"))
            .await
            .unwrap();

        let original = preprocess::load_grayscale(&input).unwrap();
        let conditioned = preprocess::load_grayscale(&result.conditioned_path).unwrap();
        assert_eq!(conditioned, original);
        assert_eq!(result.receipt.items, vec![tally_core::Item::new("tea", "3", "10")]);
    }

    #[test]
    fn output_names_use_text_before_first_dot() {
        let out = Path::new("/out");
        assert_eq!(output_path_for(Path::new("/in/r7.jpg"), out), PathBuf::from("/out/r7.json"));
        assert_eq!(output_path_for(Path::new("/in/r7.scan.png"), out), PathBuf::from("/out/r7.json"));
        assert_eq!(base_name(Path::new("/in/.hidden")), ".hidden");
    }
}
