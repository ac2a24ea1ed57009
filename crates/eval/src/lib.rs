//! Accuracy evaluation: scores produced receipts against hand-labeled ground
//! truth with edit distances and greedy item alignment.

pub mod evaluate;
pub mod report;

pub use evaluate::{align_items, evaluate, normalized_error, Evaluation, ItemAlignment};
pub use report::{analyze_receipt, BatchSummary, CollatedReport, EvalError, COLLATED_REPORT};
