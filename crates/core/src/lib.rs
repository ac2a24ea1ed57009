pub mod distance;
pub mod receipt;

pub use distance::levenshtein;
pub use receipt::{Item, JsonReceiptWriter, Receipt, ReceiptWriter, WriteError};
