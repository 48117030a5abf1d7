// Extraction module - cell normalization plus the per-file extraction pass.

pub mod extractor;

mod extraction_service;

pub use extraction_service::{
    ExtractionError, ExtractionService, ExtractionSummary, SheetReader, DEFAULT_SHEET_COLUMN,
};
