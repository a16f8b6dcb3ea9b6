//! Bill extraction: PDF text → one schema-constrained prompt → parsed records.

pub mod invoker;
pub mod parser;
pub mod pdf;
pub mod prompt;

pub use invoker::{BillExtractor, ExtractionRequest};
pub use parser::parse_bills;
pub use pdf::{ExtractedDocument, extract_text};
pub use prompt::{BillField, DefaultRule, FIELD_RULES, FieldRule, RESPONSE_SCHEMA, build_prompt};
