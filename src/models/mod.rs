pub mod document;
pub mod enums;

pub use document::SourceDocument;
pub use enums::{Category, DocumentFormat, ParseEnumError};
