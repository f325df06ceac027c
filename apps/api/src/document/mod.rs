pub mod sections;
pub mod source;

pub use sections::Sections;
pub use source::{DocumentSource, FileDocumentSource, ParseError, ParsedDocument};
