// File and database I/O around the reconciliation engine

pub mod documents;
pub mod error;
pub mod export;
pub mod mappings;
pub mod store;
pub mod xml;

pub use documents::{list_documents, load_document, DocumentSource};
pub use error::IoError;
pub use mappings::load_mapping_sheet;
pub use store::SqliteStore;
