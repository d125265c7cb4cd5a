//! Database access

pub mod documents;

pub use documents::PgDocumentStore;
