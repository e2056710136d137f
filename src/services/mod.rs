//! Collaborators of the pipeline and the pipeline itself.
//!
//! Each collaborator is a trait with one concrete adapter:
//! - [`object_storage::ObjectStorage`]: head/get against the object catalogue and payload directory
//! - [`pdf_parser::PdfParser`]: page count and text from PDF bytes
//! - [`record_store::RecordStore`]: merge-upsert of file records in SQLite
//!
//! [`upload::Uploader`] registers uploaded files ahead of enrichment.

pub mod object_storage;
pub mod pdf_parser;
pub mod pipeline;
pub mod record_store;
pub mod upload;
