//! Object metadata enrichment.
//!
//! On an object-created notification the [`services::pipeline::Pipeline`] reads
//! the object's head metadata, extracts page count and text from PDFs, and
//! merge-upserts the result into a file record keyed by the object's basename.

pub mod config;
pub mod db;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
