//! Services Layer
//!
//! Business logic shared by every caller of the import pipeline. Callers
//! submit CSV content and poll status by id; the worker does the rest.
//!
//! # Services
//!
//! - `ImportService` - Submit import jobs, read job status

pub mod import_service;

pub use import_service::ImportService;
