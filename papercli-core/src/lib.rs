#![doc = "papercli-core: upload workflow logic for papercli."]

//! This crate contains the transport-agnostic part of papercli: the data model shared
//! with the document service, the [`contract::UploadClient`] capability trait, the
//! duplicate-task classifier and the upload workflow itself.
//!
//! # Usage
//! The CLI crate supplies a real HTTP client implementing [`contract::UploadClient`]
//! and calls [`upload::run`]. Tests use the exported `MockUploadClient`.

pub mod contract;
pub mod duplicate;
pub mod upload;
