//! Docsort classifies documents (PDF, DOCX, images, plain text) into a
//! fixed category set and files each one under a category directory with
//! its confidence in the filename.

pub mod config;
pub mod models;
pub mod pipeline;

#[cfg(test)]
mod test_support;
