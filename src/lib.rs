//! OCR for DjVu documents.
//!
//! Renders each page of a DjVu document, runs an external OCR engine over
//! it, and writes the recognized text back into the document's hidden text
//! layer via a djvused edit script. Pages are processed by a bounded pool
//! of worker threads while the script is assembled strictly in page order.

pub mod cli;
pub mod config;
pub mod djvu;
pub mod engine;
pub mod image;
pub mod ipc;
pub mod pages;
pub mod pipeline;
pub mod scheduler;
pub mod script;
pub mod zones;
