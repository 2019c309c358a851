//! Data models for API requests, responses and persistence.

/// Paste record and request/response shapes.
pub mod paste;


pub use paste::{CreatePasteRequest, CreatePasteResponse, Paste, PasteView};
