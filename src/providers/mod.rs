//! Engine backends.

pub mod comfyui;

pub use comfyui::{interpret_message, ComfyUiClient, EngineEvent};
