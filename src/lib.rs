//! comfy-restore
//!
//! Prediction adapter that stages user inputs, hands an API-format workflow to a
//! local ComfyUI engine and collects the files it writes. Weights referenced by
//! a workflow are fetched on demand into the engine's model directories.

pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod predictor;
pub mod providers;
pub mod state;
pub mod weights;

pub use config::AdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use predictor::Predictor;
pub use state::{PredictRequest, RestorationFunction};
