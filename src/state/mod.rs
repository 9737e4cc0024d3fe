//! Request-level data model shared by the predictor and the CLI.

mod request;

pub use request::*;
