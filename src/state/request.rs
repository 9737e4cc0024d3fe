//! Prediction request data model.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Restoration pipeline selected when no workflow JSON is supplied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum RestorationFunction {
    #[default]
    HandRestoration,
    FaceRestoration,
    All,
}

impl RestorationFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandRestoration => "hand_restoration",
            Self::FaceRestoration => "face_restoration",
            Self::All => "all",
        }
    }
}

impl fmt::Display for RestorationFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RestorationFunction {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "hand_restoration" => Ok(Self::HandRestoration),
            "face_restoration" => Ok(Self::FaceRestoration),
            "all" => Ok(Self::All),
            other => Err(format!(
                "Unknown function {}; expected hand_restoration, face_restoration or all",
                other
            )),
        }
    }
}

/// One prediction request as handed over by the host framework.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictRequest {
    pub function_name: RestorationFunction,
    /// API-format workflow JSON. Empty selects a bundled workflow by `function_name`.
    pub workflow_json: String,
    /// Image, tar or zip file to stage into the input directory.
    pub input_file: Option<PathBuf>,
    /// Also return files from the engine's temp directory (preprocessor previews etc).
    pub return_temp_files: bool,
    /// Replace `seed`, `noise_seed` and `rand_seed` inputs with random values.
    pub randomise_seeds: bool,
}

impl Default for PredictRequest {
    fn default() -> Self {
        Self {
            function_name: RestorationFunction::default(),
            workflow_json: String::new(),
            input_file: None,
            return_temp_files: false,
            randomise_seeds: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults() {
        let request = PredictRequest::default();
        assert_eq!(request.function_name, RestorationFunction::HandRestoration);
        assert!(request.workflow_json.is_empty());
        assert!(request.input_file.is_none());
        assert!(!request.return_temp_files);
        assert!(request.randomise_seeds);
    }

    #[test]
    fn test_request_deserialization() {
        let request: PredictRequest = serde_json::from_str(
            r#"{ "function_name": "face_restoration", "randomise_seeds": false }"#,
        )
        .unwrap();
        assert_eq!(request.function_name, RestorationFunction::FaceRestoration);
        assert!(!request.randomise_seeds);
        assert!(!request.return_temp_files);
    }

    #[test]
    fn test_function_parse() {
        assert_eq!("all".parse::<RestorationFunction>(), Ok(RestorationFunction::All));
        assert_eq!(RestorationFunction::FaceRestoration.to_string(), "face_restoration");
        assert!("colorize".parse::<RestorationFunction>().is_err());
    }
}
