//! Static table of downloadable weights.
//!
//! The table lives in `weights.json` next to this file and is compiled into the
//! binary. Each category maps to a directory under the ComfyUI root and a path
//! prefix on the weight store.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{AdapterError, AdapterResult};

const EMBEDDED_MANIFEST: &str = include_str!("weights.json");

#[derive(Debug, Deserialize)]
struct ManifestFile {
    categories: BTreeMap<String, CategoryFile>,
    #[serde(default)]
    non_commercial: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryFile {
    dest: String,
    url_path: String,
    weights: Vec<String>,
}

/// Download source and destination of one weight.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightEntry {
    pub name: String,
    pub category: String,
    pub url: String,
    /// Destination directory relative to the ComfyUI root.
    pub dest: PathBuf,
}

#[derive(Debug, Clone)]
pub struct WeightsManifest {
    weights_map: BTreeMap<String, WeightEntry>,
    non_commercial: BTreeSet<String>,
}

impl WeightsManifest {
    /// Manifest compiled into the binary, with URLs rooted at `base_url`.
    pub fn new(base_url: &str) -> AdapterResult<Self> {
        Self::from_json(EMBEDDED_MANIFEST, base_url)
    }

    pub fn from_json(json: &str, base_url: &str) -> AdapterResult<Self> {
        let file: ManifestFile = serde_json::from_str(json).map_err(|err| AdapterError::Config {
            message: format!("invalid weights manifest: {}", err),
        })?;
        let base_url = base_url.trim_end_matches('/');

        let mut weights_map = BTreeMap::new();
        for (category, section) in file.categories {
            let url_path = section.url_path.trim_matches('/');
            for name in section.weights {
                let entry = WeightEntry {
                    url: format!("{}/{}/{}.tar", base_url, url_path, name),
                    dest: PathBuf::from(&section.dest),
                    category: category.clone(),
                    name: name.clone(),
                };
                if weights_map.insert(name.clone(), entry).is_some() {
                    return Err(AdapterError::Config {
                        message: format!("weight {} listed twice in manifest", name),
                    });
                }
            }
        }

        Ok(Self {
            weights_map,
            non_commercial: file.non_commercial.into_iter().collect(),
        })
    }

    pub fn get(&self, name: &str) -> Option<&WeightEntry> {
        self.weights_map.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.weights_map.contains_key(name)
    }

    pub fn is_non_commercial_only(&self, name: &str) -> bool {
        self.non_commercial.contains(name)
    }

    /// All entries sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = &WeightEntry> {
        self.weights_map.values()
    }

    pub fn weights_by_category(&self, category: &str) -> Vec<&WeightEntry> {
        self.weights_map
            .values()
            .filter(|entry| entry.category.eq_ignore_ascii_case(category))
            .collect()
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.weights_map
            .values()
            .map(|entry| entry.category.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.weights_map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights_map.is_empty()
    }
}
