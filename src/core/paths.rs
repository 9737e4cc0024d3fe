use std::path::{Path, PathBuf};

fn resource_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(parent) = exe.parent() {
            roots.push(parent.to_path_buf());
        }
    }
    let manifest_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    if manifest_root.exists() {
        roots.push(manifest_root);
    }
    roots
}

/// Resolve a relative resource path against the working directory, the
/// executable directory and the crate directory, in that order. Falls back to
/// the first root when nothing exists yet.
pub fn resolve_resource_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    let roots = resource_roots();
    for root in &roots {
        let candidate = root.join(path);
        if candidate.exists() {
            return candidate;
        }
    }
    roots
        .first()
        .map(|root| root.join(path))
        .unwrap_or_else(|| path.to_path_buf())
}

/// Lower-cased extension without the dot. `archive.tar.gz` yields `tar.gz`.
pub fn normalized_extension(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?.to_ascii_lowercase();
    if name.ends_with(".tar.gz") {
        return Some("tar.gz".to_string());
    }
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

pub fn has_extension(value: &str, extensions: &[&str]) -> bool {
    normalized_extension(Path::new(value))
        .map(|ext| extensions.contains(&ext.as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_absolute_is_untouched() {
        let path = Path::new("/opt/workflows");
        assert_eq!(resolve_resource_path(path), PathBuf::from("/opt/workflows"));
    }

    #[test]
    fn test_resolve_finds_bundled_workflows() {
        let resolved = resolve_resource_path(Path::new("workflows"));
        assert!(resolved.join("photomaker.json").exists());
    }

    #[test]
    fn test_normalized_extension() {
        assert_eq!(normalized_extension(Path::new("a/b.PNG")).as_deref(), Some("png"));
        assert_eq!(normalized_extension(Path::new("bundle.tar.gz")).as_deref(), Some("tar.gz"));
        assert_eq!(normalized_extension(Path::new("bundle.tgz")).as_deref(), Some("tgz"));
        assert_eq!(normalized_extension(Path::new("README")), None);
    }

    #[test]
    fn test_has_extension() {
        assert!(has_extension("sd_xl_base_1.0.safetensors", &["safetensors"]));
        assert!(!has_extension("a photo of a cat", &["safetensors"]));
    }
}
