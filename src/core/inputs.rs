//! Input staging and output collection on the local filesystem.

use std::fs;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::constants::{IMAGE_EXTENSIONS, LOG_SEPARATOR, STAGED_IMAGE_STEM};
use crate::core::paths::normalized_extension;
use crate::error::{AdapterError, AdapterResult};

const MACOS_METADATA_DIR: &str = "__MACOSX";

/// What `handle_input_file` put into the input directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StagedInput {
    /// A single image copied as `input<ext>`.
    Image { file_name: String },
    /// An archive unpacked into the input directory.
    Archive { files: Vec<PathBuf> },
}

impl StagedInput {
    /// File name to bind into a workflow's image loader, if there is exactly one.
    pub fn image_file_name(&self) -> Option<&str> {
        match self {
            Self::Image { file_name } => Some(file_name),
            Self::Archive { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputKind {
    Tar,
    TarGz,
    Zip,
    Image,
}

fn classify(extension: &str) -> Option<InputKind> {
    match extension {
        "tar" => Some(InputKind::Tar),
        "tar.gz" | "tgz" => Some(InputKind::TarGz),
        "zip" => Some(InputKind::Zip),
        ext if IMAGE_EXTENSIONS.contains(&ext) => Some(InputKind::Image),
        _ => None,
    }
}

/// Remove each directory if present and recreate it empty.
pub fn reset_directories<P: AsRef<Path>>(directories: &[P]) -> AdapterResult<()> {
    for directory in directories {
        let directory = directory.as_ref();
        if directory.exists() {
            fs::remove_dir_all(directory).map_err(|err| AdapterError::io(directory, err))?;
        }
        fs::create_dir_all(directory).map_err(|err| AdapterError::io(directory, err))?;
    }
    Ok(())
}

/// Unpack or copy a user-supplied file into `input_dir`.
pub fn handle_input_file(input_file: &Path, input_dir: &Path) -> AdapterResult<StagedInput> {
    let extension = normalized_extension(input_file).unwrap_or_default();
    let Some(kind) = classify(&extension) else {
        let shown = if extension.is_empty() {
            String::new()
        } else {
            format!(".{}", extension)
        };
        return Err(AdapterError::UnsupportedInput { extension: shown });
    };

    fs::create_dir_all(input_dir).map_err(|err| AdapterError::io(input_dir, err))?;

    let staged = match kind {
        InputKind::Tar => {
            let file = open(input_file)?;
            unpack_tar(tar::Archive::new(BufReader::new(file)), input_file, input_dir)?;
            StagedInput::Archive { files: Vec::new() }
        }
        InputKind::TarGz => {
            let file = open(input_file)?;
            let decoder = flate2::read::GzDecoder::new(BufReader::new(file));
            unpack_tar(tar::Archive::new(decoder), input_file, input_dir)?;
            StagedInput::Archive { files: Vec::new() }
        }
        InputKind::Zip => {
            let file = open(input_file)?;
            let mut archive =
                zip::ZipArchive::new(BufReader::new(file)).map_err(|err| AdapterError::Archive {
                    path: input_file.to_path_buf(),
                    message: err.to_string(),
                })?;
            archive
                .extract(input_dir)
                .map_err(|err| AdapterError::Archive {
                    path: input_file.to_path_buf(),
                    message: err.to_string(),
                })?;
            StagedInput::Archive { files: Vec::new() }
        }
        InputKind::Image => {
            let file_name = format!("{}.{}", STAGED_IMAGE_STEM, extension);
            let target = input_dir.join(&file_name);
            fs::copy(input_file, &target).map_err(|err| AdapterError::io(&target, err))?;
            StagedInput::Image { file_name }
        }
    };

    info!("{}", LOG_SEPARATOR);
    info!("Inputs uploaded to {}:", input_dir.display());
    let files = log_and_collect_files(input_dir, "")?;
    info!("{}", LOG_SEPARATOR);

    Ok(match staged {
        StagedInput::Archive { .. } => StagedInput::Archive { files },
        image => image,
    })
}

/// Recursively list `directory`, logging each entry and returning every file.
/// `__MACOSX` entries are skipped.
pub fn log_and_collect_files(directory: &Path, prefix: &str) -> AdapterResult<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(directory).map_err(|err| AdapterError::io(directory, err))? {
        let entry = entry.map_err(|err| AdapterError::io(directory, err))?;
        entries.push(entry.path());
    }
    entries.sort();

    let mut files = Vec::new();
    for path in entries {
        let Some(name) = path.file_name().map(|name| name.to_string_lossy().to_string()) else {
            continue;
        };
        if name == MACOS_METADATA_DIR {
            continue;
        }
        if path.is_file() {
            info!("{}{}", prefix, name);
            files.push(path);
        } else if path.is_dir() {
            info!("{}{}/", prefix, name);
            let nested_prefix = format!("{}{}/", prefix, name);
            files.extend(log_and_collect_files(&path, &nested_prefix)?);
        }
    }
    Ok(files)
}

fn open(path: &Path) -> AdapterResult<fs::File> {
    fs::File::open(path).map_err(|err| AdapterError::io(path, err))
}

fn unpack_tar<R: std::io::Read>(
    mut archive: tar::Archive<R>,
    source: &Path,
    input_dir: &Path,
) -> AdapterResult<()> {
    archive.unpack(input_dir).map_err(|err| AdapterError::Archive {
        path: source.to_path_buf(),
        message: err.to_string(),
    })
}
