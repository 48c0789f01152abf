//! Labels file reading
//!
//! One class name per line; the line position is the classifier's output
//! index. Surrounding whitespace is trimmed and blank lines are skipped.

use crate::error::{RegistryError, RegistryResult};
use std::path::Path;

pub fn parse_labels(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Read class names from a labels file
///
/// A missing file is `LabelsNotFound`, an empty one `EmptyLabels`.
pub fn read_labels(path: &Path) -> RegistryResult<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            RegistryError::LabelsNotFound(path.to_path_buf())
        } else {
            RegistryError::io(path, e)
        }
    })?;

    let labels = parse_labels(&content);
    if labels.is_empty() {
        return Err(RegistryError::EmptyLabels(path.to_path_buf()));
    }

    Ok(labels)
}
