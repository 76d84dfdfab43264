//! Making output files writable before a computation overwrites them

use crate::backend::Backend;
use crate::error::ProvisionError;
use dmake_codec::DatasetPath;
use std::path::Path;

/// What unlocking did to one path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unlocked {
    /// Nothing at the path, or already a regular file
    Unchanged,
    /// Symlink to present content, unlocked through the backend
    Unlocked,
    /// Dangling symlink replaced by a placeholder holding its content address
    Placeholder,
}

/// Content of the placeholder written in place of a dangling annex link
#[must_use]
pub fn placeholder_content(link_target: &Path) -> String {
    let key = link_target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/annex/objects/{key}\n")
}

/// Unlock one file below `root`
///
/// Applying it twice is a no-op the second time.
///
/// # Errors
/// Returns an error if the link cannot be replaced or the backend fails.
pub fn unlock_file<B: Backend + ?Sized>(
    backend: &B,
    root: &Path,
    path: &DatasetPath,
) -> Result<Unlocked, ProvisionError> {
    let file = path.to_path(root);
    let Ok(metadata) = std::fs::symlink_metadata(&file) else {
        return Ok(Unlocked::Unchanged);
    };
    if !metadata.file_type().is_symlink() {
        return Ok(Unlocked::Unchanged);
    }

    if file.exists() {
        backend.unlock(&file)?;
        return Ok(Unlocked::Unlocked);
    }

    let target = std::fs::read_link(&file).map_err(|e| ProvisionError::io_error(&file, e))?;
    std::fs::remove_file(&file).map_err(|e| ProvisionError::io_error(&file, e))?;
    std::fs::write(&file, placeholder_content(&target))
        .map_err(|e| ProvisionError::io_error(&file, e))?;
    tracing::debug!(file = %file.display(), "replaced dangling link with placeholder");
    Ok(Unlocked::Placeholder)
}

/// Unlock every path of `outputs` below `root`
///
/// # Errors
/// Stops at the first path that fails.
pub fn unlock_outputs<B: Backend + ?Sized>(
    backend: &B,
    root: &Path,
    outputs: &[DatasetPath],
) -> Result<(), ProvisionError> {
    for output in outputs {
        unlock_file(backend, root, output)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn placeholder_uses_last_component() {
        let target = PathBuf::from("../../.git/annex/objects/Xy/Zw/MD5E-s2--abc.txt/MD5E-s2--abc.txt");
        assert_eq!(placeholder_content(&target), "/annex/objects/MD5E-s2--abc.txt\n");
    }
}
