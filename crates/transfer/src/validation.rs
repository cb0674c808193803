use std::path::{Component, Path};

use crate::TransferError;

/// Storage path of chunk `index` for the artifact at `upload_path`.
pub fn chunk_path(upload_path: &str, index: u32) -> String {
    format!("{upload_path}.part{index:05}")
}

/// Storage path the reassembler merges into before publishing `upload_path`.
pub fn staging_path(upload_path: &str) -> String {
    format!("{upload_path}.partial")
}

/// Validates a relative, `/`-separated storage key.
///
/// A key may not be empty, contain NUL bytes, or resolve outside the store
/// root (absolute paths, `..` components, Windows drive or UNC prefixes).
pub fn validate_upload_path(key: &str) -> Result<(), TransferError> {
    if key.is_empty() {
        return Err(TransferError::InvalidPath("empty key".into()));
    }
    if key.contains('\0') {
        return Err(TransferError::InvalidPath(format!("NUL byte in key: {key:?}")));
    }

    let escapes = Path::new(key).components().any(|c| {
        matches!(
            c,
            Component::ParentDir | Component::RootDir | Component::Prefix(_)
        )
    });
    if escapes {
        return Err(TransferError::InvalidPath(format!(
            "key escapes the store root: {key}"
        )));
    }

    Ok(())
}
