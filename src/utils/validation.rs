use crate::error::{Result, UploadError};

/// Separator between the path prefix and the file name in object keys
pub const KEY_SEPARATOR: char = '/';

/// Builds the object key for a file: the prefix with one trailing separator
/// stripped, then `/`, then the file name.
pub fn destination_key(prefix: &str, file_name: &str) -> String {
    let prefix = prefix.strip_suffix(KEY_SEPARATOR).unwrap_or(prefix);
    format!("{}{}{}", prefix, KEY_SEPARATOR, file_name)
}

/// Rejects names that cannot be used as the last segment of an object key
pub fn validate_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(UploadError::InvalidFileName(
            "Filename cannot be empty".to_string(),
        ));
    }

    if name == "." || name == ".." {
        return Err(UploadError::InvalidFileName(format!(
            "'{}' is not a file name",
            name
        )));
    }

    if name.contains('/') || name.contains('\\') {
        tracing::warn!("Path separator in staged file name: {}", name);
        return Err(UploadError::InvalidFileName(format!(
            "'{}' must not contain path separators",
            name
        )));
    }

    if name.chars().any(|c| c.is_control()) {
        return Err(UploadError::InvalidFileName(format!(
            "'{}' contains control characters",
            name.escape_debug()
        )));
    }

    Ok(())
}

/// Returns `stem (n).ext` for collision suffixing. The extension is kept so
/// the object stays recognizable: `report.txt` becomes `report (1).txt`.
pub fn suffixed_name(name: &str, n: usize) -> String {
    match name.rfind('.') {
        // A leading dot marks a hidden file, not an extension
        Some(idx) if idx > 0 => format!("{} ({}){}", &name[..idx], n, &name[idx..]),
        _ => format!("{} ({})", name, n),
    }
}
