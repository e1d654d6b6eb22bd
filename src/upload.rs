use crate::error::StoreError;
use lazy_static::lazy_static;
use log::info;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};

lazy_static! {
    static ref UNSAFE_CHARS: Regex = Regex::new(r"[^A-Za-z0-9_.-]").unwrap();
}

/// Reduce a client-supplied name to something safe to use as a file name
///
/// Path separators and whitespace runs become `_`, characters outside
/// `[A-Za-z0-9_.-]` are dropped and leading/trailing `.`/`_` are stripped.
/// The result may be empty.
///
/// # Examples
/// ```
/// use dashboard::upload::secure_filename;
///
/// assert_eq!(secure_filename("My Data (v2).csv"), "My_Data_v2.csv");
/// assert_eq!(secure_filename("../../etc/passwd"), "etc_passwd");
/// ```
pub fn secure_filename(name: &str) -> String {
    let spaced = name.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let cleaned = UNSAFE_CHARS.replace_all(&joined, "");
    cleaned.trim_matches(|c| c == '.' || c == '_').to_string()
}

/// Case-insensitive extension check against the configured list
pub fn has_allowed_extension(filename: &str, allowed: &[String]) -> bool {
    match Path::new(filename).extension().and_then(|e| e.to_str()) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Write an uploaded file into `uploads_dir` under its sanitized name
///
/// Returns the stored filename and its full path. A previous upload with
/// the same name is replaced.
pub fn store_upload(
    uploads_dir: &Path,
    original_name: &str,
    contents: &[u8],
    allowed: &[String],
) -> Result<(String, PathBuf), StoreError> {
    let filename = secure_filename(original_name);
    if filename.is_empty() {
        return Err(StoreError::InvalidFilename(original_name.to_string()));
    }
    if !has_allowed_extension(&filename, allowed) {
        return Err(StoreError::UnsupportedFileType(original_name.to_string()));
    }

    fs::create_dir_all(uploads_dir)?;
    let path = uploads_dir.join(&filename);
    fs::write(&path, contents)?;

    info!("stored upload {} ({} bytes)", path.display(), contents.len());
    Ok((filename, path))
}
