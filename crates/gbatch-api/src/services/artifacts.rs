//! Zip bundling of downloaded artifacts.

use std::fs;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::error::{ApiError, ApiResult};

/// Every regular file under `root`, sorted, with its path relative to `root`.
fn collect_files(root: &Path) -> ApiResult<Vec<(String, PathBuf)>> {
    let mut files = Vec::new();
    if !root.exists() {
        return Ok(files);
    }

    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                let name = path
                    .strip_prefix(root)
                    .map_err(|e| ApiError::internal(format!("Bad artifact path: {e}")))?
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                files.push((name, path));
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Zip everything under `root`. `None` when there is nothing to bundle.
pub fn bundle_artifacts(root: &Path) -> ApiResult<Option<Vec<u8>>> {
    let files = collect_files(root)?;
    if files.is_empty() {
        return Ok(None);
    }

    let mut cursor = Cursor::new(Vec::new());
    let mut zip = ZipWriter::new(&mut cursor);
    let options =
        SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for (name, path) in &files {
        zip.start_file(name.as_str(), options)
            .map_err(|e| ApiError::internal(format!("Failed to add zip entry: {e}")))?;
        let bytes = fs::read(path)?;
        zip.write_all(&bytes)?;
    }

    zip.finish()
        .map_err(|e| ApiError::internal(format!("Failed to finish zip: {e}")))?;

    Ok(Some(cursor.into_inner()))
}

/// Download name for a bundle created now.
pub fn archive_filename() -> String {
    format!(
        "gbatch-artifacts-{}.zip",
        chrono::Utc::now().format("%Y%m%d-%H%M%S")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_or_empty_dir_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(bundle_artifacts(&dir.path().join("absent")).unwrap().is_none());
        fs::create_dir_all(dir.path().join("job-1")).unwrap();
        assert!(bundle_artifacts(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_entries_use_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("job-2")).unwrap();
        fs::create_dir_all(dir.path().join("job-1")).unwrap();
        fs::write(dir.path().join("job-2/image_0.png"), b"two").unwrap();
        fs::write(dir.path().join("job-1/image_0.png"), b"one").unwrap();

        let files = collect_files(dir.path()).unwrap();
        let names: Vec<_> = files.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["job-1/image_0.png", "job-2/image_0.png"]);

        let bytes = bundle_artifacts(dir.path()).unwrap().unwrap();
        assert!(bytes.starts_with(b"PK"));
    }

    #[test]
    fn test_archive_filename() {
        let name = archive_filename();
        assert!(name.starts_with("gbatch-artifacts-"));
        assert!(name.ends_with(".zip"));
    }
}
