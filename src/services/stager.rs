/// Upload directory: staging, listing and cleanup of attachment files
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use tokio::io::AsyncWriteExt;

use crate::models::staged_file::{StagedFile, UploadedFileInfo};

/// Bytes left alone by the encoder: alphanumerics plus `-_.~/`.
const STORAGE_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Upper bound on suffix probing for one name.
const MAX_SUFFIX: u32 = 10_000;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("Error saving file {file_name}: {source}")]
    Io {
        file_name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Error saving file {file_name}: no free name left in the upload directory")]
    Exhausted { file_name: String },
}

/// Percent-encodes `file_name` and keeps only `[A-Za-z0-9%-_.]`.
///
/// Non-ASCII names survive as their UTF-8 percent escapes, so
/// [`display_name`] recovers them.
pub fn storage_name(file_name: &str) -> String {
    utf8_percent_encode(file_name, STORAGE_ENCODE_SET)
        .to_string()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '%' | '-' | '_' | '.'))
        .collect()
}

/// Percent-decodes a storage name back into what the user uploaded.
pub fn display_name(storage_name: &str) -> String {
    percent_decode_str(storage_name)
        .decode_utf8_lossy()
        .into_owned()
}

/// `name_<n>.ext`, splitting on the last dot; `name_<n>` without one.
pub fn suffixed_name(name: &str, counter: u32) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{stem}_{counter}.{ext}"),
        None => format!("{name}_{counter}"),
    }
}

/// Writes `content` under a collision-free name in `upload_dir`.
///
/// Files are opened with `create_new`, so an existing file is never
/// overwritten even when two uploads race for the same name.
pub async fn stage(
    upload_dir: &Path,
    file_name: &str,
    content: &[u8],
) -> Result<StagedFile, StagingError> {
    let io_err = |source| StagingError::Io {
        file_name: file_name.to_string(),
        source,
    };

    let mut base = storage_name(file_name);
    if base.is_empty() {
        base = format!("file_{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
    }

    tokio::fs::create_dir_all(upload_dir).await.map_err(io_err)?;

    let mut counter = 0u32;
    loop {
        let candidate = if counter == 0 {
            base.clone()
        } else {
            suffixed_name(&base, counter)
        };
        let path = upload_dir.join(&candidate);

        match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(mut file) => {
                if let Err(e) = write_all(&mut file, content).await {
                    drop(file);
                    if let Err(rm) = tokio::fs::remove_file(&path).await {
                        tracing::warn!(path = %path.display(), error = %rm, "could not remove partial upload");
                    }
                    return Err(io_err(e));
                }
                tracing::debug!(file = %file_name, path = %path.display(), bytes = content.len(), "staged upload");
                return Ok(StagedFile {
                    display_name: display_name(&candidate),
                    storage_path: path.to_string_lossy().into_owned(),
                });
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                counter += 1;
                if counter > MAX_SUFFIX {
                    return Err(StagingError::Exhausted {
                        file_name: file_name.to_string(),
                    });
                }
            }
            Err(e) => return Err(io_err(e)),
        }
    }
}

async fn write_all(file: &mut tokio::fs::File, content: &[u8]) -> std::io::Result<()> {
    file.write_all(content).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Resolves `path` and checks that it sits inside `upload_dir`.
///
/// Returns `Ok(None)` when the file does not exist.
pub async fn resolve_in_upload_dir(
    upload_dir: &Path,
    path: &str,
) -> std::io::Result<Option<PathBuf>> {
    if !tokio::fs::try_exists(path).await? {
        return Ok(None);
    }
    let dir = tokio::fs::canonicalize(upload_dir).await?;
    let resolved = tokio::fs::canonicalize(path).await?;
    let is_file = tokio::fs::metadata(&resolved).await?.is_file();
    if resolved.parent() == Some(dir.as_path()) && is_file {
        Ok(Some(resolved))
    } else {
        Err(std::io::Error::new(
            ErrorKind::PermissionDenied,
            format!("{path} is outside the upload directory"),
        ))
    }
}

/// Deletes files that were just sent. Never fails: problems are logged.
pub async fn remove_sent(paths: &[String]) -> usize {
    let mut removed = 0;
    for path in paths {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                removed += 1;
                tracing::debug!(path = %path, "deleted sent file");
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::warn!(path = %path, "sent file already gone at cleanup");
            }
            Err(e) => {
                tracing::error!(path = %path, error = %e, "failed to delete sent file");
            }
        }
    }
    removed
}

/// Lists regular files in the upload directory, oldest first.
pub async fn list(upload_dir: &Path) -> std::io::Result<Vec<UploadedFileInfo>> {
    let mut files = Vec::new();
    let mut entries = match tokio::fs::read_dir(upload_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(files),
        Err(e) => return Err(e),
    };

    let mut with_time = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let meta = entry.metadata().await?;
        if !meta.is_file() {
            continue;
        }
        let created = meta.created().or_else(|_| meta.modified()).ok();
        let file_name = entry.file_name().to_string_lossy().into_owned();
        with_time.push((
            created,
            UploadedFileInfo {
                name: display_name(&file_name),
                path: entry.path().to_string_lossy().into_owned(),
                size: meta.len(),
                created: created.map(|t| {
                    chrono::DateTime::<chrono::Utc>::from(t)
                        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
                }),
            },
        ));
    }
    with_time.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.path.cmp(&b.1.path)));
    files.extend(with_time.into_iter().map(|(_, info)| info));
    Ok(files)
}

/// Deletes the given files, or every file when `paths` is empty.
///
/// Paths outside the upload directory are skipped.
pub async fn delete(upload_dir: &Path, paths: &[String]) -> std::io::Result<usize> {
    let targets: Vec<String> = if paths.is_empty() {
        list(upload_dir).await?.into_iter().map(|f| f.path).collect()
    } else {
        paths.to_vec()
    };

    let mut removed = 0;
    for path in &targets {
        match resolve_in_upload_dir(upload_dir, path).await {
            Ok(Some(resolved)) => match tokio::fs::remove_file(&resolved).await {
                Ok(()) => {
                    removed += 1;
                    tracing::debug!(path = %path, "deleted upload");
                }
                Err(e) => tracing::warn!(path = %path, error = %e, "failed to delete upload"),
            },
            Ok(None) => tracing::warn!(path = %path, "file not found in upload directory"),
            Err(e) => tracing::warn!(path = %path, error = %e, "refusing to delete"),
        }
    }
    Ok(removed)
}
