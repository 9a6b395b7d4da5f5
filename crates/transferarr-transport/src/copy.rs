//! Recursive, crash-safe directory replication shared by every [`crate::Transport`]
//! backend.
//!
//! Two policies live here rather than in either backend:
//!
//! * **skip-if-size-matches** — if the destination already has a file of
//!   the same size, it is assumed to be a complete copy from a prior,
//!   interrupted attempt and is not re-copied. This is what makes restart
//!   after a crash mid-copy safe without a manifest.
//! * **first-path-component dedup** — a torrent's payload may be a single
//!   file or a directory; either way exactly one top-level entry is
//!   copied, named after the torrent's own top-level entry rather than
//!   the media manager's per-item path, so a second manager item pointing
//!   at the same torrent can't cause a duplicate copy.

use std::collections::VecDeque;

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::error::{TransportError, TransportResult};
use crate::{join, RemoteEntry, Transport};

/// One unit of copy progress, reported as each file is skipped or
/// finishes copying.
#[derive(Debug, Clone)]
pub struct CopyProgress<'a> {
    /// Index (0-based) of the file currently being copied or skipped.
    pub file_index: usize,
    /// Total number of files the tree copy will touch.
    pub total_files: usize,
    /// Path of the file, relative to the root of the copy.
    pub file_name: &'a str,
    /// Bytes written so far for this file.
    pub bytes_done: u64,
    /// Total size of this file.
    pub bytes_total: u64,
}

/// Callback invoked after every file is skipped or completed.
pub type ProgressFn<'a> = dyn FnMut(CopyProgress<'_>) + Send + 'a;

/// Summary of a completed [`copy_tree`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Files copied because the destination was missing or size-mismatched.
    pub files_copied: u64,
    /// Files left untouched because the destination already matched.
    pub files_skipped: u64,
    /// Total bytes actually written (excludes skipped files).
    pub bytes_copied: u64,
}

struct PlannedFile {
    relative_path: String,
    size_bytes: u64,
}

/// Copies the single top-level entry at `source_path` on `source` to
/// `dest_path` on `dest`, recursing into it if it is a directory.
///
/// `dest_path`'s name is the caller's choice (typically the torrent's own
/// top-level entry name), independent of `source_path`'s own name, which
/// is how the first-path-component dedup policy is applied by callers.
///
/// # Errors
///
/// Returns [`TransportError::NotFound`] if `source_path` does not exist,
/// or any I/O/SFTP error encountered while listing or copying.
pub async fn copy_tree(
    source: &dyn Transport,
    source_path: &str,
    dest: &dyn Transport,
    dest_path: &str,
    mut on_progress: Box<ProgressFn<'_>>,
) -> TransportResult<CopyOutcome> {
    let root_stat = source
        .stat(source_path)
        .await?
        .ok_or_else(|| TransportError::NotFound {
            path: source_path.to_string(),
        })?;

    let plan = if root_stat.is_dir {
        plan_directory(source, source_path).await?
    } else {
        vec![PlannedFile {
            relative_path: String::new(),
            size_bytes: root_stat.size_bytes,
        }]
    };

    let total_files = plan.len();
    let mut outcome = CopyOutcome::default();

    for (index, file) in plan.into_iter().enumerate() {
        let from = join(source_path, &file.relative_path);
        let to = join(dest_path, &file.relative_path);

        let already_done = matches!(
            dest.stat(&to).await?,
            Some(existing) if !existing.is_dir && existing.size_bytes == file.size_bytes
        );

        if already_done {
            outcome.files_skipped += 1;
        } else {
            copy_one_file(source, &from, dest, &to, file.size_bytes, |done| {
                on_progress(CopyProgress {
                    file_index: index,
                    total_files,
                    file_name: &file.relative_path,
                    bytes_done: done,
                    bytes_total: file.size_bytes,
                });
            })
            .await?;
            outcome.files_copied += 1;
            outcome.bytes_copied += file.size_bytes;
        }

        on_progress(CopyProgress {
            file_index: index,
            total_files,
            file_name: &file.relative_path,
            bytes_done: file.size_bytes,
            bytes_total: file.size_bytes,
        });
    }

    Ok(outcome)
}

async fn plan_directory(source: &dyn Transport, root: &str) -> TransportResult<Vec<PlannedFile>> {
    let mut plan = Vec::new();
    let mut queue = VecDeque::new();
    queue.push_back(String::new());

    while let Some(relative_dir) = queue.pop_front() {
        let absolute_dir = join(root, &relative_dir);
        let entries: Vec<RemoteEntry> = source.list_dir(&absolute_dir).await?;

        for entry in entries {
            let relative_path = if relative_dir.is_empty() {
                entry.name.clone()
            } else {
                join(&relative_dir, &entry.name)
            };

            if entry.is_dir {
                queue.push_back(relative_path);
            } else {
                plan.push(PlannedFile {
                    relative_path,
                    size_bytes: entry.size_bytes,
                });
            }
        }
    }

    Ok(plan)
}

const COPY_CHUNK_BYTES: usize = 1024 * 1024;

async fn copy_one_file(
    source: &dyn Transport,
    from: &str,
    dest: &dyn Transport,
    to: &str,
    size_bytes: u64,
    mut report: impl FnMut(u64),
) -> TransportResult<()> {
    let mut reader = source.open_read(from).await?;
    let mut writer = dest.open_write(to).await?;

    let mut buffer = vec![0_u8; COPY_CHUNK_BYTES];
    let mut copied = 0_u64;

    loop {
        let read = reader
            .read(&mut buffer)
            .await
            .map_err(|source| TransportError::Io {
                operation: "copy_tree:read",
                path: from.to_string(),
                source,
            })?;
        if read == 0 {
            break;
        }
        writer
            .write_all(&buffer[..read])
            .await
            .map_err(|source| TransportError::Io {
                operation: "copy_tree:write",
                path: to.to_string(),
                source,
            })?;
        copied += read as u64;
        report(copied.min(size_bytes));
    }

    writer.flush().await.map_err(|source| TransportError::Io {
        operation: "copy_tree:flush",
        path: to.to_string(),
        source,
    })
}
