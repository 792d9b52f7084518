use std::collections::HashSet;

use crate::multistatus::trim_dir_path;
use crate::{RemoteFile, RemoteSource, WebDavError};

/// Audio files found by a walk plus the sub-directories that could not be
/// listed, with the error each one returned.
#[derive(Debug, Default)]
pub struct WalkResult {
    pub files: Vec<RemoteFile>,
    pub skipped_directories: Vec<(String, WebDavError)>,
}

pub fn has_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&ext.to_lowercase()))
}

/// Depth-first walk in listing order. Only a failure to list `root` is an
/// error; broken sub-directories are recorded and left out. Each directory
/// is listed at most once.
pub async fn walk(
    source: &dyn RemoteSource,
    root: &str,
    extensions: &[String],
    recursive: bool,
) -> Result<WalkResult, WebDavError> {
    let mut result = WalkResult::default();
    let mut visited = HashSet::from([trim_dir_path(root)]);
    let mut stack = vec![source.list_dir(root).await?.into_iter()];

    while let Some(entries) = stack.last_mut() {
        let Some(entry) = entries.next() else {
            stack.pop();
            continue;
        };
        if entry.is_directory {
            if !recursive || !visited.insert(trim_dir_path(&entry.path)) {
                continue;
            }
            match source.list_dir(&entry.path).await {
                Ok(children) => stack.push(children.into_iter()),
                Err(err) => {
                    tracing::warn!("skipping unreadable directory {}: {}", entry.path, err);
                    result.skipped_directories.push((entry.path, err));
                }
            }
        } else if has_extension(&entry.name, extensions) {
            result.files.push(entry);
        }
    }

    Ok(result)
}
