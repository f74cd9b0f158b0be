//! Topic file enumeration.
//!
//! Walks a topic's root recursively and lists its regular files. A root
//! that does not exist is not an error: the topic simply contributes no
//! files for this run. Entries the walk cannot read are reported and
//! skipped; the rest of the topic is still listed.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::models::{SourceFile, Topic};

/// What a walk of one topic root produced.
#[derive(Debug, Default)]
pub struct CollectedFiles {
    /// Sorted by relative path.
    pub files: Vec<SourceFile>,
    /// `"{topic}: {relative_path}: {message}"`, one per unreadable entry.
    pub errors: Vec<String>,
}

/// Files under `topic.path`.
///
/// Only an invalid exclude pattern fails the whole topic.
pub fn collect_files(topic: &Topic) -> Result<CollectedFiles> {
    let root = expand_home(&topic.path);
    let mut collected = CollectedFiles::default();
    if !root.exists() {
        debug!(topic = %topic.name, root = %root.display(), "topic root missing, skipping");
        return Ok(collected);
    }

    let exclude_set = build_globset(&topic.exclude)
        .with_context(|| format!("invalid exclude pattern in topic '{}'", topic.name))?;

    for entry in WalkDir::new(&root).follow_links(topic.follow_symlinks) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                let rel = e
                    .path()
                    .map(|p| relative_to(&root, p))
                    .unwrap_or_default();
                warn!(topic = %topic.name, path = %rel, error = %e, "walk error, skipping entry");
                collected
                    .errors
                    .push(format!("{}: {}: {}", topic.name, rel, e));
                continue;
            }
        };

        // `Path::is_file` follows links, so a symlink to a regular file counts.
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let rel_str = relative_to(&root, path);
        if exclude_set.is_match(&rel_str) {
            continue;
        }

        collected.files.push(SourceFile {
            topic: topic.name.clone(),
            absolute_path: path.to_path_buf(),
            relative_path: rel_str,
        });
    }

    collected
        .files
        .sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(collected)
}

/// `path` below `root`, joined with `/`.
fn relative_to(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Replace a leading `~` with the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
