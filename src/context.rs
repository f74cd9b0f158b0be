//! Workspace and project topic selections.
//!
//! A workspace keeps its manifest at `<root>/workspace.json`, a project at
//! `<root>/.conf/assistants/project.json`. Both are JSON objects whose
//! `topics` array names the topics visible from there; other keys are
//! ignored. A missing manifest selects nothing.
//!
//! Selections are pruned against the configured topic names on load, so a
//! topic that was deleted or renamed in the config silently drops out.
//! Manifests are never written back.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const WORKSPACE_MANIFEST: &str = "workspace.json";
pub const PROJECT_MANIFEST: &str = ".conf/assistants/project.json";

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    topics: Vec<String>,
}

/// Something that selects topics by name.
pub trait TopicSelection {
    fn topics(&self) -> &[String];
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Workspace {
    pub root: PathBuf,
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Project {
    pub root: PathBuf,
    pub topics: Vec<String>,
}

impl Workspace {
    pub fn load(root: &Path, valid_topics: Option<&HashSet<String>>) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            topics: load_topics(&root.join(WORKSPACE_MANIFEST), valid_topics)?,
        })
    }
}

impl Project {
    pub fn load(root: &Path, valid_topics: Option<&HashSet<String>>) -> Result<Self> {
        Ok(Self {
            root: root.to_path_buf(),
            topics: load_topics(&root.join(PROJECT_MANIFEST), valid_topics)?,
        })
    }
}

impl TopicSelection for Workspace {
    fn topics(&self) -> &[String] {
        &self.topics
    }
}

impl TopicSelection for Project {
    fn topics(&self) -> &[String] {
        &self.topics
    }
}

fn load_topics(path: &Path, valid_topics: Option<&HashSet<String>>) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(match valid_topics {
        Some(valid) => manifest
            .topics
            .into_iter()
            .filter(|t| valid.contains(t))
            .collect(),
        None => manifest.topics,
    })
}
