//! Filesystem-backed rule source with hot reload.

use std::fs;
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{info, warn};

use crate::schema::RuleSpec;
use crate::{OnChange, RuleSource, SourceError};

/// Reads the rule set from a JSON document and re-reads it on change.
///
/// The watcher observes the document's parent directory so that editors
/// and deploy tools that replace-by-rename are still seen. A reload that
/// fails to read or parse keeps the previously delivered set.
pub struct FileRuleSource {
    path: PathBuf,
    _watcher: Option<RecommendedWatcher>,
}

impl FileRuleSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _watcher: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_rules(path: &Path) -> Result<Vec<RuleSpec>, SourceError> {
        let contents = fs::read_to_string(path)?;
        let rules: Vec<RuleSpec> = serde_json::from_str(&contents)?;
        Ok(rules)
    }
}

impl RuleSource for FileRuleSource {
    fn list_rules(&self) -> Result<Vec<RuleSpec>, SourceError> {
        Self::read_rules(&self.path)
    }

    fn watch(&mut self, on_change: OnChange) -> Result<(), SourceError> {
        let path = self.path.clone();
        let mut watcher =
            notify::recommended_watcher(move |event: Result<Event, notify::Error>| {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "rule watcher error");
                        return;
                    }
                };

                if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
                    return;
                }
                if !event
                    .paths
                    .iter()
                    .any(|p| p.file_name() == path.file_name())
                {
                    return;
                }

                match Self::read_rules(&path) {
                    Ok(rules) => {
                        info!(
                            count = rules.len(),
                            path = %path.display(),
                            "rule document reloaded"
                        );
                        on_change(rules);
                    }
                    Err(e) => {
                        warn!(
                            path = %path.display(),
                            error = %e,
                            "failed to reload rule document, keeping previous set"
                        );
                    }
                }
            })?;

        let target = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        watcher.watch(target, RecursiveMode::NonRecursive)?;
        self._watcher = Some(watcher);
        Ok(())
    }
}
