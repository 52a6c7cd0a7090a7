//! Rule-set retrieval and hot reload.
//!
//! A [`RuleSource`] delivers the full rule set on demand and pushes the
//! full replacement set whenever the upstream store changes. The
//! filesystem implementation watches a JSON document.

pub mod file;
pub mod schema;

pub use file::FileRuleSource;
pub use schema::{ConditionSpec, RuleSpec};

/// Callback invoked with the full replacement rule set.
pub type OnChange = Box<dyn Fn(Vec<RuleSpec>) + Send + Sync + 'static>;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read rule document: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse rule document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("failed to watch rule document: {0}")]
    Watch(#[from] notify::Error),
}

/// A store of alert rules with change notification.
///
/// `list_rules` failing at bootstrap is the host's only fatal rule-source
/// path; reload failures after that keep the previously delivered set.
pub trait RuleSource {
    /// Returns the current rule set. An empty set is valid.
    fn list_rules(&self) -> Result<Vec<RuleSpec>, SourceError>;

    /// Registers a callback that receives the full replacement set
    /// whenever the upstream document changes.
    fn watch(&mut self, on_change: OnChange) -> Result<(), SourceError>;
}
