//! Logix tag metadata: descriptor model, type selection and array expansion.

mod expand;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use expand::{expand, expand_all, Expansion};

/// Errors raised while turning descriptors into concrete instance names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TagError {
    /// A dimension slot carried a negative size.
    #[error("malformed descriptor {tag}: dimension {slot} has negative size {size}")]
    MalformedDescriptor {
        /// Base name of the rejected tag.
        tag: String,
        /// Zero-based position of the offending entry in the dimension list.
        slot: usize,
        /// The reported size.
        size: i64,
    },
}

/// Failure of the controller metadata source.
///
/// Every transport problem collapses into this one kind; callers report it
/// as "unable to connect" and stop.
#[derive(Debug, Error)]
#[error("controller connection failed: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        SourceError(msg.into())
    }
}

/// One controller tag as reported by the metadata source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TagDescriptor {
    /// Fully qualified tag name (`Tank1`, `Program:Main.Pump3`).
    pub name: String,
    /// Declared data type name, e.g. an AOI or UDT name such as `P_AIn`.
    pub declared_type: String,
    /// Alias tags point at other storage and never produce instances.
    #[cfg_attr(feature = "serde", serde(default))]
    pub is_alias: bool,
    /// Per-slot array sizes; `0` marks an unused slot.
    #[cfg_attr(feature = "serde", serde(default))]
    pub dimensions: Vec<i64>,
}

impl TagDescriptor {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            is_alias: false,
            dimensions: Vec::new(),
        }
    }

    /// Set the dimension list.
    pub fn with_dimensions(mut self, dimensions: impl IntoIterator<Item = i64>) -> Self {
        self.dimensions = dimensions.into_iter().collect();
        self
    }

    /// Mark the descriptor as an alias.
    pub fn alias(mut self) -> Self {
        self.is_alias = true;
        self
    }

    /// True when no dimension slot is in use.
    pub fn is_scalar(&self) -> bool {
        self.dimensions.iter().all(|&size| size == 0)
    }
}

/// Read-only snapshot provider for controller identity and tag metadata.
#[async_trait]
pub trait TagSource: Send {
    /// Name the controller reports for itself.
    async fn controller_name(&mut self) -> Result<String, SourceError>;
    /// Every user tag visible on the controller, in controller order.
    async fn tag_list(&mut self) -> Result<Vec<TagDescriptor>, SourceError>;
}

/// Keep non-alias descriptors whose declared type equals `target_type`.
///
/// The match is exact and case-sensitive; input order is preserved.
pub fn select<'a>(descriptors: &'a [TagDescriptor], target_type: &str) -> Vec<&'a TagDescriptor> {
    let selected: Vec<_> = descriptors
        .iter()
        .filter(|tag| tag.declared_type == target_type && !tag.is_alias)
        .collect();
    debug!(
        target_type,
        total = descriptors.len(),
        selected = selected.len(),
        "selected tags by type"
    );
    selected
}
