//! Workspace aggregator for the Logix to Ignition tag exporter.
//!
//! The pipeline lives in [`paxtags`]; the `paxtagctl` binary drives it
//! against a live controller and `demos/offline_export.rs` against a JSON
//! snapshot.

pub use ignition_xml;
pub use logix_tags;
pub use paxtags;
