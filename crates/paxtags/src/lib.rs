#![cfg_attr(docsrs, feature(doc_cfg))]
//! High level facade that turns a controller tag snapshot into an Ignition
//! tag import file.
//!
//! ```rust,no_run
//! use paxtags::{eip, export, write_export, ExportOptions, ExportOutcome};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let path: eip::CommPath = "192.168.1.10/0".parse()?;
//! let mut plc = eip::LogixController::open(&path).await?;
//! let options = ExportOptions::default();
//! if let ExportOutcome::Generated(generated) = export(&mut plc, "P_AIn", &options).await? {
//!     let file = write_export(&generated, &options.output_dir)?;
//!     println!("wrote {}", file.display());
//! }
//! plc.close().await?;
//! # Ok(())
//! # }
//! ```

pub use cip;
pub use ignition_xml as xml;
pub use logix_tags as tags;
pub use tl_eip as eip;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::tags::{SourceError, TagDescriptor, TagError, TagSource};
use crate::xml::{TagsDocument, UdtInstance, XmlError};

/// Parameter carrying the controller name on every generated instance.
pub const DEFAULT_CONTROLLER_PARAMETER: &str = "PLC";

/// Error type produced by the export pipeline.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The controller could not be reached or read.
    #[error(transparent)]
    Source(#[from] SourceError),
    /// Serialising the document failed.
    #[error(transparent)]
    Xml(#[from] XmlError),
    /// Creating or writing the output file failed.
    #[error("writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Knobs for one export run.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Attributes of the `Tags` root element, in output order.
    pub root_attributes: Vec<(String, String)>,
    /// Parameter name under which the controller name is recorded.
    pub controller_parameter: String,
    /// Directory the import file is written to.
    pub output_dir: PathBuf,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            root_attributes: xml::default_root_attributes(),
            controller_parameter: DEFAULT_CONTROLLER_PARAMETER.to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

/// Result of running the pipeline against one snapshot.
#[derive(Debug)]
pub enum ExportOutcome {
    /// Nothing of the requested type could be exported; no file should be written.
    NoInstances {
        controller: String,
        type_name: String,
        /// Matching descriptors that were rejected as malformed.
        rejected: Vec<TagError>,
    },
    /// A document was built.
    Generated(GeneratedExport),
}

/// Document built for one controller and type.
#[derive(Debug)]
pub struct GeneratedExport {
    pub controller: String,
    pub type_name: String,
    pub document: TagsDocument,
    pub instance_count: usize,
    /// Matching descriptors left out because their dimensions were malformed.
    pub rejected: Vec<TagError>,
}

impl GeneratedExport {
    pub fn file_name(&self) -> String {
        output_file_name(&self.controller, &self.type_name)
    }

    /// Serialise the document into a `String`.
    pub fn to_xml(&self) -> Result<String, XmlError> {
        xml::to_string(&self.document)
    }
}

/// `<device>_<type>_IgnitionTags.xml`
pub fn output_file_name(controller: &str, type_name: &str) -> String {
    format!("{controller}_{type_name}_IgnitionTags.xml")
}

/// Snapshot the controller and build the import document for `type_name`.
///
/// The controller name and tag list are read once; selection, expansion and
/// document assembly then run without touching the source again.
pub async fn export<S>(
    source: &mut S,
    type_name: &str,
    options: &ExportOptions,
) -> Result<ExportOutcome, ExportError>
where
    S: TagSource + ?Sized,
{
    let controller = source.controller_name().await?;
    let descriptors = source.tag_list().await?;
    info!(%controller, tags = descriptors.len(), "read tag snapshot");

    let selected = tags::select(&descriptors, type_name);
    let expansion = tags::expand_all(selected);
    if expansion.instances.is_empty() {
        info!(type_name, "no instances found");
        return Ok(ExportOutcome::NoInstances {
            controller,
            type_name: type_name.to_string(),
            rejected: expansion.rejected,
        });
    }

    let instances: Vec<UdtInstance> = expansion
        .instances
        .iter()
        .map(|name| {
            UdtInstance::new(type_name, name.as_str())
                .with_parameter(options.controller_parameter.as_str(), controller.as_str())
        })
        .collect();
    let document = xml::build(&options.root_attributes, &instances);
    info!(type_name, instances = instances.len(), "generated tag document");
    Ok(ExportOutcome::Generated(GeneratedExport {
        controller,
        type_name: type_name.to_string(),
        document,
        instance_count: instances.len(),
        rejected: expansion.rejected,
    }))
}

/// Write the document into `dir` under its conventional file name.
pub fn write_export(export: &GeneratedExport, dir: impl AsRef<Path>) -> Result<PathBuf, ExportError> {
    let path = dir.as_ref().join(export.file_name());
    let io_err = |source| ExportError::Io {
        path: path.clone(),
        source,
    };
    let file = File::create(&path).map_err(io_err)?;
    let mut out = xml::write_document(&export.document, BufWriter::new(file))?;
    out.flush().map_err(io_err)?;
    info!(path = %path.display(), "wrote tag import file");
    Ok(path)
}

/// In-memory [`TagSource`] over a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct StaticTagSource {
    pub controller: String,
    pub tags: Vec<TagDescriptor>,
}

impl StaticTagSource {
    pub fn new(controller: impl Into<String>, tags: Vec<TagDescriptor>) -> Self {
        Self {
            controller: controller.into(),
            tags,
        }
    }
}

#[async_trait]
impl TagSource for StaticTagSource {
    async fn controller_name(&mut self) -> Result<String, SourceError> {
        Ok(self.controller.clone())
    }

    async fn tag_list(&mut self) -> Result<Vec<TagDescriptor>, SourceError> {
        Ok(self.tags.clone())
    }
}
