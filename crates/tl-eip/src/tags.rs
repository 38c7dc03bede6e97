//! Logix tag metadata upload: symbol paging, program scopes and template names.

use std::collections::HashMap;

use async_trait::async_trait;
use cip::logix::{self, SymbolEntry};
use cip::GeneralStatus;
use logix_tags::{SourceError, TagDescriptor, TagSource};
use tracing::{debug, info, trace, warn};

use crate::session::{CommPath, EipError, EipSession};

/// Logix controller reachable over EtherNet/IP.
pub struct LogixController {
    session: EipSession,
    templates: HashMap<u16, String>,
}

impl LogixController {
    /// Connect and register a session with the controller at `path`.
    pub async fn open(path: &CommPath) -> Result<Self, EipError> {
        let session = EipSession::connect(path).await?;
        Ok(Self {
            session,
            templates: HashMap::new(),
        })
    }

    pub fn session(&self) -> &EipSession {
        &self.session
    }

    /// Read the controller (project) name.
    pub async fn name(&mut self) -> Result<String, EipError> {
        let reply = self.session.request(&logix::program_name_request()).await?;
        let name = logix::parse_program_name(&reply.data)?;
        debug!(%name, "read controller name");
        Ok(name)
    }

    /// List every symbol in the controller scope, or in a program when `scope` is set.
    pub async fn symbols(&mut self, scope: Option<&str>) -> Result<Vec<SymbolEntry>, EipError> {
        let mut start = 0u32;
        let mut symbols = Vec::new();
        loop {
            let request = logix::symbol_list_request(scope, start)?;
            let reply = self.session.request(&request).await?;
            let page = logix::parse_symbol_entries(&reply.data)?;
            trace!(?scope, start, count = page.len(), status = ?reply.status, "symbol page");
            let last = page.last().map(|entry| entry.instance);
            symbols.extend(page);
            if reply.status != GeneralStatus::PartialTransfer {
                break;
            }
            start = match last {
                Some(instance) => instance + 1,
                None => {
                    return Err(EipError::Protocol(
                        "partial symbol reply carried no entries".into(),
                    ))
                }
            };
        }
        Ok(symbols)
    }

    /// Resolve the name of a structure template, caching the result.
    pub async fn template_name(&mut self, instance: u16) -> Result<String, EipError> {
        if let Some(name) = self.templates.get(&instance) {
            return Ok(name.clone());
        }
        let reply = self
            .session
            .request(&logix::template_attributes_request(instance))
            .await?;
        let attributes = logix::parse_template_attributes(&reply.data)?;
        let total = attributes.definition_len();
        let mut definition = Vec::with_capacity(total as usize);
        let mut offset = 0u32;
        while offset < total {
            let chunk = u16::try_from(total - offset).unwrap_or(u16::MAX);
            let request = logix::read_template_request(instance, offset, chunk);
            let reply = self.session.request(&request).await?;
            if reply.data.is_empty() {
                return Err(EipError::Protocol(format!(
                    "template {instance:#06x} read returned no data"
                )));
            }
            definition.extend_from_slice(&reply.data);
            offset += reply.data.len() as u32;
            if reply.status == GeneralStatus::Success {
                break;
            }
        }
        let name = logix::template_name(&definition, attributes.member_count)?;
        debug!(instance, %name, "resolved template");
        self.templates.insert(instance, name.clone());
        Ok(name)
    }

    /// Upload controller-scope and program-scope user tags.
    pub async fn tag_descriptors(&mut self) -> Result<Vec<TagDescriptor>, EipError> {
        let mut programs = Vec::new();
        let mut tags = Vec::new();
        for entry in self.symbols(None).await? {
            if let Some(program) = entry.program_scope() {
                programs.push(program.to_string());
            } else if is_user_symbol(&entry) {
                tags.push(self.describe(&entry, None).await?);
            }
        }
        for program in &programs {
            for entry in self.symbols(Some(program)).await? {
                if is_user_symbol(&entry) {
                    tags.push(self.describe(&entry, Some(program)).await?);
                }
            }
        }
        info!(
            tags = tags.len(),
            programs = programs.len(),
            "uploaded tag metadata"
        );
        Ok(tags)
    }

    async fn describe(
        &mut self,
        entry: &SymbolEntry,
        program: Option<&str>,
    ) -> Result<TagDescriptor, EipError> {
        let name = match program {
            Some(program) => format!("{program}.{}", entry.name),
            None => entry.name.clone(),
        };
        let declared_type = match entry.symbol_type.template_instance() {
            Some(instance) => match self.template_name(instance).await {
                Ok(name) => name,
                Err(EipError::Status { status, .. }) => {
                    warn!(tag = %name, instance, ?status, "template not readable");
                    format!("Template({instance:#06x})")
                }
                Err(err) => return Err(err),
            },
            None => entry
                .symbol_type
                .atomic()
                .map(|ty| ty.to_string())
                .unwrap_or_default(),
        };
        Ok(TagDescriptor {
            name,
            declared_type,
            is_alias: entry.is_alias(),
            dimensions: entry.dimensions.iter().map(|&dim| i64::from(dim)).collect(),
        })
    }

    /// Unregister the session.
    pub async fn close(self) -> Result<(), EipError> {
        self.session.close().await
    }
}

/// Controller-owned and module-defined symbols are not user tags.
fn is_user_symbol(entry: &SymbolEntry) -> bool {
    !entry.symbol_type.is_system() && !entry.name.contains(':') && !entry.name.contains("__")
}

impl From<EipError> for SourceError {
    fn from(err: EipError) -> Self {
        SourceError::new(err.to_string())
    }
}

#[async_trait]
impl TagSource for LogixController {
    async fn controller_name(&mut self) -> Result<String, SourceError> {
        Ok(self.name().await?)
    }

    async fn tag_list(&mut self) -> Result<Vec<TagDescriptor>, SourceError> {
        Ok(self.tag_descriptors().await?)
    }
}
