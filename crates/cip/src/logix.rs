//! Logix controller objects: symbol (tag) listing, templates and controller name.

use bitflags::bitflags;
use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{AtomicType, CipError, EPath, MessageRequest, Service};

/// Logix specific object classes.
pub mod class {
    /// Controller program name object.
    pub const PROGRAM_NAME: u16 = 0x64;
    /// Symbol (tag) object.
    pub const SYMBOL: u16 = 0x6B;
    /// Structure template object.
    pub const TEMPLATE: u16 = 0x6C;
}

/// Symbol attributes requested per instance: name, type, address, object
/// address, software control, dimensions.
pub const SYMBOL_ATTRIBUTES: [u16; 6] = [1, 2, 3, 5, 6, 8];
/// Software-control bit set on base tags; alias tags leave it clear.
pub const BASE_TAG_BIT: u32 = 1 << 26;
/// Bytes of the template definition that are not returned by a template read.
pub const TEMPLATE_READ_OVERHEAD: u32 = 23;
/// Size of one member descriptor at the start of a template definition.
pub const TEMPLATE_MEMBER_SIZE: usize = 8;

bitflags! {
    /// Flag bits of the symbol type word.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SymbolFlags: u16 {
        /// The symbol is a structure; the low 12 bits hold its template instance.
        const STRUCT = 0x8000;
        /// Controller-owned system symbol.
        const SYSTEM = 0x1000;
    }
}

/// Raw symbol type word as reported by attribute 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SymbolType(pub u16);

impl SymbolType {
    pub fn flags(self) -> SymbolFlags {
        SymbolFlags::from_bits_truncate(self.0)
    }

    pub fn is_struct(self) -> bool {
        self.flags().contains(SymbolFlags::STRUCT)
    }

    pub fn is_system(self) -> bool {
        self.flags().contains(SymbolFlags::SYSTEM)
    }

    /// Number of array dimensions (0 to 3).
    pub const fn dimension_count(self) -> u8 {
        ((self.0 >> 13) & 0x3) as u8
    }

    /// Template instance for structured symbols.
    pub fn template_instance(self) -> Option<u16> {
        self.is_struct().then_some(self.0 & 0x0FFF)
    }

    /// Elementary type for non-structured symbols.
    pub fn atomic(self) -> Option<AtomicType> {
        (!self.is_struct()).then_some(AtomicType::from_code((self.0 & 0x00FF) as u8))
    }
}

/// One symbol instance returned by Get_Instance_Attribute_List.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolEntry {
    pub instance: u32,
    pub name: String,
    pub symbol_type: SymbolType,
    pub address: u32,
    pub object_address: u32,
    pub software_control: u32,
    /// Array sizes per dimension slot; unused slots are zero.
    pub dimensions: [u32; 3],
}

impl SymbolEntry {
    pub fn is_alias(&self) -> bool {
        self.software_control & BASE_TAG_BIT == 0
    }

    /// Program scope name when the symbol is a `Program:<name>` entry.
    pub fn program_scope(&self) -> Option<&str> {
        self.name
            .starts_with("Program:")
            .then_some(self.name.as_str())
    }
}

/// Request a page of symbols starting at `start_instance`.
///
/// `scope` restricts the listing to a program (`Program:Main`).
pub fn symbol_list_request(
    scope: Option<&str>,
    start_instance: u32,
) -> Result<MessageRequest, CipError> {
    let mut path = EPath::new();
    if let Some(scope) = scope {
        path = path.symbol(scope)?;
    }
    let path = path.class(class::SYMBOL).instance(start_instance);
    let mut data = BytesMut::with_capacity(2 + SYMBOL_ATTRIBUTES.len() * 2);
    data.put_u16_le(SYMBOL_ATTRIBUTES.len() as u16);
    for attribute in SYMBOL_ATTRIBUTES {
        data.put_u16_le(attribute);
    }
    Ok(MessageRequest::new(
        Service::GetInstanceAttributeList,
        path,
        data.freeze(),
    ))
}

/// Parse the reply data of [`symbol_list_request`].
pub fn parse_symbol_entries(data: &[u8]) -> Result<Vec<SymbolEntry>, CipError> {
    let mut cursor = data;
    let mut entries = Vec::new();
    while cursor.has_remaining() {
        if cursor.remaining() < 6 {
            return Err(CipError::InvalidPacket("symbol entry truncated"));
        }
        let instance = cursor.get_u32_le();
        let name_len = cursor.get_u16_le() as usize;
        if cursor.remaining() < name_len + 26 {
            return Err(CipError::InvalidPacket("symbol entry truncated"));
        }
        let name = String::from_utf8_lossy(&cursor[..name_len]).into_owned();
        cursor.advance(name_len);
        let symbol_type = SymbolType(cursor.get_u16_le());
        let address = cursor.get_u32_le();
        let object_address = cursor.get_u32_le();
        let software_control = cursor.get_u32_le();
        let dimensions = [
            cursor.get_u32_le(),
            cursor.get_u32_le(),
            cursor.get_u32_le(),
        ];
        entries.push(SymbolEntry {
            instance,
            name,
            symbol_type,
            address,
            object_address,
            software_control,
            dimensions,
        });
    }
    Ok(entries)
}

/// Read the controller (project) name.
pub fn program_name_request() -> MessageRequest {
    MessageRequest::new(
        Service::GetAttributesAll,
        EPath::new().class(class::PROGRAM_NAME).instance(1),
        Bytes::new(),
    )
}

/// Parse the UINT length-prefixed name returned by [`program_name_request`].
pub fn parse_program_name(data: &[u8]) -> Result<String, CipError> {
    let mut cursor = data;
    if cursor.remaining() < 2 {
        return Err(CipError::InvalidPacket("controller name truncated"));
    }
    let len = cursor.get_u16_le() as usize;
    if cursor.remaining() < len {
        return Err(CipError::InvalidPacket("controller name truncated"));
    }
    Ok(String::from_utf8_lossy(&cursor[..len]).into_owned())
}

/// Template attributes needed to read a structure definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplateAttributes {
    pub handle: u16,
    pub member_count: u16,
    /// Definition size in 32-bit words.
    pub definition_words: u32,
    /// Size of one structure instance in bytes.
    pub structure_size: u32,
}

impl TemplateAttributes {
    /// Number of definition bytes a template read returns.
    pub fn definition_len(&self) -> u32 {
        (self.definition_words.saturating_mul(4)).saturating_sub(TEMPLATE_READ_OVERHEAD)
    }
}

/// Get_Attribute_List for template attributes 4, 5, 2 and 1.
pub fn template_attributes_request(instance: u16) -> MessageRequest {
    let mut data = BytesMut::with_capacity(10);
    data.put_u16_le(4);
    for attribute in [4u16, 5, 2, 1] {
        data.put_u16_le(attribute);
    }
    MessageRequest::new(
        Service::GetAttributeList,
        EPath::new().class(class::TEMPLATE).instance(instance.into()),
        data.freeze(),
    )
}

/// Parse the reply data of [`template_attributes_request`].
pub fn parse_template_attributes(data: &[u8]) -> Result<TemplateAttributes, CipError> {
    let mut cursor = data;
    if cursor.remaining() < 2 {
        return Err(CipError::InvalidPacket("template attributes truncated"));
    }
    let count = cursor.get_u16_le();
    let mut handle = None;
    let mut member_count = None;
    let mut definition_words = None;
    let mut structure_size = None;
    for _ in 0..count {
        if cursor.remaining() < 4 {
            return Err(CipError::InvalidPacket("template attributes truncated"));
        }
        let id = cursor.get_u16_le();
        let status = cursor.get_u16_le();
        if status != 0 {
            return Err(CipError::InvalidPacket("template attribute unavailable"));
        }
        let width = match id {
            1 | 2 => 2,
            4 | 5 => 4,
            _ => return Err(CipError::InvalidPacket("unexpected template attribute")),
        };
        if cursor.remaining() < width {
            return Err(CipError::InvalidPacket("template attributes truncated"));
        }
        match id {
            1 => handle = Some(cursor.get_u16_le()),
            2 => member_count = Some(cursor.get_u16_le()),
            4 => definition_words = Some(cursor.get_u32_le()),
            _ => structure_size = Some(cursor.get_u32_le()),
        }
    }
    match (handle, member_count, definition_words, structure_size) {
        (Some(handle), Some(member_count), Some(definition_words), Some(structure_size)) => {
            Ok(TemplateAttributes {
                handle,
                member_count,
                definition_words,
                structure_size,
            })
        }
        _ => Err(CipError::InvalidPacket("template attributes incomplete")),
    }
}

/// Read `len` definition bytes of template `instance` starting at `offset`.
pub fn read_template_request(instance: u16, offset: u32, len: u16) -> MessageRequest {
    let mut data = BytesMut::with_capacity(6);
    data.put_u32_le(offset);
    data.put_u16_le(len);
    MessageRequest::new(
        Service::ReadTemplate,
        EPath::new().class(class::TEMPLATE).instance(instance.into()),
        data.freeze(),
    )
}

/// Extract the structure name from a template definition.
///
/// The definition starts with one 8 byte descriptor per member followed by
/// NUL-terminated strings. The structure name is the first string holding a
/// `;`, cut at that `;`; the strings without one are member names.
pub fn template_name(definition: &[u8], member_count: u16) -> Result<String, CipError> {
    let members_len = member_count as usize * TEMPLATE_MEMBER_SIZE;
    let strings = definition
        .get(members_len..)
        .ok_or(CipError::InvalidPacket("template definition truncated"))?;
    strings
        .split(|&b| b == 0)
        .map(String::from_utf8_lossy)
        .find_map(|raw| {
            let (name, _) = raw.split_once(';')?;
            let name = name.trim();
            (!name.is_empty()).then(|| name.to_string())
        })
        .ok_or(CipError::InvalidPacket("template has no name"))
}
