//! Elementary data type codes reported by Logix symbol objects.

use core::fmt;

/// Atomic (non-structured) Logix data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AtomicType {
    Bool,
    Sint,
    Int,
    Dint,
    Lint,
    Usint,
    Uint,
    Udint,
    Ulint,
    Real,
    Lreal,
    Stime,
    Date,
    TimeOfDay,
    DateAndTime,
    String,
    Byte,
    Word,
    Dword,
    Lword,
    /// Type code not known to this implementation.
    Unknown(u8),
}

impl AtomicType {
    /// Convert a raw CIP elementary type code.
    pub const fn from_code(code: u8) -> AtomicType {
        match code {
            0xC1 => AtomicType::Bool,
            0xC2 => AtomicType::Sint,
            0xC3 => AtomicType::Int,
            0xC4 => AtomicType::Dint,
            0xC5 => AtomicType::Lint,
            0xC6 => AtomicType::Usint,
            0xC7 => AtomicType::Uint,
            0xC8 => AtomicType::Udint,
            0xC9 => AtomicType::Ulint,
            0xCA => AtomicType::Real,
            0xCB => AtomicType::Lreal,
            0xCC => AtomicType::Stime,
            0xCD => AtomicType::Date,
            0xCE => AtomicType::TimeOfDay,
            0xCF => AtomicType::DateAndTime,
            0xD0 => AtomicType::String,
            0xD1 => AtomicType::Byte,
            0xD2 => AtomicType::Word,
            0xD3 => AtomicType::Dword,
            0xD4 => AtomicType::Lword,
            other => AtomicType::Unknown(other),
        }
    }

    /// Return the CIP type code.
    pub const fn code(self) -> u8 {
        match self {
            AtomicType::Bool => 0xC1,
            AtomicType::Sint => 0xC2,
            AtomicType::Int => 0xC3,
            AtomicType::Dint => 0xC4,
            AtomicType::Lint => 0xC5,
            AtomicType::Usint => 0xC6,
            AtomicType::Uint => 0xC7,
            AtomicType::Udint => 0xC8,
            AtomicType::Ulint => 0xC9,
            AtomicType::Real => 0xCA,
            AtomicType::Lreal => 0xCB,
            AtomicType::Stime => 0xCC,
            AtomicType::Date => 0xCD,
            AtomicType::TimeOfDay => 0xCE,
            AtomicType::DateAndTime => 0xCF,
            AtomicType::String => 0xD0,
            AtomicType::Byte => 0xD1,
            AtomicType::Word => 0xD2,
            AtomicType::Dword => 0xD3,
            AtomicType::Lword => 0xD4,
            AtomicType::Unknown(code) => code,
        }
    }

    /// Name as written in Studio 5000 (`DINT`, `REAL`, ...).
    pub const fn name(self) -> Option<&'static str> {
        match self {
            AtomicType::Bool => Some("BOOL"),
            AtomicType::Sint => Some("SINT"),
            AtomicType::Int => Some("INT"),
            AtomicType::Dint => Some("DINT"),
            AtomicType::Lint => Some("LINT"),
            AtomicType::Usint => Some("USINT"),
            AtomicType::Uint => Some("UINT"),
            AtomicType::Udint => Some("UDINT"),
            AtomicType::Ulint => Some("ULINT"),
            AtomicType::Real => Some("REAL"),
            AtomicType::Lreal => Some("LREAL"),
            AtomicType::Stime => Some("STIME"),
            AtomicType::Date => Some("DATE"),
            AtomicType::TimeOfDay => Some("TIME_OF_DAY"),
            AtomicType::DateAndTime => Some("DATE_AND_TIME"),
            AtomicType::String => Some("STRING"),
            AtomicType::Byte => Some("BYTE"),
            AtomicType::Word => Some("WORD"),
            AtomicType::Dword => Some("DWORD"),
            AtomicType::Lword => Some("LWORD"),
            AtomicType::Unknown(_) => None,
        }
    }
}

impl fmt::Display for AtomicType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "Unknown(0x{:02X})", self.code()),
        }
    }
}
