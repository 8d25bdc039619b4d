//! CANopen object data types

use int_enum::IntEnum;

/// The standard data types a dictionary entry's payload can declare
///
/// The discriminants are the one-byte codes used by object dictionaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, IntEnum)]
#[repr(u8)]
pub enum DataType {
    /// Single byte, zero is false
    Boolean = 0x01,
    /// Signed 8-bit integer
    Integer8 = 0x02,
    /// Signed 16-bit integer
    Integer16 = 0x03,
    /// Signed 32-bit integer
    Integer32 = 0x04,
    /// Unsigned 8-bit integer
    Unsigned8 = 0x05,
    /// Unsigned 16-bit integer
    Unsigned16 = 0x06,
    /// Unsigned 32-bit integer
    Unsigned32 = 0x07,
    /// IEEE 754 single precision float
    Real32 = 0x08,
    /// Printable string
    VisibleString = 0x09,
    /// Arbitrary bytes with a declared length
    OctetString = 0x0A,
    /// UTF-16 string
    UnicodeString = 0x0B,
    /// Arbitrary application data
    Domain = 0x0F,
    /// IEEE 754 double precision float
    Real64 = 0x11,
    /// Signed 64-bit integer
    Integer64 = 0x15,
    /// Unsigned 64-bit integer
    Unsigned64 = 0x1B,
}

impl DataType {
    /// Signed integer types
    pub fn is_signed(self) -> bool {
        matches!(
            self,
            DataType::Integer8 | DataType::Integer16 | DataType::Integer32 | DataType::Integer64
        )
    }

    /// Unsigned integer types
    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            DataType::Unsigned8
                | DataType::Unsigned16
                | DataType::Unsigned32
                | DataType::Unsigned64
        )
    }

    /// Signed or unsigned integer types
    pub fn is_integer(self) -> bool {
        self.is_signed() || self.is_unsigned()
    }

    /// Floating point types
    pub fn is_float(self) -> bool {
        matches!(self, DataType::Real32 | DataType::Real64)
    }

    /// Integer or floating point types
    pub fn is_number(self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// String types
    pub fn is_string(self) -> bool {
        matches!(
            self,
            DataType::VisibleString | DataType::OctetString | DataType::UnicodeString
        )
    }

    /// Types whose payload is uninterpreted bytes (strings and domains)
    pub fn is_data(self) -> bool {
        self.is_string() || self == DataType::Domain
    }

    /// Fixed payload width in bytes, or `None` for variable-length types
    pub fn byte_size(self) -> Option<usize> {
        match self {
            DataType::Boolean | DataType::Integer8 | DataType::Unsigned8 => Some(1),
            DataType::Integer16 | DataType::Unsigned16 => Some(2),
            DataType::Integer32 | DataType::Unsigned32 | DataType::Real32 => Some(4),
            DataType::Integer64 | DataType::Unsigned64 | DataType::Real64 => Some(8),
            DataType::VisibleString
            | DataType::OctetString
            | DataType::UnicodeString
            | DataType::Domain => None,
        }
    }
}
