//! Name-addressed object dictionary glue
//!
//! The dictionary itself is an in-memory structure built by the application
//! (or an EDS loader layered on top); the client only consumes it to resolve
//! names into `(index, sub_index, type)` triples and to decode payloads.

use std::collections::HashMap;
use std::fmt;

use canhost_common::{traits::AsyncCanSender, DataType};
use snafu::ensure;

use crate::error::{ProtocolSnafu, Result};
use crate::sdo_client::SdoClient;

/// A single object-dictionary entry
#[derive(Clone, Debug, PartialEq)]
pub struct ObjectEntry {
    /// Human-readable entry name
    pub name: String,
    /// 16-bit object index
    pub index: u16,
    /// 8-bit sub-index
    pub sub_index: u8,
    /// Declared payload type
    pub data_type: DataType,
}

/// An in-memory object dictionary addressed by entry name
#[derive(Clone, Debug, Default)]
pub struct ObjectDictionary {
    entries: HashMap<String, ObjectEntry>,
}

impl ObjectDictionary {
    /// Create an empty dictionary
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, replacing any existing entry with the same name
    pub fn insert(&mut self, entry: ObjectEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    /// Look up an entry by name
    pub fn find_name(&self, name: &str) -> Option<&ObjectEntry> {
        self.entries.get(name)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the dictionary holds no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A decoded object value
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// BOOLEAN
    Boolean(bool),
    /// INTEGER8 through INTEGER64, sign extended
    Integer(i64),
    /// UNSIGNED8 through UNSIGNED64
    Unsigned(u64),
    /// REAL32 / REAL64
    Float(f64),
    /// VISIBLE_STRING / UNICODE_STRING, decoded lossily as UTF-8
    String(String),
    /// OCTET_STRING / DOMAIN raw bytes
    Data(Vec<u8>),
}

/// A dictionary entry wired to a node's SDO client
///
/// Obtained from [`Node::find_name`](crate::Node::find_name); reads and
/// writes go through the owning node's SDO server.
pub struct ObjectRef<S> {
    entry: ObjectEntry,
    client: SdoClient<S>,
}

impl<S: AsyncCanSender> ObjectRef<S> {
    pub(crate) fn new(entry: ObjectEntry, client: SdoClient<S>) -> Self {
        Self { entry, client }
    }

    /// The dictionary entry this handle refers to
    pub fn entry(&self) -> &ObjectEntry {
        &self.entry
    }

    /// Read the raw payload bytes
    pub async fn read_raw(&self) -> Result<Vec<u8>> {
        self.client.read(self.entry.index, self.entry.sub_index).await
    }

    /// Write raw payload bytes
    pub async fn write_raw(&self, data: &[u8], force_segment: bool) -> Result<()> {
        self.client
            .write(self.entry.index, self.entry.sub_index, force_segment, data)
            .await
    }

    /// Read the entry and decode it according to its declared type
    ///
    /// Fixed-width types whose payload length does not match the declaration
    /// fail with [`Protocol`](crate::ClientError::Protocol).
    pub async fn read_value(&self) -> Result<Value> {
        let data = self.read_raw().await?;
        decode_value(self.entry.data_type, &data)
    }
}

impl<S> fmt::Debug for ObjectRef<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("entry", &self.entry)
            .finish_non_exhaustive()
    }
}

fn decode_value(data_type: DataType, data: &[u8]) -> Result<Value> {
    if let Some(width) = data_type.byte_size() {
        ensure!(data.len() == width, ProtocolSnafu);
    }

    if data_type == DataType::Boolean {
        return Ok(Value::Boolean(data[0] != 0));
    }
    if data_type.is_signed() {
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        let raw = i64::from_le_bytes(buf);
        // sign-extend from the declared width
        let shift = 64 - data.len() * 8;
        return Ok(Value::Integer(raw << shift >> shift));
    }
    if data_type.is_unsigned() {
        let mut buf = [0u8; 8];
        buf[..data.len()].copy_from_slice(data);
        return Ok(Value::Unsigned(u64::from_le_bytes(buf)));
    }
    if data_type.is_float() {
        let value = match data.len() {
            4 => f32::from_le_bytes([data[0], data[1], data[2], data[3]]) as f64,
            _ => f64::from_le_bytes([
                data[0], data[1], data[2], data[3], data[4], data[5], data[6], data[7],
            ]),
        };
        return Ok(Value::Float(value));
    }
    if matches!(data_type, DataType::VisibleString | DataType::UnicodeString) {
        return Ok(Value::String(String::from_utf8_lossy(data).into_owned()));
    }
    Ok(Value::Data(data.to_vec()))
}
