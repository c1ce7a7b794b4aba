// ============================================
// File: crates/rscp-core/src/protocol/vocabulary.rs
// ============================================
//! # Tag Vocabulary
//!
//! ## Creation Reason
//! The codec itself knows nothing about individual tags. Names and expected
//! types live in an immutable lookup table supplied at construction and
//! shared by `Arc` between the codec, the transports and the session.
//!
//! ## Main Functionality
//! - `TagVocabulary`: id ↔ name ↔ expected type table
//! - `TagVocabulary::builtin()`: the subset the engine itself speaks
//! - `TagVocabulary::from_json()`: load a full table generated offline
//! - `tags`: constants for every built-in tag id
//!
//! ## JSON Format
//! ```json
//! [
//!   { "name": "EMS_REQ_POWER_PV", "id": "0x01000001", "type": "None" },
//!   { "name": "EMS_POWER_PV",     "id": 25165825,     "type": "Int32" }
//! ]
//! ```
//!
//! ## ⚠️ Important Note for Next Developer
//! - The built-in ids mirror the vendor table; regenerate, never hand-edit
//!   a full table
//! - Loaded tables are merged over the built-in subset so the engine's own
//!   tags always resolve
//!
//! ## Last Modified
//! v0.1.0 - Initial vocabulary

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;

use rscp_common::TagId;

use crate::error::{CoreError, Result};
use crate::protocol::value::{TagPayload, TagValue, TypeTag};

// ============================================
// Built-in Table
// ============================================

macro_rules! builtin_tags {
    ($($name:ident = $id:literal : $ty:ident,)*) => {
        /// Ids of the tags in the built-in vocabulary.
        #[allow(missing_docs)]
        pub mod tags {
            use rscp_common::TagId;
            $(pub const $name: TagId = TagId($id);)*
        }

        const BUILTIN: &[(u32, &str, TypeTag)] = &[$(($id, stringify!($name), TypeTag::$ty),)*];
    };
}

builtin_tags! {
    // Authentication
    RSCP_REQ_AUTHENTICATION = 0x0000_0001: Container,
    RSCP_AUTHENTICATION_USER = 0x0000_0002: CString,
    RSCP_AUTHENTICATION_PASSWORD = 0x0000_0003: CString,
    RSCP_REQ_SET_ENCRYPTION_PASSPHRASE = 0x0000_0004: CString,
    RSCP_AUTHENTICATION = 0x0080_0001: UChar8,
    RSCP_SET_ENCRYPTION_PASSPHRASE = 0x0080_0004: Bool,
    RSCP_GENERAL_ERROR = 0x00FF_FFFF: Error,

    // Energy management
    EMS_REQ_POWER_PV = 0x0100_0001: None,
    EMS_REQ_POWER_BAT = 0x0100_0002: None,
    EMS_REQ_POWER_HOME = 0x0100_0003: None,
    EMS_REQ_POWER_GRID = 0x0100_0004: None,
    EMS_REQ_POWER_ADD = 0x0100_0005: None,
    EMS_REQ_AUTARKY = 0x0100_0006: None,
    EMS_REQ_SELF_CONSUMPTION = 0x0100_0007: None,
    EMS_REQ_BAT_SOC = 0x0100_0008: None,
    EMS_POWER_PV = 0x0180_0001: Int32,
    EMS_POWER_BAT = 0x0180_0002: Int32,
    EMS_POWER_HOME = 0x0180_0003: Int32,
    EMS_POWER_GRID = 0x0180_0004: Int32,
    EMS_POWER_ADD = 0x0180_0005: Int32,
    EMS_AUTARKY = 0x0180_0006: Float32,
    EMS_SELF_CONSUMPTION = 0x0180_0007: Float32,
    EMS_BAT_SOC = 0x0180_0008: UChar8,

    // Device information
    INFO_REQ_SERIAL_NUMBER = 0x0A00_0001: None,
    INFO_REQ_PRODUCTION_DATE = 0x0A00_0002: None,
    INFO_REQ_MAC_ADDRESS = 0x0A00_0003: None,
    INFO_REQ_IP_ADDRESS = 0x0A00_0004: None,
    INFO_REQ_SUBNET_MASK = 0x0A00_0005: None,
    INFO_REQ_GATEWAY = 0x0A00_0006: None,
    INFO_REQ_DNS = 0x0A00_0007: None,
    INFO_REQ_DHCP_STATUS = 0x0A00_0008: None,
    INFO_REQ_TIME = 0x0A00_0009: None,
    INFO_REQ_UTC_TIME = 0x0A00_000A: None,
    INFO_REQ_TIME_ZONE = 0x0A00_000B: None,
    INFO_REQ_INFO = 0x0A00_000C: None,
    INFO_REQ_SW_RELEASE = 0x0A00_000D: None,
    INFO_REQ_A35_SERIAL_NUMBER = 0x0A00_000E: None,
    INFO_SERIAL_NUMBER = 0x0A80_0001: CString,
    INFO_PRODUCTION_DATE = 0x0A80_0002: CString,
    INFO_MAC_ADDRESS = 0x0A80_0003: CString,
    INFO_IP_ADDRESS = 0x0A80_0004: CString,
    INFO_SUBNET_MASK = 0x0A80_0005: CString,
    INFO_GATEWAY = 0x0A80_0006: CString,
    INFO_DNS = 0x0A80_0007: CString,
    INFO_DHCP_STATUS = 0x0A80_0008: Bool,
    INFO_TIME = 0x0A80_0009: Timestamp,
    INFO_UTC_TIME = 0x0A80_000A: Timestamp,
    INFO_TIME_ZONE = 0x0A80_000B: CString,
    INFO_INFO = 0x0A80_000C: Container,
    INFO_SW_RELEASE = 0x0A80_000D: CString,
    INFO_A35_SERIAL_NUMBER = 0x0A80_000E: CString,

    // Portal relay
    SERVER_REGISTER_CONNECTION = 0xF800_0001: Container,
    SERVER_UNREGISTER_CONNECTION = 0xF800_0002: Container,
    SERVER_REQ_RSCP_CMD = 0xF800_0003: Container,
    SERVER_REQ_PING = 0xF800_0004: None,
    SERVER_REQ_NEW_VIRTUAL_CONNECTION = 0xF800_0005: Container,
    SERVER_CONNECTION_ID = 0xF800_0006: Int64,
    SERVER_AUTH_LEVEL = 0xF800_0007: UChar8,
    SERVER_STATUS = 0xF800_0008: Int32,
    SERVER_RSCP_DATA_LEN = 0xF800_0009: Int32,
    SERVER_RSCP_DATA = 0xF800_000A: ByteArray,
    SERVER_TYPE = 0xF800_000B: Int32,
    SERVER_HASH_CODE = 0xF800_000C: Int32,
    SERVER_USER = 0xF800_000D: CString,
    SERVER_PASSWD = 0xF800_000E: CString,
    SERVER_IDENTIFIER = 0xF800_000F: CString,
    SERVER_CONNECTION_REGISTERED = 0xF880_0001: Container,
    SERVER_RSCP_CMD_RESULT = 0xF880_0003: Container,
    SERVER_PING = 0xF880_0004: None,
}

// ============================================
// TagEntry
// ============================================

/// One row of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagEntry {
    /// Tag id.
    pub id: TagId,
    /// Symbolic name.
    pub name: String,
    /// Type the device uses for this tag.
    pub data_type: TypeTag,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u32),
    Text(String),
}

impl RawId {
    fn resolve(self) -> Result<TagId> {
        match self {
            Self::Number(raw) => Ok(TagId(raw)),
            Self::Text(text) => {
                let trimmed = text.trim();
                let parsed = match trimmed
                    .strip_prefix("0x")
                    .or_else(|| trimmed.strip_prefix("0X"))
                {
                    Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
                    None => trimmed.parse(),
                };
                parsed
                    .map(TagId)
                    .map_err(|e| CoreError::vocabulary(format!("bad tag id '{text}': {e}")))
            }
        }
    }
}

#[derive(Deserialize)]
struct RawEntry {
    name: String,
    id: RawId,
    #[serde(rename = "type")]
    data_type: TypeTag,
}

// ============================================
// TagVocabulary
// ============================================

/// Immutable tag lookup table.
///
/// # Example
/// ```
/// use rscp_core::protocol::vocabulary::{tags, TagVocabulary};
/// use rscp_core::protocol::TypeTag;
///
/// let vocab = TagVocabulary::builtin();
/// assert_eq!(vocab.id_of("EMS_POWER_PV"), Some(tags::EMS_POWER_PV));
/// assert_eq!(vocab.expected_type(tags::EMS_POWER_PV), Some(TypeTag::Int32));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TagVocabulary {
    by_id: HashMap<TagId, TagEntry>,
    by_name: HashMap<String, TagId>,
}

impl TagVocabulary {
    /// Returns the subset of tags the engine itself uses.
    #[must_use]
    pub fn builtin() -> Self {
        Self::from_entries(BUILTIN.iter().map(|&(id, name, data_type)| TagEntry {
            id: TagId(id),
            name: name.to_string(),
            data_type,
        }))
    }

    /// Shared handle to the built-in vocabulary.
    #[must_use]
    pub fn shared_builtin() -> Arc<Self> {
        Arc::new(Self::builtin())
    }

    /// Builds a vocabulary from entries. Later entries override earlier ones.
    pub fn from_entries(entries: impl IntoIterator<Item = TagEntry>) -> Self {
        let mut vocab = Self::default();
        for entry in entries {
            vocab.insert(entry);
        }
        vocab
    }

    /// Parses a JSON table and merges it over the built-in subset.
    ///
    /// # Errors
    /// Returns `InvalidVocabulary` on malformed JSON, unparsable ids or
    /// duplicate names mapping to different ids.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: Vec<RawEntry> =
            serde_json::from_str(json).map_err(|e| CoreError::vocabulary(e.to_string()))?;

        let mut vocab = Self::builtin();
        let mut seen: HashMap<String, TagId> = HashMap::with_capacity(raw.len());
        for entry in raw {
            let id = entry.id.resolve()?;
            if let Some(previous) = seen.insert(entry.name.clone(), id) {
                if previous != id {
                    return Err(CoreError::vocabulary(format!(
                        "name '{}' maps to both {previous} and {id}",
                        entry.name
                    )));
                }
            }
            vocab.insert(TagEntry {
                id,
                name: entry.name,
                data_type: entry.data_type,
            });
        }
        Ok(vocab)
    }

    fn insert(&mut self, entry: TagEntry) {
        if let Some(old) = self.by_id.get(&entry.id) {
            self.by_name.remove(&old.name);
        }
        self.by_name.insert(entry.name.clone(), entry.id);
        self.by_id.insert(entry.id, entry);
    }

    /// Looks up an entry by id.
    #[must_use]
    pub fn get(&self, id: TagId) -> Option<&TagEntry> {
        self.by_id.get(&id)
    }

    /// Looks up an id by name.
    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<TagId> {
        self.by_name.get(name).copied()
    }

    /// Looks up a name by id.
    #[must_use]
    pub fn name_of(&self, id: TagId) -> Option<&str> {
        self.by_id.get(&id).map(|entry| entry.name.as_str())
    }

    /// Returns the expected type for a tag.
    #[must_use]
    pub fn expected_type(&self, id: TagId) -> Option<TypeTag> {
        self.by_id.get(&id).map(|entry| entry.data_type)
    }

    /// Resolves a name to an id.
    ///
    /// # Errors
    /// Returns `UnknownTagName` if the name is not in the table.
    pub fn resolve(&self, name: &str) -> Result<TagId> {
        self.id_of(name)
            .ok_or_else(|| CoreError::UnknownTagName(name.to_string()))
    }

    /// Builds a value by tag name, checking the payload type against the
    /// table. `None` payloads are accepted for any tag (request form).
    ///
    /// # Errors
    /// Returns `UnknownTagName` or `MalformedTag` on a type mismatch.
    pub fn value(&self, name: &str, payload: TagPayload) -> Result<TagValue> {
        let id = self.resolve(name)?;
        let actual = payload.type_tag();
        if let Some(expected) = self.expected_type(id) {
            if actual != TypeTag::None && actual != expected {
                return Err(CoreError::malformed(format!(
                    "{name} expects {expected}, got {actual}"
                )));
            }
        }
        Ok(TagValue::new(id, payload))
    }

    /// Renders a tag id with its name if known.
    #[must_use]
    pub fn label(&self, id: TagId) -> String {
        self.name_of(id)
            .map_or_else(|| id.to_string(), ToString::to_string)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns `true` if the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

// ============================================
// Tests
// ============================================
