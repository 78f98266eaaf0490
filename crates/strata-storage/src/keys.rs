//! Key encoding for the persistent store
//!
//! Keys are byte strings whose lexicographic order matches the order the
//! store scans them in: revisions of one GUID sort by valid time, index
//! entries group under their owning name or GUID.

use strata_core::Guid;

/// Prefix bytes for different key types
pub mod prefix {
    pub const REVISION: u8 = 0x01;
    pub const LATEST: u8 = 0x02;
    pub const ADJACENCY: u8 = 0x03;
    pub const TYPE_INDEX: u8 = 0x04;
    pub const META: u8 = 0x05;
}

/// Key builder for storage operations
#[derive(Debug)]
pub struct KeyBuilder {
    buffer: Vec<u8>,
}

impl KeyBuilder {
    /// Create a new key builder with estimated capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Key of one revision: GUID then valid time
    pub fn revision(guid: &Guid, valid_time_micros: i64) -> Vec<u8> {
        let mut builder = Self::new(11 + guid.as_str().len());
        builder.push_u8(prefix::REVISION);
        builder.push_string(guid.as_str());
        builder.push_time(valid_time_micros);
        builder.finish()
    }

    /// Prefix for scanning every revision of a GUID
    pub fn revision_prefix(guid: &Guid) -> Vec<u8> {
        let mut builder = Self::new(3 + guid.as_str().len());
        builder.push_u8(prefix::REVISION);
        builder.push_string(guid.as_str());
        builder.finish()
    }

    /// Key of the current revision of a GUID
    pub fn latest(guid: &Guid) -> Vec<u8> {
        let mut builder = Self::new(3 + guid.as_str().len());
        builder.push_u8(prefix::LATEST);
        builder.push_string(guid.as_str());
        builder.finish()
    }

    /// Adjacency entry: entity GUID then relationship GUID
    pub fn adjacency(entity: &Guid, relationship: &Guid) -> Vec<u8> {
        let mut builder = Self::new(5 + entity.as_str().len() + relationship.as_str().len());
        builder.push_u8(prefix::ADJACENCY);
        builder.push_string(entity.as_str());
        builder.push_string(relationship.as_str());
        builder.finish()
    }

    /// Prefix for scanning every relationship that referenced an entity
    pub fn adjacency_prefix(entity: &Guid) -> Vec<u8> {
        let mut builder = Self::new(3 + entity.as_str().len());
        builder.push_u8(prefix::ADJACENCY);
        builder.push_string(entity.as_str());
        builder.finish()
    }

    /// Type index entry: type name then GUID
    pub fn type_index(type_name: &str, guid: &Guid) -> Vec<u8> {
        let mut builder = Self::new(5 + type_name.len() + guid.as_str().len());
        builder.push_u8(prefix::TYPE_INDEX);
        builder.push_string(type_name);
        builder.push_string(guid.as_str());
        builder.finish()
    }

    /// Prefix for scanning every GUID filed under a type name
    pub fn type_index_prefix(type_name: &str) -> Vec<u8> {
        let mut builder = Self::new(3 + type_name.len());
        builder.push_u8(prefix::TYPE_INDEX);
        builder.push_string(type_name);
        builder.finish()
    }

    /// Create a metadata key
    pub fn meta(key: &str) -> Vec<u8> {
        let mut builder = Self::new(3 + key.len());
        builder.push_u8(prefix::META);
        builder.push_string(key);
        builder.finish()
    }

    // Builder methods

    fn push_u8(&mut self, val: u8) {
        self.buffer.push(val);
    }

    fn push_time(&mut self, micros: i64) {
        // Flip the sign bit so negative times sort before positive ones
        let ordered = (micros as u64) ^ (1 << 63);
        self.buffer.extend_from_slice(&ordered.to_be_bytes());
    }

    fn push_string(&mut self, s: &str) {
        // Length-prefixed string
        let bytes = s.as_bytes();
        self.buffer
            .extend_from_slice(&(bytes.len() as u16).to_be_bytes());
        self.buffer.extend_from_slice(bytes);
    }

    fn finish(self) -> Vec<u8> {
        self.buffer
    }
}

/// Key decoder for parsing stored keys
pub struct KeyDecoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> KeyDecoder<'a> {
    /// Create a new decoder
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Read a u8
    pub fn read_u8(&mut self) -> Option<u8> {
        let val = *self.data.get(self.pos)?;
        self.pos += 1;
        Some(val)
    }

    /// Read a valid time written by `push_time`
    pub fn read_time(&mut self) -> Option<i64> {
        let bytes: [u8; 8] = self.data.get(self.pos..self.pos + 8)?.try_into().ok()?;
        self.pos += 8;
        Some((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64)
    }

    /// Read a length-prefixed string
    pub fn read_string(&mut self) -> Option<&'a str> {
        let len_bytes: [u8; 2] = self.data.get(self.pos..self.pos + 2)?.try_into().ok()?;
        let len = u16::from_be_bytes(len_bytes) as usize;
        let s = std::str::from_utf8(self.data.get(self.pos + 2..self.pos + 2 + len)?).ok()?;
        self.pos += 2 + len;
        Some(s)
    }

    /// Read a length-prefixed GUID
    pub fn read_guid(&mut self) -> Option<Guid> {
        self.read_string().map(Guid::from)
    }

    /// Get remaining bytes
    pub fn remaining(&self) -> &'a [u8] {
        &self.data[self.pos.min(self.data.len())..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_key() {
        let guid = Guid::from("e1");
        let key = KeyBuilder::revision(&guid, 1_700_000_000_000_000);

        assert_eq!(key[0], prefix::REVISION);
        let mut decoder = KeyDecoder::new(&key);
        assert_eq!(decoder.read_u8(), Some(prefix::REVISION));
        assert_eq!(decoder.read_guid(), Some(guid));
        assert_eq!(decoder.read_time(), Some(1_700_000_000_000_000));
        assert!(decoder.remaining().is_empty());
    }

    #[test]
    fn test_revision_keys_sort_by_time() {
        let guid = Guid::from("e1");
        let early = KeyBuilder::revision(&guid, -5);
        let middle = KeyBuilder::revision(&guid, 10);
        let late = KeyBuilder::revision(&guid, 1_000);
        assert!(early < middle);
        assert!(middle < late);
    }

    #[test]
    fn test_guid_prefix_does_not_cover_longer_guid() {
        let prefix = KeyBuilder::revision_prefix(&Guid::from("a"));
        let other = KeyBuilder::revision(&Guid::from("ab"), 1);
        let own = KeyBuilder::revision(&Guid::from("a"), 1);
        assert!(!other.starts_with(&prefix));
        assert!(own.starts_with(&prefix));
    }

    #[test]
    fn test_adjacency_key() {
        let key = KeyBuilder::adjacency(&Guid::from("e1"), &Guid::from("r9"));
        assert!(key.starts_with(&KeyBuilder::adjacency_prefix(&Guid::from("e1"))));

        let mut decoder = KeyDecoder::new(&key);
        assert_eq!(decoder.read_u8(), Some(prefix::ADJACENCY));
        assert_eq!(decoder.read_string(), Some("e1"));
        assert_eq!(decoder.read_string(), Some("r9"));
    }

    #[test]
    fn test_type_index_key() {
        let key = KeyBuilder::type_index("Table", &Guid::from("e1"));
        assert!(key.starts_with(&KeyBuilder::type_index_prefix("Table")));
        assert!(!key.starts_with(&KeyBuilder::type_index_prefix("Tab")));
    }

    #[test]
    fn test_truncated_key_decodes_to_none() {
        let key = KeyBuilder::revision(&Guid::from("e1"), 7);
        let mut decoder = KeyDecoder::new(&key[..key.len() - 3]);
        decoder.read_u8();
        decoder.read_string();
        assert_eq!(decoder.read_time(), None);
    }
}
