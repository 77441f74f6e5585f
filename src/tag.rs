//! The tag section chain (§3 "TagSection", §4.5 "Tag section"): a linked list of
//! string→string metadata blocks appendable without rewriting earlier sections.

use std::collections::HashMap;

use crate::error::Result;
use crate::io::{self, ByteOrder, Primitive, Read, Seek, SeekFrom, Write};

/// One key/value metadata block in the tag chain (§3 "TagSection").
#[derive(Debug, Clone, PartialEq)]
pub struct TagSection {
    /// Keys are unique within a single section.
    pub tags: HashMap<String, String>,
    /// Absolute offset of the next section in the chain, or 0 if this is the last.
    pub next_tag_offset: u64,
}

impl TagSection {
    /// Construct a new, not-yet-chained tag section.
    pub fn new(tags: HashMap<String, String>) -> Self {
        Self { tags, next_tag_offset: 0 }
    }

    /// Read one tag section: `u32` count · offset(next) · that many (key, value) pairs
    /// (§4.5 "Tag section").
    pub fn read(read: &mut impl Read, offset_size: u8, order: ByteOrder) -> Result<Self> {
        let count: u32 = Primitive::read(read, order)?;
        let next_tag_offset = io::read_offset(read, offset_size, order)?;

        let mut tags = HashMap::with_capacity(count as usize);
        for _ in 0..count {
            let key = io::read_friendly_string(read, order)?;
            let value = io::read_friendly_string(read, order)?;
            tags.insert(key, value);
        }

        Ok(Self { tags, next_tag_offset })
    }

    /// Write one tag section.
    pub fn write(&self, write: &mut impl Write, offset_size: u8, order: ByteOrder) -> Result<()> {
        Primitive::write(self.tags.len() as u32, write, order)?;
        io::write_offset(write, self.next_tag_offset, offset_size, order)?;

        for (key, value) in &self.tags {
            io::write_friendly_string(write, key, order)?;
            io::write_friendly_string(write, value, order)?;
        }

        Ok(())
    }
}

/// Walk the tag chain starting at `first_tag_offset`, returning every section in
/// chain (append) order. `first_tag_offset == 0` means an empty chain.
pub fn read_chain(
    stream: &mut (impl Read + Seek),
    first_tag_offset: u64,
    offset_size: u8,
    order: ByteOrder,
) -> Result<Vec<TagSection>> {
    let mut sections = Vec::new();
    let mut next = first_tag_offset;

    while next != 0 {
        stream.seek(SeekFrom::Start(next))?;
        let section = TagSection::read(stream, offset_size, order)?;
        next = section.next_tag_offset;
        sections.push(section);
    }

    Ok(sections)
}

/// Merge every section of a chain (oldest first) into one map, so a later section's
/// value for a shared key overwrites an earlier one — "newest section wins"
/// (§4.12 "Duplicate tag key precedence", resolved).
pub fn merge_chain(sections: &[TagSection]) -> HashMap<String, String> {
    let mut merged = HashMap::new();
    for section in sections {
        for (key, value) in &section.tags {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}
