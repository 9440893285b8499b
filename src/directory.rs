use crate::{
    constants::{
        DIR_INVALID, DIR_ROOT, DIR_STORAGE, DIR_STREAM, NO_STREAM, SIZE_OF_DIRECTORY_ENTRY,
    },
    error::{warn_entry, Error, WarningCategory, WarningSink},
    CompoundFile, Result,
};
use chrono::NaiveDateTime;
use fixedbitset::FixedBitSet;
use std::io::Read;
use std::ops::Index;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum EntityKind {
    #[default]
    Invalid,
    Storage,
    Stream,
    Root,
}

/// One validated 128-byte directory record. Still flat: sibling and child
/// links are entry indices, resolved into an [`Entity`] tree afterwards.
#[derive(Clone, Debug)]
pub(crate) struct DirEntry {
    pub index: u32,
    pub name: String,
    pub kind: EntityKind,
    pub left_index: u32,
    pub right_index: u32,
    pub child_index: u32,
    pub clsid: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub modified: Option<NaiveDateTime>,
    pub start_sector: u32,
    pub size: u64,
}

fn read_u16(raw: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([raw[offset], raw[offset + 1]])
}

fn read_u32(raw: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([raw[offset], raw[offset + 1], raw[offset + 2], raw[offset + 3]])
}

fn read_u64(raw: &[u8], offset: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[offset..offset + 8]);
    u64::from_le_bytes(bytes)
}

fn format_clsid(bytes: &[u8; 16]) -> Option<String> {
    if bytes == &[0u8; 16] {
        return None;
    }
    let a = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
    let b = u16::from_le_bytes([bytes[4], bytes[5]]);
    let c = u16::from_le_bytes([bytes[6], bytes[7]]);
    Some(format!(
        "{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}",
        a,
        b,
        c,
        bytes[8],
        bytes[9],
        bytes[10],
        bytes[11],
        bytes[12],
        bytes[13],
        bytes[14],
        bytes[15]
    ))
}

fn decode_filetime(ticks: u64) -> Option<NaiveDateTime> {
    match ticks as i64 {
        0 => None,
        ticks => epochs::windows_file(ticks),
    }
}

impl DirEntry {
    /// Parses and validates one directory record.
    ///
    /// Every violation is a warning, never an error: the field is coerced to
    /// the value the format requires for the entry's kind, mirroring how
    /// tolerant readers treat the many writers that get these rules wrong.
    pub(crate) fn parse(
        raw: &[u8],
        index: u32,
        sector_size: usize,
        sink: &dyn WarningSink,
    ) -> Self {
        debug_assert_eq!(raw.len(), SIZE_OF_DIRECTORY_ENTRY);
        let name_len = read_u16(raw, 64);
        let kind_byte = raw[66];
        let mut left_index = read_u32(raw, 68);
        let mut right_index = read_u32(raw, 72);
        let mut child_index = read_u32(raw, 76);
        let mut clsid_bytes: [u8; 16] = raw[80..96].try_into().unwrap_or([0u8; 16]);
        let user_flags = read_u32(raw, 96);
        let mut created = read_u64(raw, 100);
        let mut modified = read_u64(raw, 108);
        let mut start_sector = read_u32(raw, 116);
        let mut size_low = read_u32(raw, 120);
        let mut size_high = read_u32(raw, 124);

        let units: Vec<u16> = raw[0..64]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        let (name, unit_count) = match units.iter().position(|&unit| unit == 0) {
            Some(nul) => (String::from_utf16_lossy(&units[..nul]), nul),
            None => {
                warn_entry(
                    sink,
                    WarningCategory::DirName,
                    index,
                    "missing NULL terminator in name",
                );
                let take = ((name_len as usize).min(64)) / 2;
                (String::from_utf16_lossy(&units[..take]), take)
            }
        };

        let kind = if index == 0 {
            if kind_byte != DIR_ROOT {
                warn_entry(
                    sink,
                    WarningCategory::DirType,
                    index,
                    format!("invalid type ({kind_byte})"),
                );
            }
            EntityKind::Root
        } else {
            match kind_byte {
                DIR_STORAGE => EntityKind::Storage,
                DIR_STREAM => EntityKind::Stream,
                DIR_INVALID => EntityKind::Invalid,
                other => {
                    warn_entry(
                        sink,
                        WarningCategory::DirType,
                        index,
                        format!("invalid type ({other})"),
                    );
                    EntityKind::Invalid
                }
            }
        };

        if kind == EntityKind::Invalid {
            if !name.is_empty() {
                warn_entry(sink, WarningCategory::DirName, index, "non-empty name");
            }
            if name_len != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirName,
                    index,
                    format!("invalid name length ({name_len})"),
                );
            }
            if user_flags != 0 {
                warn_entry(sink, WarningCategory::DirEntry, index, "non-zero user flags");
            }
        } else if (unit_count + 1) * 2 != name_len as usize {
            // The stored length is in bytes and counts the NUL terminator of
            // the UTF-16 name.
            warn_entry(
                sink,
                WarningCategory::DirName,
                index,
                format!("invalid name length ({name_len})"),
            );
        }

        if matches!(kind, EntityKind::Invalid | EntityKind::Root) {
            if left_index != NO_STREAM {
                warn_entry(
                    sink,
                    WarningCategory::DirIndex,
                    index,
                    format!("invalid left sibling ({left_index})"),
                );
                left_index = NO_STREAM;
            }
            if right_index != NO_STREAM {
                warn_entry(
                    sink,
                    WarningCategory::DirIndex,
                    index,
                    format!("invalid right sibling ({right_index})"),
                );
                right_index = NO_STREAM;
            }
        }
        if matches!(kind, EntityKind::Invalid | EntityKind::Stream) {
            if child_index != NO_STREAM {
                warn_entry(
                    sink,
                    WarningCategory::DirIndex,
                    index,
                    format!("invalid child index ({child_index})"),
                );
                child_index = NO_STREAM;
            }
            if clsid_bytes != [0u8; 16] {
                warn_entry(sink, WarningCategory::DirEntry, index, "non-zero CLSID");
                clsid_bytes = [0u8; 16];
            }
            if created != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirTime,
                    index,
                    "non-zero creation timestamp",
                );
                created = 0;
            }
            if modified != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirTime,
                    index,
                    "non-zero modification timestamp",
                );
                modified = 0;
            }
        }
        if matches!(kind, EntityKind::Invalid | EntityKind::Storage) {
            if start_sector != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirSize,
                    index,
                    format!("non-zero start sector ({start_sector})"),
                );
                start_sector = 0;
            }
            if size_low != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirSize,
                    index,
                    format!("non-zero size low-bits ({size_low})"),
                );
                size_low = 0;
            }
            if size_high != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirSize,
                    index,
                    format!("non-zero size high-bits ({size_high})"),
                );
                size_high = 0;
            }
        }
        if sector_size == 512 {
            // The format ties this rule to sector size rather than DLL
            // version; 512-byte-sector files cap streams at 2 GiB.
            if size_high != 0 {
                warn_entry(
                    sink,
                    WarningCategory::DirSize,
                    index,
                    "invalid size in small sector file",
                );
            }
            if size_low >= 1 << 31 {
                warn_entry(
                    sink,
                    WarningCategory::DirSize,
                    index,
                    "size too large for small sector file",
                );
            }
            size_high = 0;
        }

        DirEntry {
            index,
            name,
            kind,
            left_index,
            right_index,
            child_index,
            clsid: format_clsid(&clsid_bytes),
            created: decode_filetime(created),
            modified: decode_filetime(modified),
            start_sector,
            size: ((size_high as u64) << 32) | size_low as u64,
        }
    }
}

/// A storage or stream inside a compound document.
///
/// Storages behave as read-only, ordered collections of child entities:
/// iterable, indexable by ordinal or by case-insensitive name, and queryable
/// with [`contains`](Entity::contains). Streams carry a size and can be
/// opened through [`CompoundFile::open`](crate::CompoundFile::open).
#[derive(Clone, Debug, Default)]
pub struct Entity {
    pub(crate) index: u32,
    pub(crate) start_sector: u32,
    name: String,
    kind: EntityKind,
    clsid: Option<String>,
    created: Option<NaiveDateTime>,
    modified: Option<NaiveDateTime>,
    size: u64,
    children: Vec<Entity>,
}

impl Entity {
    fn from_entry(entry: &DirEntry) -> Self {
        Entity {
            index: entry.index,
            start_sector: entry.start_sector,
            name: entry.name.clone(),
            kind: entry.kind,
            clsid: entry.clsid.clone(),
            created: entry.created,
            modified: entry.modified,
            size: entry.size,
            children: Vec::new(),
        }
    }

    /// The entity's name: up to 31 UTF-16 code units, compared
    /// case-insensitively by the format.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Stream size in bytes; 0 for storages.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn clsid(&self) -> Option<&str> {
        self.clsid.as_deref()
    }

    pub fn created(&self) -> Option<NaiveDateTime> {
        self.created
    }

    pub fn modified(&self) -> Option<NaiveDateTime> {
        self.modified
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntityKind::Stream
    }

    pub fn is_dir(&self) -> bool {
        matches!(self.kind, EntityKind::Storage | EntityKind::Root)
    }

    /// Number of child entities (0 for streams).
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Entity> {
        self.children.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Entity> {
        self.children.get(index)
    }

    /// Case-insensitive lookup of a direct child by name.
    pub fn child(&self, name: &str) -> Option<&Entity> {
        let wanted = name.to_lowercase();
        self.children
            .iter()
            .find(|child| child.name.to_lowercase() == wanted)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.child(name).is_some()
    }
}

impl<'a> IntoIterator for &'a Entity {
    type Item = &'a Entity;
    type IntoIter = std::slice::Iter<'a, Entity>;

    fn into_iter(self) -> Self::IntoIter {
        self.children.iter()
    }
}

impl Index<usize> for Entity {
    type Output = Entity;

    fn index(&self, index: usize) -> &Entity {
        &self.children[index]
    }
}

impl Index<&str> for Entity {
    type Output = Entity;

    /// Panics when no child has the given name; use [`Entity::child`] for a
    /// fallible lookup.
    fn index(&self, name: &str) -> &Entity {
        self.child(name)
            .unwrap_or_else(|| panic!("no entity named {name:?}"))
    }
}

/// In-order traversal of the sibling tree rooted at `index`, appending entry
/// indices to `order`. The visited set is shared across the whole directory
/// build, so any revisit (sibling link or child link, at any level) is a
/// loop. An index outside the entry table prunes that branch with a warning.
fn collect_in_order(
    entries: &[DirEntry],
    index: u32,
    referrer: u32,
    visited: &mut FixedBitSet,
    order: &mut Vec<u32>,
    sink: &dyn WarningSink,
) -> Result<()> {
    if index as usize >= entries.len() {
        warn_entry(
            sink,
            WarningCategory::DirIndex,
            referrer,
            format!("invalid child or sibling index ({index})"),
        );
        return Ok(());
    }
    if visited.contains(index as usize) {
        return Err(Error::DirectoryLoop(index));
    }
    visited.insert(index as usize);
    let node = &entries[index as usize];
    if node.left_index != NO_STREAM {
        collect_in_order(entries, node.left_index, index, visited, order, sink)?;
    }
    order.push(index);
    if node.right_index != NO_STREAM {
        collect_in_order(entries, node.right_index, index, visited, order, sink)?;
    }
    Ok(())
}

fn build_entity(
    entries: &[DirEntry],
    index: u32,
    visited: &mut FixedBitSet,
    sink: &dyn WarningSink,
) -> Result<Entity> {
    let entry = &entries[index as usize];
    let mut entity = Entity::from_entry(entry);
    if entity.is_dir() && entry.child_index != NO_STREAM {
        let mut order = Vec::new();
        collect_in_order(entries, entry.child_index, index, visited, &mut order, sink)?;
        entity.children.reserve(order.len());
        for child in order {
            entity.children.push(build_entity(entries, child, visited, sink)?);
        }
    }
    Ok(entity)
}

/// Builds the entity tree from the flat entry table. The in-order walk of
/// each storage's sibling tree yields children in the format's
/// case-insensitive sort order; no attempt is made to verify the red-black
/// balancing, which many writers get wrong anyway.
pub(crate) fn build_tree(entries: &[DirEntry], sink: &dyn WarningSink) -> Result<Entity> {
    let mut visited = FixedBitSet::with_capacity(entries.len());
    visited.insert(0);
    build_entity(entries, 0, &mut visited, sink)
}

impl CompoundFile {
    pub(crate) fn load_directory(&mut self) -> Result<()> {
        // The directory is just another stream; its chain length bounds the
        // number of entries, which older files do not record anywhere.
        let mut stream = self.normal_stream(self.header.dir_first_sector, None)?;
        let mut data = Vec::with_capacity(stream.len() as usize);
        stream.read_to_end(&mut data)?;
        let entries: Vec<DirEntry> = data
            .chunks_exact(SIZE_OF_DIRECTORY_ENTRY)
            .enumerate()
            .map(|(index, raw)| {
                DirEntry::parse(raw, index as u32, self.header.sector_size, self.sink.as_ref())
            })
            .collect();
        if entries.is_empty() {
            return Err(Error::UnexpectedEof(
                "directory stream contains no entries".to_string(),
            ));
        }
        self.root = build_tree(&entries, self.sink.as_ref())?;
        Ok(())
    }
}
