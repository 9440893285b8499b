//! Synthetic containers for the test suites. Everything is built in memory
//! so no binary fixtures need to live in the repository; layouts are fixed
//! and documented so tests can corrupt specific bytes.

use crate::constants::{
    END_OF_CHAIN, FREE_SECTOR, MAGIC_BYTES, NORMAL_FAT_SECTOR, NO_STREAM,
};

pub(crate) const SECTOR: usize = 512;

/// FILETIME ticks for 2004-01-01T00:00:00 UTC.
pub(crate) const TICKS_2004: u64 = 127_173_888_000_000_000;

pub(crate) const TABLE_SIZE: usize = 8375;

pub(crate) fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

pub(crate) fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

/// Byte offset of a 512-byte sector in a v3 image.
pub(crate) fn sector_offset(sector: u32) -> usize {
    SECTOR + sector as usize * SECTOR
}

pub(crate) struct HeaderSpec {
    pub major: u16,
    pub sector_shift: u16,
    pub dir_sector_count: u32,
    pub fat_sector_count: u32,
    pub dir_first: u32,
    pub mini_first: u32,
    pub mini_count: u32,
    pub master_first: u32,
    pub master_count: u32,
    /// Inline master-FAT entries; padded with FREE_SECTOR to 109.
    pub difat: Vec<u32>,
}

pub(crate) fn build_header(spec: &HeaderSpec) -> [u8; 512] {
    let mut header = [0u8; 512];
    header[0..8].copy_from_slice(&MAGIC_BYTES);
    put_u16(&mut header, 24, 0x3E); // minor version
    put_u16(&mut header, 26, spec.major);
    put_u16(&mut header, 28, 0xFFFE); // byte order mark
    put_u16(&mut header, 30, spec.sector_shift);
    put_u16(&mut header, 32, 6); // 64-byte mini sectors
    put_u32(&mut header, 40, spec.dir_sector_count);
    put_u32(&mut header, 44, spec.fat_sector_count);
    put_u32(&mut header, 48, spec.dir_first);
    put_u32(&mut header, 56, 4096); // mini stream size cutoff
    put_u32(&mut header, 60, spec.mini_first);
    put_u32(&mut header, 64, spec.mini_count);
    put_u32(&mut header, 68, spec.master_first);
    put_u32(&mut header, 72, spec.master_count);
    for i in 0..109 {
        let value = spec.difat.get(i).copied().unwrap_or(FREE_SECTOR);
        put_u32(&mut header, 76 + i * 4, value);
    }
    header
}

pub(crate) struct EntrySpec {
    pub name: &'static str,
    pub kind: u8,
    pub color: u8,
    pub left: u32,
    pub right: u32,
    pub child: u32,
    pub clsid: [u8; 16],
    pub created: u64,
    pub modified: u64,
    pub start: u32,
    pub size: u64,
}

impl Default for EntrySpec {
    fn default() -> Self {
        EntrySpec {
            name: "",
            kind: 0,
            color: 0,
            left: NO_STREAM,
            right: NO_STREAM,
            child: NO_STREAM,
            clsid: [0u8; 16],
            created: 0,
            modified: 0,
            start: 0,
            size: 0,
        }
    }
}

pub(crate) fn build_entry(spec: &EntrySpec) -> [u8; 128] {
    let mut entry = [0u8; 128];
    let units: Vec<u16> = spec.name.encode_utf16().collect();
    for (i, unit) in units.iter().enumerate().take(31) {
        put_u16(&mut entry, i * 2, *unit);
    }
    let name_len = if spec.name.is_empty() {
        0
    } else {
        (units.len().min(31) as u16 + 1) * 2
    };
    put_u16(&mut entry, 64, name_len);
    entry[66] = spec.kind;
    entry[67] = spec.color;
    put_u32(&mut entry, 68, spec.left);
    put_u32(&mut entry, 72, spec.right);
    put_u32(&mut entry, 76, spec.child);
    entry[80..96].copy_from_slice(&spec.clsid);
    put_u64(&mut entry, 100, spec.created);
    put_u64(&mut entry, 108, spec.modified);
    put_u32(&mut entry, 116, spec.start);
    put_u32(&mut entry, 120, spec.size as u32);
    put_u32(&mut entry, 124, (spec.size >> 32) as u32);
    entry
}

fn fill_fat_with_free(image: &mut [u8], fat_sector: u32) {
    let base = sector_offset(fat_sector);
    for i in 0..SECTOR / 4 {
        put_u32(image, base + i * 4, FREE_SECTOR);
    }
}

/// Marks sectors `first..=last` as one chain in the FAT held at `fat_sector`.
fn set_chain(image: &mut [u8], fat_sector: u32, first: u32, last: u32) {
    let base = sector_offset(fat_sector);
    for sector in first..last {
        put_u32(image, base + sector as usize * 4, sector + 1);
    }
    put_u32(image, base + last as usize * 4, END_OF_CHAIN);
}

fn write_entries(image: &mut [u8], offset: usize, entries: &[EntrySpec]) {
    for (i, spec) in entries.iter().enumerate() {
        let bytes = build_entry(spec);
        image[offset + i * 128..offset + (i + 1) * 128].copy_from_slice(&bytes);
    }
}

fn write_at(image: &mut [u8], offset: usize, content: &[u8]) {
    image[offset..offset + content.len()].copy_from_slice(content);
}

/// Minimal container: root -> "Storage 1" -> "Stream 1" (544 bytes of
/// repeating "Data", held in nine mini sectors).
///
/// Layout: sector 0 FAT, 1 directory, 2 mini-FAT, 3-4 mini stream. Parses
/// without a single warning.
pub(crate) fn basic_sample() -> Vec<u8> {
    let mut image = vec![0u8; SECTOR + 5 * SECTOR];
    let header = build_header(&HeaderSpec {
        major: 3,
        sector_shift: 9,
        dir_sector_count: 0,
        fat_sector_count: 1,
        dir_first: 1,
        mini_first: 2,
        mini_count: 1,
        master_first: END_OF_CHAIN,
        master_count: 0,
        difat: vec![0, END_OF_CHAIN],
    });
    write_at(&mut image, 0, &header);

    fill_fat_with_free(&mut image, 0);
    let fat = sector_offset(0);
    put_u32(&mut image, fat, NORMAL_FAT_SECTOR); // sector 0: the FAT itself
    put_u32(&mut image, fat + 4, END_OF_CHAIN); // sector 1: directory
    put_u32(&mut image, fat + 8, END_OF_CHAIN); // sector 2: mini-FAT
    put_u32(&mut image, fat + 12, 4); // sectors 3-4: mini stream
    put_u32(&mut image, fat + 16, END_OF_CHAIN);

    write_entries(
        &mut image,
        sector_offset(1),
        &[
            EntrySpec {
                name: "Root Entry",
                kind: 5,
                color: 1,
                child: 1,
                start: 3,
                size: 576,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "Storage 1",
                kind: 1,
                color: 1,
                child: 2,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "Stream 1",
                kind: 2,
                color: 1,
                start: 0,
                size: 544,
                ..EntrySpec::default()
            },
            EntrySpec::default(),
        ],
    );

    fill_fat_with_free(&mut image, 2);
    let mini_fat = sector_offset(2);
    for i in 0..8u32 {
        put_u32(&mut image, mini_fat + i as usize * 4, i + 1);
    }
    put_u32(&mut image, mini_fat + 8 * 4, END_OF_CHAIN);

    write_at(&mut image, sector_offset(3), &b"Data".repeat(136));
    image
}

/// Same logical content as [`basic_sample`] in a v4 container: 4096-byte
/// sectors, 4096-byte header region, one directory sector of 32 entries.
pub(crate) fn v4_sample() -> Vec<u8> {
    const S: usize = 4096;
    let so4 = |sector: usize| S + sector * S;
    let mut image = vec![0u8; S + 4 * S];
    let header = build_header(&HeaderSpec {
        major: 4,
        sector_shift: 12,
        dir_sector_count: 1,
        fat_sector_count: 1,
        dir_first: 1,
        mini_first: 2,
        mini_count: 1,
        master_first: END_OF_CHAIN,
        master_count: 0,
        difat: vec![0, END_OF_CHAIN],
    });
    write_at(&mut image, 0, &header);

    for i in 0..S / 4 {
        put_u32(&mut image, so4(0) + i * 4, FREE_SECTOR);
        put_u32(&mut image, so4(2) + i * 4, FREE_SECTOR);
    }
    put_u32(&mut image, so4(0), NORMAL_FAT_SECTOR);
    put_u32(&mut image, so4(0) + 4, END_OF_CHAIN); // directory
    put_u32(&mut image, so4(0) + 8, END_OF_CHAIN); // mini-FAT
    put_u32(&mut image, so4(0) + 12, END_OF_CHAIN); // mini stream

    let mut entries = vec![
        EntrySpec {
            name: "Root Entry",
            kind: 5,
            color: 1,
            child: 1,
            start: 3,
            size: 576,
            ..EntrySpec::default()
        },
        EntrySpec {
            name: "Storage 1",
            kind: 1,
            color: 1,
            child: 2,
            ..EntrySpec::default()
        },
        EntrySpec {
            name: "Stream 1",
            kind: 2,
            color: 1,
            start: 0,
            size: 544,
            ..EntrySpec::default()
        },
    ];
    entries.resize_with(32, EntrySpec::default);
    write_entries(&mut image, so4(1), &entries);

    for i in 0..8u32 {
        put_u32(&mut image, so4(2) + i as usize * 4, i + 1);
    }
    put_u32(&mut image, so4(2) + 8 * 4, END_OF_CHAIN);

    write_at(&mut image, so4(3), &b"Data".repeat(136));
    image
}

pub(crate) fn table_content() -> Vec<u8> {
    (0..TABLE_SIZE).map(|i| (i * 7 % 251) as u8).collect()
}

pub(crate) fn word_content() -> Vec<u8> {
    (0..9280).map(|i| (i * 3 % 256) as u8).collect()
}

pub(crate) fn compobj_content() -> Vec<u8> {
    (0..106u32).map(|i| (i % 256) as u8).collect()
}

pub(crate) fn ole10_content() -> Vec<u8> {
    (0..76u32).map(|i| (200 - i % 200) as u8).collect()
}

pub(crate) fn summary_content() -> Vec<u8> {
    (0..4096).map(|i| (i % 256) as u8).collect()
}

pub(crate) fn doc_summary_content() -> Vec<u8> {
    (0..4096).map(|i| (255 - i % 256) as u8).collect()
}

const WORD97_CLSID: [u8; 16] = [
    0x06, 0x09, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x46,
];

/// A Word-97-shaped container: six root children mixing normal-FAT streams
/// (1Table, WordDocument, the two property sets) with mini-FAT streams
/// (\x01CompObj, and \x01Ole10Native inside the ObjectPool storage).
///
/// Layout: sector 0 FAT, 1-2 directory (8 entries), 3 mini-FAT, 4 mini
/// stream, 5-21 1Table, 22-40 WordDocument, 41-48 SummaryInformation,
/// 49-56 DocumentSummaryInformation. Parses without warnings.
pub(crate) fn word_doc() -> Vec<u8> {
    let mut image = vec![0u8; SECTOR + 57 * SECTOR];
    let header = build_header(&HeaderSpec {
        major: 3,
        sector_shift: 9,
        dir_sector_count: 0,
        fat_sector_count: 1,
        dir_first: 1,
        mini_first: 3,
        mini_count: 1,
        master_first: END_OF_CHAIN,
        master_count: 0,
        difat: vec![0, END_OF_CHAIN],
    });
    write_at(&mut image, 0, &header);

    fill_fat_with_free(&mut image, 0);
    let fat = sector_offset(0);
    put_u32(&mut image, fat, NORMAL_FAT_SECTOR);
    set_chain(&mut image, 0, 1, 2); // directory
    put_u32(&mut image, fat + 3 * 4, END_OF_CHAIN); // mini-FAT
    put_u32(&mut image, fat + 4 * 4, END_OF_CHAIN); // mini stream
    set_chain(&mut image, 0, 5, 21); // 1Table
    set_chain(&mut image, 0, 22, 40); // WordDocument
    set_chain(&mut image, 0, 41, 48); // SummaryInformation
    set_chain(&mut image, 0, 49, 56); // DocumentSummaryInformation

    // Sibling tree below the root: in-order traversal gives the format's
    // (length, name) sort order.
    write_entries(
        &mut image,
        sector_offset(1),
        &[
            EntrySpec {
                name: "Root Entry",
                kind: 5,
                color: 1,
                child: 4,
                clsid: WORD97_CLSID,
                start: 4,
                size: 256,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "1Table",
                kind: 2,
                color: 1,
                start: 5,
                size: TABLE_SIZE as u64,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "\u{1}CompObj",
                kind: 2,
                color: 0,
                left: 1,
                right: 3,
                start: 0,
                size: 106,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "ObjectPool",
                kind: 1,
                color: 1,
                child: 7,
                created: TICKS_2004,
                modified: TICKS_2004,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "WordDocument",
                kind: 2,
                color: 1,
                left: 2,
                right: 5,
                start: 22,
                size: 9280,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "\u{5}SummaryInformation",
                kind: 2,
                color: 0,
                right: 6,
                start: 41,
                size: 4096,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "\u{5}DocumentSummaryInformation",
                kind: 2,
                color: 1,
                start: 49,
                size: 4096,
                ..EntrySpec::default()
            },
            EntrySpec {
                name: "\u{1}Ole10Native",
                kind: 2,
                color: 1,
                start: 2,
                size: 76,
                ..EntrySpec::default()
            },
        ],
    );

    fill_fat_with_free(&mut image, 3);
    let mini_fat = sector_offset(3);
    put_u32(&mut image, mini_fat, 1); // CompObj: mini sectors 0-1
    put_u32(&mut image, mini_fat + 4, END_OF_CHAIN);
    put_u32(&mut image, mini_fat + 8, 3); // Ole10Native: mini sectors 2-3
    put_u32(&mut image, mini_fat + 12, END_OF_CHAIN);

    write_at(&mut image, sector_offset(4), &compobj_content());
    write_at(&mut image, sector_offset(4) + 128, &ole10_content());
    write_at(&mut image, sector_offset(5), &table_content());
    write_at(&mut image, sector_offset(22), &word_content());
    write_at(&mut image, sector_offset(41), &summary_content());
    write_at(&mut image, sector_offset(49), &doc_summary_content());
    image
}

/// A container whose master-FAT does not fit in the header: 110 FAT sectors
/// (0-109), one DIFAT extension sector (110) and a directory sector (111).
/// The extension sector is padded with FREE_SECTOR, so loading it emits
/// exactly one MasterFat warning.
pub(crate) fn difat_sample() -> Vec<u8> {
    let mut image = vec![0u8; SECTOR + 112 * SECTOR];
    let header = build_header(&HeaderSpec {
        major: 3,
        sector_shift: 9,
        dir_sector_count: 0,
        fat_sector_count: 110,
        dir_first: 111,
        mini_first: END_OF_CHAIN,
        mini_count: 0,
        master_first: 110,
        master_count: 1,
        difat: (0..109).collect(),
    });
    write_at(&mut image, 0, &header);

    for fat_sector in 0..110 {
        fill_fat_with_free(&mut image, fat_sector);
    }
    let fat = sector_offset(0);
    for sector in 0..=109 {
        put_u32(&mut image, fat + sector * 4, NORMAL_FAT_SECTOR);
    }
    put_u32(&mut image, fat + 110 * 4, crate::constants::MASTER_FAT_SECTOR);
    put_u32(&mut image, fat + 111 * 4, END_OF_CHAIN); // directory

    let extension = sector_offset(110);
    for i in 0..128 {
        put_u32(&mut image, extension + i * 4, FREE_SECTOR);
    }
    put_u32(&mut image, extension, 109); // the 110th FAT sector
    put_u32(&mut image, extension + 127 * 4, END_OF_CHAIN); // chain link slot

    write_entries(
        &mut image,
        sector_offset(111),
        &[
            EntrySpec {
                name: "Root Entry",
                kind: 5,
                color: 1,
                start: END_OF_CHAIN,
                ..EntrySpec::default()
            },
            EntrySpec::default(),
            EntrySpec::default(),
            EntrySpec::default(),
        ],
    );
    image
}

/// A malicious DIFAT: 1700 chained extension sectors full of plausible FAT
/// sector references. Following it would build a >100 MiB normal-FAT, so
/// loading must fail with LargeNormalFat long before the chain ends.
pub(crate) fn large_difat() -> Vec<u8> {
    let extensions = 1700u32;
    let mut image = vec![0u8; SECTOR + (extensions as usize + 1) * SECTOR];
    let header = build_header(&HeaderSpec {
        major: 3,
        sector_shift: 9,
        dir_sector_count: 0,
        fat_sector_count: 0,
        dir_first: 0,
        mini_first: END_OF_CHAIN,
        mini_count: 0,
        master_first: 1,
        master_count: extensions,
        difat: vec![0; 109],
    });
    write_at(&mut image, 0, &header);

    for sector in 1..=extensions {
        let link = if sector == extensions {
            END_OF_CHAIN
        } else {
            sector + 1
        };
        put_u32(&mut image, sector_offset(sector) + 127 * 4, link);
    }
    image
}
