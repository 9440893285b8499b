use crate::{
    constants,
    error::{warn, Error, WarningCategory, WarningSink},
    Result,
};
use derivative::Derivative;
use packed_struct::prelude::*;

/// Version and sector-shift block of the header (bytes 24..34).
#[derive(PackedStruct, Clone, Debug)]
#[packed_struct(endian = "lsb", size_bytes = "10")]
pub(crate) struct VersionBlock {
    minor_version: u16,
    major_version: u16,
    byte_order: u16,
    sector_shift: u16,
    mini_sector_shift: u16,
}

/// Chain locations and counts of the header (bytes 40..76).
#[derive(PackedStruct, Clone, Debug)]
#[packed_struct(endian = "lsb", size_bytes = "36")]
pub(crate) struct ChainBlock {
    dir_sector_count: u32,
    normal_fat_sector_count: u32,
    dir_first_sector: u32,
    txn_signature: u32,
    mini_size_limit: u32,
    mini_first_sector: u32,
    mini_sector_count: u32,
    master_first_sector: u32,
    master_sector_count: u32,
}

/**
 * The leading header of a compound document, as stored on disk. The layout is
 * fixed at 76 bytes followed by 109 inline master-FAT entries; the remainder
 * of the 512-byte header region is reserved.
 */
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub(crate) struct RawFileHeader {
    magic: [u8; 8],
    clsid: [u8; 16],
    versions: VersionBlock,
    reserved: [u8; 6],
    chains: ChainBlock,
    #[derivative(Debug = "ignore")]
    master_fat_head: Vec<u32>,
}

pub(crate) fn parse_raw_header(data: &[u8]) -> Result<RawFileHeader> {
    if data.len() < constants::HEADER_LENGTH {
        return Err(Error::UnexpectedEof(format!(
            "tried to read {} header bytes, found {}",
            constants::HEADER_LENGTH,
            data.len()
        )));
    }

    let magic: [u8; 8] = data[0..8]
        .try_into()
        .map_err(|_| Error::UnexpectedEof("short read in header magic".to_string()))?;
    let clsid: [u8; 16] = data[8..24]
        .try_into()
        .map_err(|_| Error::UnexpectedEof("short read in header CLSID".to_string()))?;
    let versions = VersionBlock::unpack_from_slice(&data[24..34])
        .map_err(|err| Error::UnexpectedEof(format!("header version block: {err}")))?;
    let reserved: [u8; 6] = data[34..40]
        .try_into()
        .map_err(|_| Error::UnexpectedEof("short read in reserved header bytes".to_string()))?;
    let chains = ChainBlock::unpack_from_slice(&data[40..76])
        .map_err(|err| Error::UnexpectedEof(format!("header chain block: {err}")))?;
    let master_fat_head = data[constants::RAW_HEADER_LENGTH..constants::HEADER_LENGTH]
        .chunks_exact(4)
        .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
        .collect::<Vec<_>>();
    debug_assert_eq!(master_fat_head.len(), constants::MASTER_FAT_INLINE_ENTRIES);

    Ok(RawFileHeader {
        magic,
        clsid,
        versions,
        reserved,
        chains,
        master_fat_head,
    })
}

#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub(crate) struct OleHeader {
    pub minor_version: u16,
    pub major_version: u16,
    pub sector_size: usize,
    pub mini_sector_size: usize,
    pub dir_sector_count: u32,
    pub normal_fat_sector_count: u32,
    pub dir_first_sector: u32,
    pub mini_size_limit: u32,
    pub mini_first_sector: u32,
    pub mini_sector_count: u32,
    pub master_first_sector: u32,
    pub master_sector_count: u32,
    // the first 109 master-FAT entries, stored inline in the header
    #[derivative(Debug = "ignore")]
    pub master_fat_head: Vec<u32>,
}

impl OleHeader {
    /// Validates the raw header and normalises its sizes.
    ///
    /// Magic, byte order and DLL version failures are fatal; everything else
    /// the format gets wrong in the wild is reported through the sink and
    /// coerced to a usable value.
    pub(crate) fn from_raw(raw: RawFileHeader, sink: &dyn WarningSink) -> Result<Self> {
        if raw.magic != constants::MAGIC_BYTES {
            return Err(Error::InvalidMagic);
        }
        if raw.versions.byte_order != constants::BYTE_ORDER_MARK {
            return Err(Error::InvalidByteOrder);
        }
        let major_version = raw.versions.major_version;
        if major_version != 3 && major_version != 4 {
            return Err(Error::UnsupportedVersion(major_version));
        }

        // Sector size is stored as a shift; a shift outside 7..=20 would give
        // a size outside [128, 1048576], which no real writer produces.
        let sector_shift = raw.versions.sector_shift;
        let sector_size = if (7..=20).contains(&sector_shift) {
            1usize << sector_shift
        } else {
            warn(
                sink,
                WarningCategory::SectorSize,
                format!("FAT sector size is silly (shift {sector_shift}), assuming 512"),
            );
            512
        };
        let mini_sector_shift = raw.versions.mini_sector_shift;
        let mini_sector_size = if (3..=20).contains(&mini_sector_shift)
            && (1usize << mini_sector_shift) < sector_size
        {
            1usize << mini_sector_shift
        } else {
            warn(
                sink,
                WarningCategory::SectorSize,
                format!("mini FAT sector size is silly (shift {mini_sector_shift}), assuming 64"),
            );
            64
        };

        if major_version == 3 {
            if sector_size != 512 {
                warn(
                    sink,
                    WarningCategory::SectorSize,
                    format!("unexpected sector size in v3 file ({sector_size})"),
                );
            }
            if raw.chains.dir_sector_count != 0 {
                warn(
                    sink,
                    WarningCategory::Header,
                    format!(
                        "directory chain sector count is non-zero ({})",
                        raw.chains.dir_sector_count
                    ),
                );
            }
        } else if sector_size != 4096 {
            warn(
                sink,
                WarningCategory::SectorSize,
                format!("unexpected sector size in v4 file ({sector_size})"),
            );
        }
        if mini_sector_size != 64 {
            warn(
                sink,
                WarningCategory::SectorSize,
                format!("unexpected mini sector size ({mini_sector_size})"),
            );
        }
        if raw.versions.minor_version != constants::EXPECTED_MINOR_VERSION {
            warn(
                sink,
                WarningCategory::Version,
                format!(
                    "unexpected minor version ({})",
                    raw.versions.minor_version
                ),
            );
        }
        if raw.clsid != [0u8; 16] {
            warn(
                sink,
                WarningCategory::Header,
                format!("CLSID of compound file is non-zero ({:02x?})", raw.clsid),
            );
        }
        if raw.chains.txn_signature != 0 {
            warn(
                sink,
                WarningCategory::Header,
                format!(
                    "transaction signature is non-zero ({})",
                    raw.chains.txn_signature
                ),
            );
        }
        if raw.reserved != [0u8; 6] {
            warn(
                sink,
                WarningCategory::Header,
                format!("reserved header bytes are non-zero ({:02x?})", raw.reserved),
            );
        }

        Ok(OleHeader {
            minor_version: raw.versions.minor_version,
            major_version,
            sector_size,
            mini_sector_size,
            dir_sector_count: raw.chains.dir_sector_count,
            normal_fat_sector_count: raw.chains.normal_fat_sector_count,
            dir_first_sector: raw.chains.dir_first_sector,
            mini_size_limit: raw.chains.mini_size_limit,
            mini_first_sector: raw.chains.mini_first_sector,
            mini_sector_count: raw.chains.mini_sector_count,
            master_first_sector: raw.chains.master_first_sector,
            master_sector_count: raw.chains.master_sector_count,
            master_fat_head: raw.master_fat_head,
        })
    }

    /// The header region occupies at least one 512-byte block even when the
    /// sector size is larger; data sectors are addressed after it.
    pub(crate) fn header_size(&self) -> usize {
        self.sector_size.max(constants::HEADER_LENGTH)
    }
}
