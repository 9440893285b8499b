use crate::{
    constants::{
        END_OF_CHAIN, FAT_SIZE_LIMIT, FREE_SECTOR, MASTER_FAT_SECTOR, MAX_NORMAL_SECTOR,
        NORMAL_FAT_SECTOR,
    },
    error::{warn, Error, WarningCategory},
    CompoundFile, Result,
};
use std::collections::HashSet;
use std::io::Read;

fn unpack_sector(data: &[u8]) -> impl Iterator<Item = u32> + '_ {
    data.chunks_exact(4)
        .map(|quad| u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]))
}

impl CompoundFile {
    /// Returns the content of a data sector. A sector beyond the end of the
    /// file is fatal; a sector the file ends in the middle of yields whatever
    /// bytes exist plus a `Truncated` warning.
    pub(crate) fn read_sector(&self, sector: u32) -> Result<&[u8]> {
        if sector > self.max_sector {
            return Err(Error::BadSector(sector));
        }
        let start = self.header.header_size() + sector as usize * self.header.sector_size;
        let end = start + self.header.sector_size;
        if end > self.data.len() {
            warn(
                self.sink.as_ref(),
                WarningCategory::Truncated,
                format!("sector {sector} extends beyond the end of the file"),
            );
            Ok(self.data.get(start..).unwrap_or(&[]))
        } else {
            Ok(&self.data[start..end])
        }
    }

    /// Reconstructs the master-FAT (DIFAT): the ordered list of sectors that
    /// hold the normal-FAT.
    ///
    /// The sector count declared in the header is routinely wrong, so it is
    /// only used for mismatch warnings; the real terminator is found by
    /// scanning for END_OF_CHAIN (or FREE_SECTOR, or a sector beyond the end
    /// of the file) after every extension read. Extension sectors already
    /// seen are fatal, as is a table that would balloon past the 100 MiB
    /// guard. Returns the set of extension sectors visited so the normal-FAT
    /// load can verify their markings.
    pub(crate) fn load_master_fat(&mut self) -> Result<HashSet<u32>> {
        let mut master = self.header.master_fat_head.clone();
        let mut count = self.header.master_sector_count as i64;
        let mut checked = 0usize;
        let mut visited: HashSet<u32> = HashSet::new();
        let mut sector = self.header.master_first_sector;

        // The first 109 entries live in the header; writers disagree on how
        // to terminate them when there is no extension chain.
        if count == 0 && sector == FREE_SECTOR {
            warn(
                self.sink.as_ref(),
                WarningCategory::MasterFat,
                "DIFAT extension pointer is FREE_SECTOR, assuming no extension",
            );
            sector = END_OF_CHAIN;
        } else if count == 0 && sector != END_OF_CHAIN {
            warn(
                self.sink.as_ref(),
                WarningCategory::MasterFat,
                "DIFAT extension pointer with zero count",
            );
        } else if count != 0 && sector == END_OF_CHAIN {
            warn(
                self.sink.as_ref(),
                WarningCategory::MasterFat,
                "DIFAT chained from header, or incorrect count",
            );
            sector = master.pop().unwrap_or(END_OF_CHAIN);
        }

        loop {
            let mut terminator = None;
            for index in checked..master.len() {
                let value = master[index];
                if value == END_OF_CHAIN {
                    terminator = Some(index);
                    break;
                } else if value == FREE_SECTOR {
                    warn(
                        self.sink.as_ref(),
                        WarningCategory::MasterFat,
                        "DIFAT terminated by FREE_SECTOR",
                    );
                    terminator = Some(index);
                    break;
                } else if value <= MAX_NORMAL_SECTOR && value > self.max_sector {
                    warn(
                        self.sink.as_ref(),
                        WarningCategory::MasterFat,
                        format!("sector in DIFAT chain beyond file end ({value})"),
                    );
                    terminator = Some(index);
                    break;
                } else if value > MAX_NORMAL_SECTOR {
                    // May be legitimate padding in the final extension
                    // sector; keep scanning for a real terminator.
                    warn(
                        self.sink.as_ref(),
                        WarningCategory::MasterFat,
                        format!("invalid special value in DIFAT chain ({value})"),
                    );
                }
            }
            if let Some(index) = terminator {
                master.truncate(index);
                break;
            }
            if sector == END_OF_CHAIN {
                break;
            }
            checked = master.len();
            count -= 1;
            visited.insert(sector);
            let entries: Vec<u32> = unpack_sector(self.read_sector(sector)?).collect();
            master.extend(entries);
            if master.len() as u64 * self.header.sector_size as u64 > FAT_SIZE_LIMIT {
                return Err(Error::LargeNormalFat);
            }
            // The last slot of every extension sector links to the next one.
            sector = master.pop().unwrap_or(END_OF_CHAIN);
            if visited.contains(&sector) {
                return Err(Error::MasterLoop(sector));
            }
        }

        if count > 0 {
            warn(
                self.sink.as_ref(),
                WarningCategory::MasterFat,
                format!("DIFAT end encountered early (expected {count} more sectors)"),
            );
        } else if count < 0 {
            warn(
                self.sink.as_ref(),
                WarningCategory::MasterFat,
                format!("DIFAT end encountered late (overran by {} sectors)", -count),
            );
        }
        if master.len() != self.header.normal_fat_sector_count as usize {
            warn(
                self.sink.as_ref(),
                WarningCategory::MasterFat,
                format!(
                    "DIFAT length does not match FAT sector count ({} != {})",
                    master.len(),
                    self.header.normal_fat_sector_count
                ),
            );
        }
        self.master_fat = master;
        Ok(visited)
    }

    /// Materialises the normal-FAT from the sectors the master-FAT names.
    /// No loop or validity checks needed here; the master-FAT pass already
    /// guaranteed them. Afterwards the table's self-descriptions are
    /// verified: its own sectors must be marked NORMAL_FAT_SECTOR and the
    /// extension sectors MASTER_FAT_SECTOR, and wrong marks are patched.
    pub(crate) fn load_normal_fat(&mut self, master_sectors: &HashSet<u32>) -> Result<()> {
        let entries_per_sector = self.header.sector_size / 4;
        let mut normal = Vec::with_capacity(self.master_fat.len() * entries_per_sector);
        for index in 0..self.master_fat.len() {
            let entries: Vec<u32> =
                unpack_sector(self.read_sector(self.master_fat[index])?).collect();
            normal.extend(entries);
        }

        for &master_sector in master_sectors {
            match normal.get_mut(master_sector as usize) {
                Some(entry) if *entry != MASTER_FAT_SECTOR => {
                    warn(
                        self.sink.as_ref(),
                        WarningCategory::MasterSector,
                        format!(
                            "DIFAT sector {} marked incorrectly in FAT ({} != {})",
                            master_sector, *entry, MASTER_FAT_SECTOR
                        ),
                    );
                    *entry = MASTER_FAT_SECTOR;
                }
                None => warn(
                    self.sink.as_ref(),
                    WarningCategory::MasterSector,
                    format!("DIFAT sector {master_sector} has no entry in FAT"),
                ),
                _ => {}
            }
        }
        for index in 0..self.master_fat.len() {
            let fat_sector = self.master_fat[index];
            match normal.get_mut(fat_sector as usize) {
                Some(entry) if *entry != NORMAL_FAT_SECTOR => {
                    warn(
                        self.sink.as_ref(),
                        WarningCategory::NormalSector,
                        format!(
                            "FAT sector {} marked incorrectly in FAT ({} != {})",
                            fat_sector, *entry, NORMAL_FAT_SECTOR
                        ),
                    );
                    *entry = NORMAL_FAT_SECTOR;
                }
                None => warn(
                    self.sink.as_ref(),
                    WarningCategory::NormalSector,
                    format!("FAT sector {fat_sector} has no entry in FAT"),
                ),
                _ => {}
            }
        }
        self.normal_fat = normal;
        Ok(())
    }

    /// Loads the mini-FAT, which lives in an ordinary stream chained through
    /// the normal-FAT. Absent or out-of-range first sectors degrade to "no
    /// mini-FAT" with a warning; mini-sized streams then fail to open.
    pub(crate) fn load_mini_fat(&mut self) -> Result<()> {
        let sector_size = self.header.sector_size;
        if self.header.mini_sector_count as u64 * sector_size as u64 > FAT_SIZE_LIMIT {
            return Err(Error::LargeMiniFat);
        }
        let mut first = self.header.mini_first_sector;
        if first == FREE_SECTOR {
            warn(
                self.sink.as_ref(),
                WarningCategory::MiniFat,
                "mini FAT first sector set to FREE_SECTOR",
            );
            first = END_OF_CHAIN;
        } else if first <= MAX_NORMAL_SECTOR && first > self.max_sector {
            warn(
                self.sink.as_ref(),
                WarningCategory::MiniFat,
                format!("mini FAT first sector beyond file end ({first})"),
            );
            first = END_OF_CHAIN;
        }
        if first == END_OF_CHAIN {
            return Ok(());
        }

        let declared = self.header.mini_sector_count as u64 * sector_size as u64;
        let mut stream = self.normal_stream(first, Some(declared))?;
        let mut mini = Vec::with_capacity((stream.len() / 4) as usize);
        let mut buf = vec![0u8; sector_size];
        for _ in 0..stream.len() / sector_size as u64 {
            let read = stream.read(&mut buf)?;
            mini.extend(unpack_sector(&buf[..read]));
            if read < sector_size {
                break;
            }
        }
        self.mini_fat = mini;
        Ok(())
    }
}
