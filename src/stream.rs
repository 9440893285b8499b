use crate::{
    constants::END_OF_CHAIN,
    error::{warn, Error, WarningCategory, WarningSink},
    Result,
};
use derivative::Derivative;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

/// Where a stream's sectors actually live.
///
/// Normal streams index straight into the file image. Mini streams are
/// nested: their "file" is the root entity's stream, itself a normal stream,
/// so mini sector addressing composes through a second translation layer.
#[derive(Derivative)]
#[derivative(Debug)]
enum Backing {
    Direct {
        #[derivative(Debug = "ignore")]
        data: Arc<Vec<u8>>,
        header_size: usize,
    },
    Nested {
        #[derivative(Debug = "ignore")]
        root: Box<Stream>,
    },
}

/// A read-only, seekable view of one stream inside a compound document.
///
/// Returned by [`CompoundFile::open`](crate::CompoundFile::open). Implements
/// [`std::io::Read`] and [`std::io::Seek`]; dropping the stream releases its
/// resources. Streams opened from the same reader are fully independent.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Stream {
    backing: Backing,
    #[derivative(Debug = "ignore")]
    sectors: Vec<u32>,
    sector_size: usize,
    length: u64,
    pos: u64,
    thread_safe: bool,
    #[derivative(Debug = "ignore")]
    sink: Arc<dyn WarningSink>,
}

/// Collects the sector chain starting at `start`, using tortoise-and-hare
/// cycle detection: the hare advances two links per tortoise step, and can
/// only catch the tortoise from behind if the chain loops.
fn load_sectors(fat: &[u32], start: u32) -> Result<Vec<u32>> {
    let next = |sector: u32| -> Result<u32> {
        fat.get(sector as usize)
            .copied()
            .ok_or(Error::BadSector(sector))
    };
    let mut sectors = Vec::new();
    let mut tortoise = start;
    let mut hare = start;
    while tortoise != END_OF_CHAIN {
        sectors.push(tortoise);
        tortoise = next(tortoise)?;
        if hare != END_OF_CHAIN {
            hare = next(hare)?;
            if hare != END_OF_CHAIN {
                hare = next(hare)?;
                if hare == tortoise {
                    return Err(Error::CyclicFatChain(start));
                }
            }
        }
    }
    Ok(sectors)
}

/// A declared length may undershoot or overshoot the physical chain; when it
/// falls outside the last sector it is ignored in favour of chain capacity.
fn resolve_length(
    sectors: &[u32],
    sector_size: usize,
    start: u32,
    declared: Option<u64>,
    sink: &dyn WarningSink,
) -> u64 {
    let max_length = sectors.len() as u64 * sector_size as u64;
    let min_length = sectors.len().saturating_sub(1) as u64 * sector_size as u64;
    match declared {
        None => max_length,
        Some(length) if (min_length..=max_length).contains(&length) => length,
        Some(length) => {
            warn(
                sink,
                WarningCategory::DirSize,
                format!(
                    "length ({length}) of stream at sector {start} exceeds bounds \
                     ({min_length}-{max_length})"
                ),
            );
            max_length
        }
    }
}

impl Stream {
    pub(crate) fn new_normal(
        data: Arc<Vec<u8>>,
        fat: &[u32],
        sector_size: usize,
        header_size: usize,
        start: u32,
        declared: Option<u64>,
        sink: Arc<dyn WarningSink>,
    ) -> Result<Self> {
        let sectors = load_sectors(fat, start)?;
        let length = resolve_length(&sectors, sector_size, start, declared, sink.as_ref());
        Ok(Stream {
            backing: Backing::Direct { data, header_size },
            sectors,
            sector_size,
            length,
            pos: 0,
            thread_safe: true,
            sink,
        })
    }

    /// A mini stream reads through the root entity's normal stream. The root
    /// stream's own construction has already run the cycle check on its
    /// chain, so a degenerate root chain never reaches this point.
    pub(crate) fn new_mini(
        root: Stream,
        mini_fat: &[u32],
        mini_sector_size: usize,
        start: u32,
        declared: Option<u64>,
        sink: Arc<dyn WarningSink>,
    ) -> Result<Self> {
        let sectors = load_sectors(mini_fat, start)?;
        let length = resolve_length(&sectors, mini_sector_size, start, declared, sink.as_ref());
        let thread_safe = root.thread_safe;
        Ok(Stream {
            backing: Backing::Nested {
                root: Box::new(root),
            },
            sectors,
            sector_size: mini_sector_size,
            length,
            pos: 0,
            thread_safe,
            sink,
        })
    }

    /// Zero-length stream; used for entities whose declared size is 0 without
    /// touching any allocation table.
    pub(crate) fn empty(sink: Arc<dyn WarningSink>) -> Self {
        Stream {
            backing: Backing::Direct {
                data: Arc::new(Vec::new()),
                header_size: 0,
            },
            sectors: Vec::new(),
            sector_size: 1,
            length: 0,
            pos: 0,
            thread_safe: true,
            sink,
        }
    }

    /// Current stream position.
    pub fn tell(&self) -> u64 {
        self.pos
    }

    /// Resolved stream length: the declared entity size when it is plausible,
    /// otherwise the physical capacity of the sector chain.
    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Whether concurrent reads of sibling streams are safe without external
    /// serialisation. True in the in-memory backing regime, where every read
    /// is pure indexing into a shared immutable buffer.
    pub fn is_thread_safe(&self) -> bool {
        self.thread_safe
    }

    /// Reads at most to the end of the current sector, and at most to the end
    /// of the stream, with a single access to the backing source.
    pub fn read1(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.pos);
        let sector_offset = (self.pos % self.sector_size as u64) as usize;
        let wanted = (buf.len() as u64)
            .min(remaining)
            .min((self.sector_size - sector_offset) as u64) as usize;
        if wanted == 0 {
            return Ok(0);
        }
        let sector_index = (self.pos / self.sector_size as u64) as usize;
        let Some(&sector) = self.sectors.get(sector_index) else {
            return Ok(0);
        };
        let read = match &mut self.backing {
            Backing::Direct { data, header_size } => {
                let offset = *header_size + sector as usize * self.sector_size + sector_offset;
                let available = data.len().saturating_sub(offset).min(wanted);
                if available < wanted {
                    warn(
                        self.sink.as_ref(),
                        WarningCategory::Truncated,
                        format!("read from sector {sector} truncated by end of file"),
                    );
                }
                if available > 0 {
                    buf[..available].copy_from_slice(&data[offset..offset + available]);
                }
                available
            }
            Backing::Nested { root } => {
                let offset = sector as u64 * self.sector_size as u64 + sector_offset as u64;
                root.seek(SeekFrom::Start(offset))?;
                root.read(&mut buf[..wanted])?
            }
        };
        self.pos += read as u64;
        Ok(read)
    }
}

impl Read for Stream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self.read1(&mut buf[filled..])?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Ok(filled)
    }
}

impl Seek for Stream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => offset as i128,
            SeekFrom::Current(offset) => self.pos as i128 + offset as i128,
            SeekFrom::End(offset) => self.length as i128 + offset as i128,
        };
        if target < 0 {
            return Err(Error::InvalidSeek.into());
        }
        self.pos = target as u64;
        Ok(self.pos)
    }
}
