use std::sync::{Arc, Mutex};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // Fatal container defects
    #[error("InvalidMagic => file does not appear to be an OLE compound document")]
    InvalidMagic,
    #[error("InvalidByteOrder => file uses an unsupported byte ordering (big endian?)")]
    InvalidByteOrder,
    #[error("UnsupportedVersion => unsupported DLL version ({0})")]
    UnsupportedVersion(u16),
    #[error("LargeNormalFat => excessively large FAT (malicious file?)")]
    LargeNormalFat,
    #[error("LargeMiniFat => excessively large mini-FAT (malicious file?)")]
    LargeMiniFat,
    #[error("MasterLoop => DIFAT loop encountered (sector {0})")]
    MasterLoop(u32),
    #[error("CyclicFatChain => cyclic FAT chain found starting at sector {0}")]
    CyclicFatChain(u32),
    #[error("DirectoryLoop => directory entry {0} encountered twice")]
    DirectoryLoop(u32),
    #[error("NotFound => unable to locate {0} in compound document")]
    NotFound(String),
    #[error("NotStream => {0} is not a stream")]
    NotStream(String),
    #[error("NoMiniFat => compound document has no mini-FAT")]
    NoMiniFat,
    #[error("BadSector => read from invalid sector ({0})")]
    BadSector(u32),
    #[error("InvalidSeek => new position is before the start of the stream")]
    InvalidSeek,
    #[error("UnexpectedEof => {0}")]
    UnexpectedEof(String),

    // Std Errors
    #[error("StdIo => {0}")]
    StdIo(#[from] std::io::Error),
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::StdIo(inner) => inner,
            Error::InvalidSeek => {
                std::io::Error::new(std::io::ErrorKind::InvalidInput, Error::InvalidSeek)
            }
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        }
    }
}

/// The non-fatal counterpart of [`Error`]: something in the container is
/// malformed, the parser recovered, and this records what it did.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WarningCategory {
    DirName,
    DirType,
    DirIndex,
    DirEntry,
    DirTime,
    DirSize,
    Header,
    SectorSize,
    Version,
    MasterFat,
    NormalFat,
    MiniFat,
    MasterSector,
    NormalSector,
    Truncated,
}

#[derive(Clone, Debug)]
pub struct Warning {
    pub category: WarningCategory,
    pub message: String,
    /// Directory entry the warning refers to, when known.
    pub dir_index: Option<u32>,
}

/// Observer for recoverable defects found while reading a container.
///
/// A sink is handed to the reader constructor and invoked for every anomaly
/// the parser tolerates. Implementations must not panic; reads continue after
/// every warning.
pub trait WarningSink: Send + Sync {
    fn warn(&self, warning: Warning);
}

/// Sink that discards every warning. Used by the plain constructors.
pub struct NullWarningSink;

impl WarningSink for NullWarningSink {
    fn warn(&self, _warning: Warning) {}
}

/// Sink that accumulates warnings for later inspection.
#[derive(Default)]
pub struct WarningCollector {
    collected: Mutex<Vec<Warning>>,
}

impl WarningCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Removes and returns everything collected so far.
    pub fn drain(&self) -> Vec<Warning> {
        match self.collected.lock() {
            Ok(mut collected) => std::mem::take(&mut *collected),
            Err(_) => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.collected.lock().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn count_of(&self, category: WarningCategory) -> usize {
        self.collected
            .lock()
            .map(|c| c.iter().filter(|w| w.category == category).count())
            .unwrap_or(0)
    }
}

impl WarningSink for WarningCollector {
    fn warn(&self, warning: Warning) {
        if let Ok(mut collected) = self.collected.lock() {
            collected.push(warning);
        }
    }
}

pub(crate) fn warn(sink: &dyn WarningSink, category: WarningCategory, message: impl Into<String>) {
    sink.warn(Warning {
        category,
        message: message.into(),
        dir_index: None,
    });
}

pub(crate) fn warn_entry(
    sink: &dyn WarningSink,
    category: WarningCategory,
    dir_index: u32,
    message: impl Into<String>,
) {
    sink.warn(Warning {
        category,
        message: message.into(),
        dir_index: Some(dir_index),
    });
}
