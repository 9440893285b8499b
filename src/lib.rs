//! Read-only access to OLE Compound Document / AAF containers: the
//! "file-system in a file" behind legacy Office documents (`.doc`, `.xls`,
//! `.ppt`), MSI installers and similar artefacts.
//!
//! A [`CompoundFile`] parses the container's header and allocation tables
//! eagerly, tolerating the many kinds of damage real-world writers produce
//! (every recovery is reported through a [`WarningSink`]), and then serves
//! any stream in the directory tree as a seekable byte source.

#[macro_use]
extern crate lazy_static;

mod constants;
mod directory;
mod fat;
mod header;
mod stream;

mod ftype;
pub use ftype::{container_type, ContainerType};

pub mod error;
pub use error::{Error, NullWarningSink, Warning, WarningCategory, WarningCollector, WarningSink};
pub type Result<T> = std::result::Result<T, Error>;

pub use directory::{Entity, EntityKind};
pub use stream::Stream;

#[cfg(test)]
pub(crate) mod testutil;

use crate::constants::{Readable, MAX_NORMAL_SECTOR};
use crate::header::OleHeader;
use derivative::Derivative;
use std::sync::Arc;
use tokio::io::AsyncReadExt;

/// A parsed, immutable compound document.
///
/// Owns the file image, the three allocation tables and the entity tree;
/// everything is built during construction and nothing mutates afterwards,
/// so any number of streams can be open at once.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct CompoundFile {
    header: OleHeader,
    #[derivative(Debug = "ignore")]
    data: Arc<Vec<u8>>,
    max_sector: u32,
    #[derivative(Debug = "ignore")]
    master_fat: Vec<u32>,
    #[derivative(Debug = "ignore")]
    normal_fat: Vec<u32>,
    #[derivative(Debug = "ignore")]
    mini_fat: Vec<u32>,
    root: Entity,
    container_type: ContainerType,
    #[derivative(Debug = "ignore")]
    sink: Arc<dyn WarningSink>,
}

impl CompoundFile {
    #[cfg(feature = "async")]
    pub async fn from_file<P: AsRef<std::path::Path>>(file: P) -> Result<Self> {
        //! Read a compound document from a file, discarding warnings.
        //!
        //! ## Example usage
        //! ```no_run
        //! use olecf::CompoundFile;
        //!
        //! #[tokio::main]
        //! async fn main() {
        //!     let doc = CompoundFile::from_file("data/sample1.doc").await.unwrap();
        //!     for entry in doc.root() {
        //!         println!("{} ({} bytes)", entry.name(), entry.size());
        //!     }
        //! }
        //! ```
        Self::from_file_with_sink(file, Arc::new(NullWarningSink)).await
    }

    #[cfg(feature = "async")]
    pub async fn from_file_with_sink<P: AsRef<std::path::Path>>(
        file: P,
        sink: Arc<dyn WarningSink>,
    ) -> Result<Self> {
        //! Read a compound document from a file, reporting every recovered
        //! defect to `sink`.
        let f = tokio::fs::File::open(file).await?;
        Self::from_reader(f, sink).await
    }

    #[cfg(feature = "blocking")]
    pub fn from_file_blocking<P: AsRef<std::path::Path>>(file: P) -> Result<Self> {
        //! Read a compound document from a file without an async runtime.
        //!
        //! ## Example usage
        //! ```ignore
        //! use olecf::CompoundFile;
        //!
        //! let doc = CompoundFile::from_file_blocking("data/sample1.doc").unwrap();
        //! assert!(doc.root().len() > 0);
        //! ```
        Self::from_file_blocking_with_sink(file, Arc::new(NullWarningSink))
    }

    #[cfg(feature = "blocking")]
    pub fn from_file_blocking_with_sink<P: AsRef<std::path::Path>>(
        file: P,
        sink: Arc<dyn WarningSink>,
    ) -> Result<Self> {
        let rt = tokio::runtime::Runtime::new()?;
        let f = rt.block_on(tokio::fs::File::open(file))?;
        rt.block_on(Self::from_reader(f, sink))
    }

    /// Reads a compound document from any byte source. Random access is
    /// required to serve streams, so a non-seekable source is materialised
    /// into memory first.
    pub async fn from_reader<R: Readable>(mut read: R, sink: Arc<dyn WarningSink>) -> Result<Self> {
        let mut data = Vec::new();
        read.read_to_end(&mut data).await?;
        Self::from_bytes_with_sink(data, sink)
    }

    /// Parses a compound document already held in memory.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_bytes_with_sink(data, Arc::new(NullWarningSink))
    }

    pub fn from_bytes_with_sink(data: Vec<u8>, sink: Arc<dyn WarningSink>) -> Result<Self> {
        let raw_header = header::parse_raw_header(&data)?;
        let header = OleHeader::from_raw(raw_header, sink.as_ref())?;
        let max_sector = (data.len().saturating_sub(header.header_size()) / header.sector_size)
            .min(MAX_NORMAL_SECTOR as usize) as u32;

        let mut doc = CompoundFile {
            header,
            data: Arc::new(data),
            max_sector,
            master_fat: Vec::new(),
            normal_fat: Vec::new(),
            mini_fat: Vec::new(),
            root: Entity::default(),
            container_type: ContainerType::Generic,
            sink,
        };
        let master_sectors = doc.load_master_fat()?;
        doc.load_normal_fat(&master_sectors)?;
        doc.load_mini_fat()?;
        doc.load_directory()?;
        doc.container_type = ftype::container_type(&doc.root);
        Ok(doc)
    }

    /// The root storage entity. Iterate or index it to reach the rest of the
    /// directory tree.
    pub fn root(&self) -> &Entity {
        &self.root
    }

    pub fn container_type(&self) -> ContainerType {
        self.container_type
    }

    pub fn file_size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn version(&self) -> u16 {
        self.header.major_version
    }

    pub fn sector_size(&self) -> usize {
        self.header.sector_size
    }

    pub fn mini_sector_size(&self) -> usize {
        self.header.mini_sector_size
    }

    /// Resolves a `/`-separated path to an entity, matching each component
    /// case-insensitively. Empty components are skipped, so leading slashes
    /// are harmless.
    pub fn entity(&self, path: &str) -> Result<&Entity> {
        let mut entity = &self.root;
        for name in path.split('/') {
            if name.is_empty() {
                continue;
            }
            entity = entity
                .child(name)
                .ok_or_else(|| Error::NotFound(path.to_string()))?;
        }
        Ok(entity)
    }

    /// Opens the stream at `path`.
    ///
    /// ## Example usage
    /// ```no_run
    /// use olecf::CompoundFile;
    /// use std::io::Read;
    ///
    /// #[tokio::main]
    /// async fn main() {
    ///     let doc = CompoundFile::from_file("data/sample1.doc").await.unwrap();
    ///     let mut stream = doc.open("WordDocument").unwrap();
    ///     let mut content = Vec::new();
    ///     stream.read_to_end(&mut content).unwrap();
    /// }
    /// ```
    pub fn open(&self, path: &str) -> Result<Stream> {
        let entity = self.entity(path)?;
        self.open_entity(entity)
    }

    /// Opens a stream entity obtained from the directory tree. Streams below
    /// the header's size cutoff live in mini-sectors nested inside the root
    /// entity's stream; everything else is chained through the normal FAT.
    pub fn open_entity(&self, entity: &Entity) -> Result<Stream> {
        if !entity.is_file() {
            return Err(Error::NotStream(entity.name().to_string()));
        }
        if entity.size() == 0 {
            return Ok(Stream::empty(Arc::clone(&self.sink)));
        }
        if entity.size() < self.header.mini_size_limit as u64 {
            if self.mini_fat.is_empty() {
                return Err(Error::NoMiniFat);
            }
            let backing = self.normal_stream(self.root.start_sector, Some(self.root.size()))?;
            Stream::new_mini(
                backing,
                &self.mini_fat,
                self.header.mini_sector_size,
                entity.start_sector,
                Some(entity.size()),
                Arc::clone(&self.sink),
            )
        } else {
            self.normal_stream(entity.start_sector, Some(entity.size()))
        }
    }

    /// Releases the file image and all tables. Streams already opened share
    /// the image and stay readable until they are dropped in turn.
    pub fn close(self) {}

    pub(crate) fn normal_stream(&self, start: u32, declared: Option<u64>) -> Result<Stream> {
        Stream::new_normal(
            Arc::clone(&self.data),
            &self.normal_fat,
            self.header.sector_size,
            self.header.header_size(),
            start,
            declared,
            Arc::clone(&self.sink),
        )
    }
}
