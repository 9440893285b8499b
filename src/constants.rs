use std::marker::Unpin;
use tokio::io::AsyncRead;

pub trait Readable: Unpin + AsyncRead {}
impl Readable for tokio::fs::File {}

pub const HEADER_LENGTH: usize = 512;
pub const RAW_HEADER_LENGTH: usize = 76;
pub const MAGIC_BYTES: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;
pub const EXPECTED_MINOR_VERSION: u16 = 0x3E;

// Special sector IDs
pub const FREE_SECTOR: u32 = 0xFFFF_FFFF;
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const NORMAL_FAT_SECTOR: u32 = 0xFFFF_FFFD;
pub const MASTER_FAT_SECTOR: u32 = 0xFFFF_FFFC;
pub const MAX_NORMAL_SECTOR: u32 = 0xFFFF_FFFA;

// Directory entry IDs
pub const NO_STREAM: u32 = 0xFFFF_FFFF;

pub const DIR_INVALID: u8 = 0;
pub const DIR_STORAGE: u8 = 1;
pub const DIR_STREAM: u8 = 2;
pub const DIR_ROOT: u8 = 5;

pub const SIZE_OF_DIRECTORY_ENTRY: usize = 128;
pub const MASTER_FAT_INLINE_ENTRIES: usize = 109;

// Allocation-table growth ceiling; anything bigger is assumed malicious.
pub const FAT_SIZE_LIMIT: u64 = 100 * 1024 * 1024;
