//! Persisting the configuration in a fixed block of flash.
//!
//! The block is laid out as
//!
//! | bytes  | contents                                   |
//! |--------|--------------------------------------------|
//! | 0..4   | magic, `b"tpen"`                           |
//! | 4..6   | format version, little-endian              |
//! | 6..8   | payload length, little-endian              |
//! | 8..12  | sum of the payload bytes, little-endian    |
//! | 12..   | the `postcard`-encoded [`Config`]          |

use embedded_storage::{ReadStorage, Storage};
use log::warn;

use crate::config::{Config, ConfigError};

pub const MAGIC: [u8; 4] = *b"tpen";
pub const VERSION: u16 = 1;
pub const BLOCK_SIZE: usize = 256;
const HEADER_LEN: usize = 12;

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("storage read or write failed")]
    Storage,
    #[error("no config record (bad magic)")]
    BadMagic,
    #[error("unsupported record version {0}")]
    UnsupportedVersion(u16),
    #[error("record length {0} doesn't fit the block")]
    BadLength(u16),
    #[error("checksum mismatch: stored {stored:#x}, computed {computed:#x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("config doesn't fit the block")]
    Encode,
    #[error("config record is corrupt")]
    Decode,
    #[error("stored config is invalid: {0}")]
    Invalid(#[from] ConfigError),
}

/// Additive checksum of the payload.
pub fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, b| acc.wrapping_add(*b as u32))
}

pub fn encode(config: &Config) -> Result<[u8; BLOCK_SIZE], StoreError> {
    let mut block = [0u8; BLOCK_SIZE];
    let len = postcard::to_slice(config, &mut block[HEADER_LEN..])
        .map_err(|_| StoreError::Encode)?
        .len();
    let sum = checksum(&block[HEADER_LEN..HEADER_LEN + len]);

    block[0..4].copy_from_slice(&MAGIC);
    block[4..6].copy_from_slice(&VERSION.to_le_bytes());
    block[6..8].copy_from_slice(&(len as u16).to_le_bytes());
    block[8..12].copy_from_slice(&sum.to_le_bytes());
    Ok(block)
}

pub fn decode(block: &[u8; BLOCK_SIZE]) -> Result<Config, StoreError> {
    if block[0..4] != MAGIC {
        return Err(StoreError::BadMagic);
    }
    let version = u16::from_le_bytes([block[4], block[5]]);
    if version != VERSION {
        return Err(StoreError::UnsupportedVersion(version));
    }
    let len = u16::from_le_bytes([block[6], block[7]]);
    if len as usize > BLOCK_SIZE - HEADER_LEN {
        return Err(StoreError::BadLength(len));
    }
    let stored = u32::from_le_bytes([block[8], block[9], block[10], block[11]]);
    let payload = &block[HEADER_LEN..HEADER_LEN + len as usize];
    let computed = checksum(payload);
    if stored != computed {
        return Err(StoreError::Checksum { stored, computed });
    }

    let config: Config = postcard::from_bytes(payload).map_err(|_| StoreError::Decode)?;
    config.validate()?;
    Ok(config)
}

pub fn save_config<S: Storage>(
    storage: &mut S,
    offset: u32,
    config: &Config,
) -> Result<(), StoreError> {
    let block = encode(config)?;
    storage
        .write(offset, &block)
        .map_err(|_| StoreError::Storage)
}

pub fn load_config<S: ReadStorage>(storage: &mut S, offset: u32) -> Result<Config, StoreError> {
    let mut block = [0u8; BLOCK_SIZE];
    storage
        .read(offset, &mut block)
        .map_err(|_| StoreError::Storage)?;
    decode(&block).inspect_err(|e| warn!("ignoring stored config: {e}"))
}
