//! Durable storage backend for strata indices.
//!
//! ## Format
//! Each persistent map is stored as a pair of files:
//! - `<name>.map` — a snapshot: a fixed header (magic, format version, record
//!   count, truncated blake3 payload hash) followed by length-prefixed records
//! - `<name>.log` — a write-ahead log of put/remove records appended between
//!   snapshots
//!
//! All integers are little-endian. Keys and values are serialized through
//! caller-supplied [`DataExternalizer`]s, so the map itself is agnostic to the
//! key and value types.
//!
//! A truncated log tail (torn write on crash) is tolerated: replay stops at
//! the last complete record and the tail is discarded. A snapshot whose
//! payload hash does not match its header is a hard [`StorageError`] and is
//! surfaced to the caller, which typically wipes and rebuilds the index.

mod codec;
mod map;
mod versioned;

use std::io;

use thiserror::Error;

pub use codec::{
    read_varint, write_varint, DataExternalizer, I64Externalizer, StringExternalizer,
    U32Externalizer, UnitExternalizer,
};
pub use map::PersistentMap;
pub use versioned::{RegisterOutcome, VersionedStore};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid snapshot header: {0}")]
    InvalidHeader(&'static str),
    #[error("incompatible map format version: expected {expected}, found {found}")]
    WrongFormat { expected: u32, found: u32 },
    #[error("truncated snapshot: expected at least {expected} bytes, found {found}")]
    Truncated { expected: u64, found: u64 },
    #[error("snapshot payload hash mismatch: expected {expected}, found {found}")]
    HashMismatch { expected: u64, found: u64 },
}
