//! Strata - the storage and concurrency core of a disk-oriented
//! relational database engine.
//!
//! The crate is built from three tightly coupled subsystems plus the
//! executor surface the query engine above composes against:
//!
//! - **Buffer pool** (`buffer`): fixed-size frame cache over the disk
//!   file with LRU victim selection; [`buffer::BufferPoolInstance`] for
//!   a single pool, [`buffer::ParallelBufferPool`] to stripe the page
//!   id space across several instances. Pages are accessed through
//!   RAII read/write guards that pin the page and hold its latch.
//! - **Extendible hash table** (`index`): a disk-resident hash index
//!   whose directory and buckets live on buffer-pool pages, with
//!   directory doubling, bucket splits, and reverse merges under a
//!   two-level latching protocol.
//! - **Lock manager** (`concurrency`): row-level two-phase locking
//!   under three isolation levels with wound-wait deadlock prevention,
//!   plus the transaction manager driving begin/commit/abort.
//! - **Executors** (`execution`): Volcano-style operators (scan,
//!   insert, update, delete, aggregation, distinct, hash join) over a
//!   linked-page table heap (`storage`).
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata::buffer::{BufferPool, BufferPoolInstance};
//! use strata::index::{ExtendibleHashTable, OrdComparator};
//! use strata::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("demo.db").unwrap());
//! let bpm: Arc<dyn BufferPool> = Arc::new(BufferPoolInstance::new(64, disk_manager));
//!
//! let table: ExtendibleHashTable<u32, u32, _> =
//!     ExtendibleHashTable::new(bpm, OrdComparator).unwrap();
//! table.insert(&1, &100).unwrap();
//! assert_eq!(table.get_value(&1).unwrap(), vec![100]);
//! ```

pub mod buffer;
pub mod common;
pub mod concurrency;
pub mod execution;
pub mod index;
pub mod storage;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, RecordId, Result, SlotId, StrataError, TxnId};
