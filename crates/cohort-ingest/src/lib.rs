//! Ingestion of delimited uploads into queryable Polars tables.
//!
//! A [`Loader`] decodes the raw bytes, checks the header and the shape of
//! every row, then loads the text with an in-memory or disk-backed
//! [`LoadStrategy`] chosen by a [`LoadPolicy`]. All columns are loaded as
//! text and every table carries a 1-based [`ROW_NUMBER_COLUMN`].

pub mod decode;
pub mod error;
pub mod loader;
pub mod policy;
pub mod shape;
pub mod strategy;
pub mod table;
pub mod upload;

pub use decode::{DecodedText, decode};
pub use error::{IngestError, Result};
pub use loader::{LoadedTable, Loader};
pub use policy::{
    DEFAULT_EXPANSION_FACTOR, DEFAULT_IN_MEMORY_CEILING_BYTES, DEFAULT_MEMORY_BUDGET_BYTES,
    IngestOptions, LoadPolicy, SelectionReason,
};
pub use shape::{Shape, normalize_header, scan_shape};
pub use strategy::{DiskBackedStrategy, InMemoryStrategy, LoadStrategy, PreparedCsv};
pub use table::{ROW_NUMBER_COLUMN, TableHandle};
pub use upload::{DEFAULT_ENCODING, RawUpload};
