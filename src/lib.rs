//! serieslog is an embedded, append-only storage engine for named series of
//! timestamped records, with a k-way merge for reading many series as one
//! time-ordered stream and a fan-out for writing one mixed stream to many
//! series.
//!
//! # Architecture
//!
//! Each series is a pair of files in a directory: a fixed-block index
//! ordered by timestamp and a data file of raw payloads. On top of the pair
//! sit four layers:
//!
//! * [`SeriesStore`], the record-level engine (append, read by number,
//!   timestamp search)
//! * [`SeriesWriter`] and [`SeriesReader`], the exclusive appender and the
//!   bounded, optionally following scanner of one series
//! * [`Demultiplexer`], merging many readers into one globally ordered
//!   stream, and [`Multiplexer`], routing a mixed record stream out to
//!   per-series writers
//! * the channel adapters in [`stream`], bridging either end to bounded
//!   `mpsc` channels
//!
//! # Key concepts
//!
//! Timestamps are milliseconds since the Unix epoch, strictly increasing
//! within a series and limited to 48 bits. Payloads are opaque bytes; the
//! index carries their location and length. One writer per series at a
//! time, any number of readers, enforced with file locks so the guarantee
//! holds across processes.
//!
//! # Example
//!
//! ```ignore
//! use serieslog::{Config, Record, ScanOptions, SeriesReader, SeriesWriter};
//! use serieslog::EntryRead;
//!
//! let config = Config::default();
//! let mut writer = SeriesWriter::open("/var/lib/serieslog", "temperature", &config).await?;
//! writer.write(Record::new(b"21.5".to_vec())).await?;
//!
//! let mut reader = SeriesReader::open(
//!     "/var/lib/serieslog",
//!     "temperature",
//!     ScanOptions::snapshot(),
//!     &config,
//! )
//! .await?;
//! while let Some(entry) = reader.read(true).await? {
//!     println!("{} {:?}", entry.timestamp, entry.value);
//! }
//! ```

mod block;
mod clock;
mod config;
mod demux;
mod error;
mod file;
mod model;
mod mux;
mod reader;
mod serde;
mod series;
pub mod stream;
mod writer;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{Config, ScanOptions, DEFAULT_POLL_INTERVAL, DEFAULT_READ_AHEAD};
pub use demux::Demultiplexer;
pub use error::{Error, Result};
pub use model::{Access, Entry, Record, RoutedRecord, Timestamp, MAX_TIMESTAMP};
pub use mux::{DirWriterFactory, Multiplexer, WriterFactory};
pub use reader::{EntryRead, SeriesReader};
pub use series::SeriesStore;
pub use stream::STREAM_CAPACITY;
pub use writer::{RecordSink, SeriesWriter};
