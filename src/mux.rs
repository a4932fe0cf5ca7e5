//! Fanning a mixed stream of records out to their series.
//!
//! The multiplexer keeps one [`SeriesWriter`] per series seen so far,
//! creating each lazily through a [`WriterFactory`] on first use. A failed
//! append affects only its own record: the error is published on a side
//! channel and the multiplexer keeps accepting records for every series,
//! including the one that failed.

use std::collections::hash_map::Entry as MapEntry;
use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::warn;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::model::{validate_series_name, RoutedRecord};
use crate::writer::{RecordSink, SeriesWriter};

/// Creates series writers on demand.
#[async_trait]
pub trait WriterFactory: Send + Sync {
    async fn create_writer(&self, series: &str) -> Result<SeriesWriter>;
}

/// Opens writers for series stored in one directory.
pub struct DirWriterFactory {
    dir: PathBuf,
    config: Config,
}

impl DirWriterFactory {
    pub fn new(dir: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            dir: dir.into(),
            config,
        }
    }
}

#[async_trait]
impl WriterFactory for DirWriterFactory {
    async fn create_writer(&self, series: &str) -> Result<SeriesWriter> {
        SeriesWriter::open(&self.dir, series, &self.config).await
    }
}

/// Routes series-tagged records to per-series writers.
pub struct Multiplexer<F: WriterFactory> {
    factory: F,
    writers: HashMap<String, SeriesWriter>,
    error_tx: mpsc::UnboundedSender<Error>,
    error_rx: Option<mpsc::UnboundedReceiver<Error>>,
}

impl<F: WriterFactory> Multiplexer<F> {
    pub fn new(factory: F) -> Self {
        let (error_tx, error_rx) = mpsc::unbounded_channel();
        Self {
            factory,
            writers: HashMap::new(),
            error_tx,
            error_rx: Some(error_rx),
        }
    }

    /// Takes the receiving end of the error channel. Yields `None` once the
    /// multiplexer has been dropped or closed.
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<Error>> {
        self.error_rx.take()
    }

    /// Appends one record to its series.
    ///
    /// A malformed series name is rejected to the caller. Everything else
    /// that can go wrong concerns only the routed record, so it is reported
    /// on the error channel and the call succeeds.
    pub async fn write(&mut self, record: RoutedRecord) -> Result<()> {
        validate_series_name(&record.series)?;
        if let Err(e) = self.dispatch(record).await {
            warn!(error = %e, "record dropped by multiplexer");
            let _ = self.error_tx.send(e);
        }
        Ok(())
    }

    async fn dispatch(&mut self, record: RoutedRecord) -> Result<()> {
        let Self {
            factory, writers, ..
        } = self;
        let writer = match writers.entry(record.series) {
            MapEntry::Occupied(occupied) => occupied.into_mut(),
            MapEntry::Vacant(vacant) => {
                let writer = factory.create_writer(vacant.key()).await?;
                vacant.insert(writer)
            }
        };
        writer.write(record.record).await?;
        Ok(())
    }

    /// Closes every writer opened so far. Idempotent.
    pub async fn close(&mut self) -> Result<()> {
        let mut first_error = None;
        for (_, mut writer) in self.writers.drain() {
            if let Err(e) = RecordSink::close(&mut writer).await {
                first_error.get_or_insert(e);
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<F: WriterFactory> RecordSink for Multiplexer<F> {
    type Item = RoutedRecord;

    async fn write(&mut self, item: RoutedRecord) -> Result<()> {
        Multiplexer::write(self, item).await
    }

    async fn close(&mut self) -> Result<()> {
        Multiplexer::close(self).await
    }
}
