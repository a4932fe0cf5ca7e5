//! Merging several series into one globally time-ordered stream.
//!
//! The demultiplexer holds one slot per source reader. Each slot buffers at
//! most one entry; each read emits the buffered entry with the lowest
//! timestamp, ties going to the lowest slot. A source with nothing buffered
//! does not hold the merge back: the output is ordered over what the sources
//! have published so far, so records already on disk come out sorted while a
//! quiet series never stalls the live ones.
//!
//! Blocking reads against sources that have no data yet run as background
//! tasks and only rejoin the merge once they come back with an entry.

use std::future::Future;
use std::mem;
use std::path::Path;
use std::pin::Pin;
use std::task::Poll;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle};
use tracing::debug;

use crate::config::{Config, ScanOptions};
use crate::error::{Error, Result};
use crate::model::{Entry, Timestamp};
use crate::reader::{EntryRead, SeriesReader};

type ReadOutcome = (SeriesReader, Result<Option<Entry>>);

enum Source {
    /// Reader at rest, available for the next read.
    Idle(SeriesReader),
    /// Reader loaned to a background blocking read.
    Reading(JoinHandle<ReadOutcome>),
    /// Reader gone, either closed or lost to a failed task.
    Done,
}

struct Slot {
    source: Source,
    buffered: Option<Entry>,
    exhausted: bool,
}

impl Slot {
    fn new(reader: SeriesReader) -> Self {
        Self {
            source: Source::Idle(reader),
            buffered: None,
            exhausted: false,
        }
    }

    /// A slot is resolved once it either buffers an entry or is known to
    /// have nothing more to give.
    fn resolved(&self) -> bool {
        self.buffered.is_some() || self.finished()
    }

    /// A slot is finished once its reader can produce nothing more.
    fn finished(&self) -> bool {
        self.exhausted || matches!(self.source, Source::Done)
    }

    fn apply(&mut self, result: Result<Option<Entry>>) -> Result<()> {
        match result {
            Ok(Some(entry)) => self.buffered = Some(entry),
            Ok(None) => self.exhausted = true,
            Err(e) if e.is_would_block() => {}
            Err(e) => return Err(e),
        }
        Ok(())
    }
}

/// Merges a fixed set of series readers into one time-ordered stream.
pub struct Demultiplexer {
    inner: Mutex<DemuxInner>,
}

struct DemuxInner {
    slots: Vec<Slot>,
    closed: bool,
}

impl Demultiplexer {
    /// Merges the given readers.
    pub fn new(readers: Vec<SeriesReader>) -> Self {
        Self {
            inner: Mutex::new(DemuxInner {
                slots: readers.into_iter().map(Slot::new).collect(),
                closed: false,
            }),
        }
    }

    /// Opens a reader per name in `dir`, all with the same options.
    pub async fn open(
        dir: impl AsRef<Path>,
        names: &[&str],
        options: ScanOptions,
        config: &Config,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let mut readers = Vec::with_capacity(names.len());
        for name in names {
            readers.push(SeriesReader::open(dir, name, options.clone(), config).await?);
        }
        Ok(Self::new(readers))
    }

    /// Returns the next entry, the lowest timestamp among what the sources
    /// have resolved.
    ///
    /// `None` means every source is exhausted. Without `blocking`, having no
    /// candidate at all surfaces as [`Error::WouldBlock`] instead of
    /// waiting.
    pub async fn read(&self, blocking: bool) -> Result<Option<Entry>> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Err(Error::Closed);
        }

        loop {
            inner.harvest().await?;

            // Fill what can be filled without waiting.
            for slot in inner.slots.iter_mut().filter(|s| !s.resolved()) {
                if let Source::Idle(reader) = &mut slot.source {
                    let result = reader.read(false).await;
                    slot.apply(result)?;
                }
            }

            if let Some(entry) = inner.take_lowest() {
                return Ok(Some(entry));
            }
            if inner.slots.iter().all(Slot::finished) {
                return Ok(None);
            }
            if !blocking {
                return Err(Error::WouldBlock);
            }

            // Park the unresolved readers in background blocking reads and
            // wait for the first of them to come back.
            for slot in inner.slots.iter_mut().filter(|s| !s.resolved()) {
                if matches!(slot.source, Source::Idle(_)) {
                    let Source::Idle(mut reader) = mem::replace(&mut slot.source, Source::Done)
                    else {
                        unreachable!()
                    };
                    slot.source = Source::Reading(tokio::spawn(async move {
                        let result = reader.read(true).await;
                        (reader, result)
                    }));
                }
            }
            inner.settle_one().await?;
        }
    }

    /// Closes every reader. In-flight background reads are aborted.
    /// Idempotent.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        let mut first_error = None;
        for slot in &mut inner.slots {
            match mem::replace(&mut slot.source, Source::Done) {
                Source::Idle(mut reader) => {
                    if let Err(e) = reader.close().await {
                        first_error.get_or_insert(e);
                    }
                }
                Source::Reading(handle) => handle.abort(),
                Source::Done => {}
            }
        }
        debug!(slots = inner.slots.len(), "demultiplexer closed");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl DemuxInner {
    /// Reclaims readers from background reads that have already finished.
    async fn harvest(&mut self) -> Result<()> {
        for slot in &mut self.slots {
            let finished = matches!(&slot.source, Source::Reading(h) if h.is_finished());
            if finished {
                let Source::Reading(handle) = mem::replace(&mut slot.source, Source::Done) else {
                    unreachable!()
                };
                Self::settle_slot(slot, handle.await)?;
            }
        }
        Ok(())
    }

    /// Waits until one background read completes and folds it into its slot.
    async fn settle_one(&mut self) -> Result<()> {
        let (n, joined) = std::future::poll_fn(|cx| {
            for (n, slot) in self.slots.iter_mut().enumerate() {
                if let Source::Reading(handle) = &mut slot.source {
                    if let Poll::Ready(joined) = Pin::new(handle).poll(cx) {
                        return Poll::Ready((n, joined));
                    }
                }
            }
            Poll::Pending
        })
        .await;

        // The completed handle must not be polled again.
        let slot = &mut self.slots[n];
        slot.source = Source::Done;
        Self::settle_slot(slot, joined)
    }

    fn settle_slot(
        slot: &mut Slot,
        joined: std::result::Result<ReadOutcome, JoinError>,
    ) -> Result<()> {
        let (reader, result) = joined.map_err(|e| Error::TaskFailed(e.to_string()))?;
        slot.source = Source::Idle(reader);
        slot.apply(result)
    }

    /// Takes the buffered entry with the lowest timestamp, lowest slot
    /// winning ties. `None` when nothing is buffered anywhere.
    fn take_lowest(&mut self) -> Option<Entry> {
        let mut lowest: Option<(usize, Timestamp)> = None;
        for (n, slot) in self.slots.iter().enumerate() {
            if let Some(entry) = &slot.buffered {
                if lowest.map_or(true, |(_, ts)| entry.timestamp < ts) {
                    lowest = Some((n, entry.timestamp));
                }
            }
        }
        lowest.and_then(|(n, _)| self.slots[n].buffered.take())
    }
}

#[async_trait]
impl EntryRead for Demultiplexer {
    async fn read(&mut self, blocking: bool) -> Result<Option<Entry>> {
        Demultiplexer::read(self, blocking).await
    }

    async fn close(&mut self) -> Result<()> {
        Demultiplexer::close(self).await
    }
}
