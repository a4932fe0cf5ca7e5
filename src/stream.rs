//! Channel adapters bridging readers and sinks to streaming consumers.
//!
//! Both adapters move the blocking storage calls onto a background task and
//! expose a bounded channel of capacity [`STREAM_CAPACITY`], so a slow
//! consumer backpressures the reader and a fast producer backpressures on
//! the writer.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::error::Result;
use crate::model::Entry;
use crate::reader::EntryRead;
use crate::writer::RecordSink;

/// Capacity of the adapter channels, in items.
pub const STREAM_CAPACITY: usize = 16;

/// Pumps a reader into a bounded channel.
///
/// The channel yields each entry in order and closes after the source is
/// exhausted or the first error has been delivered. Dropping the receiver
/// stops the pump. The reader is closed when the pump ends, whichever way.
pub fn stream_entries<R>(mut reader: R) -> mpsc::Receiver<Result<Entry>>
where
    R: EntryRead + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
    tokio::spawn(async move {
        loop {
            match reader.read(true).await {
                Ok(Some(entry)) => {
                    if tx.send(Ok(entry)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
        if let Err(e) = reader.close().await {
            warn!(error = %e, "failed to close streamed reader");
        }
    });
    rx
}

/// Drains a bounded channel into a sink.
///
/// Returns the sending end and a handle resolving to the overall outcome
/// once the channel closes. The first write error stops the drain; the sink
/// is closed exactly once either way, and the handle reports the write
/// error over the close error when both occur.
pub fn sink_records<W>(mut writer: W) -> (mpsc::Sender<W::Item>, JoinHandle<Result<()>>)
where
    W: RecordSink + 'static,
{
    let (tx, mut rx) = mpsc::channel(STREAM_CAPACITY);
    let handle = tokio::spawn(async move {
        let mut outcome = Ok(());
        while let Some(item) = rx.recv().await {
            if let Err(e) = writer.write(item).await {
                rx.close();
                outcome = Err(e);
                break;
            }
        }
        let closed = writer.close().await;
        outcome.and(closed)
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ScanOptions};
    use crate::error::Error;
    use crate::model::{Record, RoutedRecord};
    use crate::mux::{DirWriterFactory, Multiplexer};
    use crate::reader::SeriesReader;
    use crate::writer::SeriesWriter;
    use bytes::Bytes;
    use tempfile::tempdir;

    #[tokio::test]
    async fn should_stream_a_snapshot_to_completion() {
        // given
        let dir = tempdir().unwrap();
        let mut writer = SeriesWriter::open(dir.path(), "s", &Config::default())
            .await
            .unwrap();
        for ts in [1, 2, 3] {
            writer
                .write(Record::with_timestamp(ts, Bytes::from_static(b"v")))
                .await
                .unwrap();
        }
        RecordSink::close(&mut writer).await.unwrap();
        let reader = SeriesReader::open(
            dir.path(),
            "s",
            ScanOptions::snapshot(),
            &Config::default(),
        )
        .await
        .unwrap();

        // when
        let mut rx = stream_entries(reader);
        let mut seen = Vec::new();
        while let Some(entry) = rx.recv().await {
            seen.push(entry.unwrap().timestamp);
        }

        // then the channel ends after the last entry
        assert_eq!(seen, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn should_drain_records_into_the_sink() {
        // given
        let dir = tempdir().unwrap();
        let writer = SeriesWriter::open(dir.path(), "s", &Config::default())
            .await
            .unwrap();
        let (tx, handle) = sink_records(writer);

        // when
        for ts in [5, 6] {
            tx.send(Record::with_timestamp(ts, Bytes::from_static(b"v")))
                .await
                .unwrap();
        }
        drop(tx);
        handle.await.unwrap().unwrap();

        // then
        let mut reader = SeriesReader::open(
            dir.path(),
            "s",
            ScanOptions::snapshot(),
            &Config::default(),
        )
        .await
        .unwrap();
        let mut seen = Vec::new();
        while let Some(entry) = reader.read(true).await.unwrap() {
            seen.push(entry.timestamp);
        }
        assert_eq!(seen, vec![5, 6]);
    }

    #[tokio::test]
    async fn should_surface_the_first_write_error() {
        // given
        let dir = tempdir().unwrap();
        let writer = SeriesWriter::open(dir.path(), "s", &Config::default())
            .await
            .unwrap();
        let (tx, handle) = sink_records(writer);

        // when the second record is out of order
        tx.send(Record::with_timestamp(10, Bytes::from_static(b"a")))
            .await
            .unwrap();
        tx.send(Record::with_timestamp(10, Bytes::from_static(b"b")))
            .await
            .unwrap();
        drop(tx);
        let outcome = handle.await.unwrap();

        // then
        assert!(matches!(outcome, Err(Error::NonMonotonic { .. })));
    }

    #[tokio::test]
    async fn should_sink_routed_records_through_a_multiplexer() {
        // given
        let dir = tempdir().unwrap();
        let mux = Multiplexer::new(DirWriterFactory::new(dir.path(), Config::default()));
        let (tx, handle) = sink_records(mux);

        // when
        tx.send(RoutedRecord::new(
            "a",
            Record::with_timestamp(1, Bytes::from_static(b"v")),
        ))
        .await
        .unwrap();
        tx.send(RoutedRecord::new(
            "b",
            Record::with_timestamp(2, Bytes::from_static(b"v")),
        ))
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap().unwrap();

        // then both series exist on disk
        assert!(dir.path().join("idx-a").exists());
        assert!(dir.path().join("idx-b").exists());
    }
}
