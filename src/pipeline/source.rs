//! Reading source abstraction.
//!
//! Provides a unified trait for receiving sensor readings from different
//! producers: the in-process simulator (channel) and JSON lines on stdin.
//! Each event carries one tick: all readings produced at the same instant.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc;

use crate::types::SensorReading;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid reading on line {line}: {source}")]
    Decode {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Events produced by a reading source.
#[derive(Debug)]
pub enum ReadingEvent {
    /// Readings belonging to one tick (never empty).
    Tick(Vec<SensorReading>),
    /// The source is exhausted.
    Eof,
}

/// Trait abstracting where readings come from.
///
/// The processing loop calls [`next_tick`](ReadingSource::next_tick) in a
/// `select!` next to its timers, so implementations must be cancellation
/// safe: dropping the future must not lose input.
#[async_trait]
pub trait ReadingSource: Send + 'static {
    async fn next_tick(&mut self) -> Result<ReadingEvent, SourceError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// Channel Source (in-process simulator)
// ============================================================================

/// Receives tick batches from an in-process producer.
pub struct ChannelSource {
    rx: mpsc::Receiver<Vec<SensorReading>>,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Vec<SensorReading>>) -> Self {
        Self { rx }
    }

    /// Create a bounded channel and its source end.
    pub fn channel(capacity: usize) -> (mpsc::Sender<Vec<SensorReading>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self::new(rx))
    }
}

#[async_trait]
impl ReadingSource for ChannelSource {
    async fn next_tick(&mut self) -> Result<ReadingEvent, SourceError> {
        loop {
            match self.rx.recv().await {
                Some(batch) if batch.is_empty() => continue,
                Some(batch) => return Ok(ReadingEvent::Tick(batch)),
                None => return Ok(ReadingEvent::Eof),
            }
        }
    }

    fn source_name(&self) -> &str {
        "simulator"
    }
}

// ============================================================================
// Stdin Source (JSON readings, one per line)
// ============================================================================

/// A line is either one reading or a whole tick.
#[derive(Deserialize)]
#[serde(untagged)]
enum ReadingLine {
    One(SensorReading),
    Many(Vec<SensorReading>),
}

/// Decode one JSON line into a tick batch.
pub fn parse_line(line: &str, line_no: usize) -> Result<Vec<SensorReading>, SourceError> {
    let parsed: ReadingLine = serde_json::from_str(line).map_err(|source| SourceError::Decode {
        line: line_no,
        source,
    })?;
    Ok(match parsed {
        ReadingLine::One(r) => vec![r],
        ReadingLine::Many(batch) => batch,
    })
}

/// Reads JSON readings line by line from any buffered async reader.
///
/// Lines are framed by [`tokio::io::Lines`], which keeps a partly read line
/// across a dropped `next_tick` future, so the loop's timers can interrupt
/// a read without losing input.
pub struct LineSource<R> {
    lines: Lines<R>,
    line_no: usize,
    name: &'static str,
}

impl<R: AsyncBufRead + Unpin + Send + 'static> LineSource<R> {
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            name,
        }
    }
}

/// JSON readings on stdin.
///
/// Used with the simulation binary:
/// `simulation --seed 7 | seismos --stdin`
pub type StdinSource = LineSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send + 'static> ReadingSource for LineSource<R> {
    async fn next_tick(&mut self) -> Result<ReadingEvent, SourceError> {
        loop {
            let Some(line) = self.lines.next_line().await? else {
                return Ok(ReadingEvent::Eof);
            };
            self.line_no += 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match parse_line(line, self.line_no) {
                Ok(batch) if batch.is_empty() => continue,
                Ok(batch) => return Ok(ReadingEvent::Tick(batch)),
                Err(e) => {
                    // Malformed lines are a producer bug; skip and keep reading
                    tracing::warn!(error = %e, "Dropping unreadable input line");
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_parse_single_and_batch() {
        let r = SensorReading::from_axes("node-1", 0.1, 0.2, 0.3, Utc::now());
        let one = serde_json::to_string(&r).unwrap();
        assert_eq!(tokio_test::assert_ok!(parse_line(&one, 1)).len(), 1);

        let many = serde_json::to_string(&vec![r.clone(), r]).unwrap();
        assert_eq!(tokio_test::assert_ok!(parse_line(&many, 2)).len(), 2);
    }

    #[test]
    fn test_parse_error_reports_line() {
        let err = tokio_test::assert_err!(parse_line("{not json", 7));
        assert!(matches!(err, SourceError::Decode { line: 7, .. }));
        assert!(err.to_string().contains("line 7"));
    }

    #[tokio::test]
    async fn test_channel_source_skips_empty_batches_and_ends() {
        let (tx, mut source) = ChannelSource::channel(4);
        let r = SensorReading::from_axes("node-1", 0.0, 0.0, 1.0, Utc::now());
        tx.send(Vec::new()).await.unwrap();
        tx.send(vec![r]).await.unwrap();
        drop(tx);

        match source.next_tick().await.unwrap() {
            ReadingEvent::Tick(batch) => assert_eq!(batch.len(), 1),
            ReadingEvent::Eof => panic!("expected a tick"),
        }
        assert!(matches!(source.next_tick().await.unwrap(), ReadingEvent::Eof));
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_source_keeps_partial_line_when_interrupted() {
        let batch = vec![
            SensorReading::from_axes("node-1", 0.0, 0.0, 1.2, Utc::now()),
            SensorReading::from_axes("node-2", 0.0, 0.0, 1.3, Utc::now()),
        ];
        let line = format!("{}\n", serde_json::to_string(&batch).unwrap());
        let (head, tail) = line.as_bytes().split_at(line.len() / 2);

        let reader = tokio_test::io::Builder::new()
            .read(head)
            .wait(std::time::Duration::from_millis(100))
            .read(tail)
            .build();
        let mut source = LineSource::new(BufReader::new(reader), "test");

        // A timer fires while the line is half read
        tokio::select! {
            _ = source.next_tick() => panic!("line is not complete yet"),
            _ = tokio::time::sleep(std::time::Duration::from_millis(10)) => {}
        }

        match source.next_tick().await.unwrap() {
            ReadingEvent::Tick(readings) => {
                assert_eq!(readings.len(), 2);
                assert_eq!(readings[1].node_id, "node-2");
            }
            ReadingEvent::Eof => panic!("expected the interrupted tick"),
        }
        assert!(matches!(source.next_tick().await.unwrap(), ReadingEvent::Eof));
    }

    #[tokio::test]
    async fn test_line_source_skips_blank_and_malformed_lines() {
        let r = SensorReading::from_axes("node-1", 0.0, 0.0, 0.4, Utc::now());
        let input = format!("\n{{oops\n{}\n", serde_json::to_string(&r).unwrap());
        let reader = BufReader::new(std::io::Cursor::new(input.into_bytes()));
        let mut source = LineSource::new(reader, "test");

        match source.next_tick().await.unwrap() {
            ReadingEvent::Tick(readings) => assert_eq!(readings.len(), 1),
            ReadingEvent::Eof => panic!("expected a tick"),
        }
        assert!(matches!(source.next_tick().await.unwrap(), ReadingEvent::Eof));
    }
}
