// Local crates
use crate::parser::stats::TransferStats;

// External crates
use lazy_static::lazy_static;
use regex::Regex;
use std::io;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::instrument;

const SENT_PREFIX: &str = "sent ";
const TOTAL_SIZE_PREFIX: &str = "total size is ";

lazy_static! {
    /// `sent 1,192,097 bytes  received 1,039 bytes  795,424.00 bytes/sec`
    static ref SENT_LINE: Regex = Regex::new(
        r"^sent ([0-9.,]+) bytes  received ([0-9.,]+) bytes  ([0-9.,]+) bytes/sec$"
    ).unwrap();

    /// `total size is 1,188,046  speedup is 1.00`, with the `(DRY RUN)` suffix
    /// rsync appends under `--dry-run`
    static ref TOTAL_SIZE_LINE: Regex = Regex::new(
        r"^total size is ([0-9.,]+)  speedup is ([0-9.,]+)(?: \(DRY RUN\))?$"
    ).unwrap();
}

/// Errors produced while extracting transfer totals.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The underlying stream failed before a clean end of file.
    #[error("failed to read rsync output: {0}")]
    Io(#[from] io::Error),
    /// A summary line matched, but one of its numbers does not convert.
    /// Usually a localized rsync (`1.192.097`) or `--human-readable` output.
    #[error("invalid {field} value {value:?} in summary line {line:?}")]
    InvalidNumber {
        /// Name of the field the number was meant for.
        field: &'static str,
        /// The token as printed by rsync.
        value: String,
        /// The full offending line.
        line: String,
    },
}

/// One recognized rsync summary line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SummaryLine {
    /// `sent <N> bytes  received <N> bytes  <R> bytes/sec`
    Transfer {
        /// Bytes sent.
        total_written: u64,
        /// Bytes received.
        total_read: u64,
        /// Reported throughput.
        bytes_per_sec: f64,
    },
    /// `total size is <N>  speedup is <R>`
    TotalSize {
        /// Total size of the processed source files.
        total_size: u64,
    },
}

/// Matches a single line of rsync output against the known summary shapes.
///
/// Returns `Ok(None)` for any other line (per-file listings, progress,
/// warnings). A line with the right shape but an unconvertible number is an
/// error, never a silently zeroed field.
pub fn match_summary_line(line: &str) -> Result<Option<SummaryLine>, ParseError> {
    if line.starts_with(SENT_PREFIX) {
        let Some(caps) = SENT_LINE.captures(line) else {
            return Ok(None);
        };
        return Ok(Some(SummaryLine::Transfer {
            total_written: parse_count("total_written", &caps[1], line)?,
            total_read: parse_count("total_read", &caps[2], line)?,
            bytes_per_sec: parse_rate("bytes_per_sec", &caps[3], line)?,
        }));
    }

    if line.starts_with(TOTAL_SIZE_PREFIX) {
        let Some(caps) = TOTAL_SIZE_LINE.captures(line) else {
            return Ok(None);
        };
        return Ok(Some(SummaryLine::TotalSize {
            total_size: parse_count("total_size", &caps[1], line)?,
        }));
    }

    Ok(None)
}

fn strip_grouping(token: &str) -> String {
    token.chars().filter(|c| *c != ',').collect()
}

fn invalid_number(field: &'static str, token: &str, line: &str) -> ParseError {
    tracing::error!(
        field,
        value = %token,
        summary_line = %line,
        "rsync summary line contains a number that cannot be converted"
    );
    ParseError::InvalidNumber {
        field,
        value: token.to_string(),
        line: line.to_string(),
    }
}

fn parse_count(field: &'static str, token: &str, line: &str) -> Result<u64, ParseError> {
    strip_grouping(token)
        .parse::<u64>()
        .map_err(|_| invalid_number(field, token, line))
}

fn parse_rate(field: &'static str, token: &str, line: &str) -> Result<f64, ParseError> {
    strip_grouping(token)
        .parse::<f64>()
        .map_err(|_| invalid_number(field, token, line))
}

/// Incremental accumulator behind [`parse`].
///
/// Each recognized line overwrites the fields it carries, so the last
/// occurrence of each shape wins.
#[derive(Debug, Default)]
pub struct StatsParser {
    stats: TransferStats,
}

impl StatsParser {
    /// Creates an accumulator with nothing found yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one line, without its trailing newline.
    pub fn feed_line(&mut self, line: &str) -> Result<(), ParseError> {
        match match_summary_line(line)? {
            Some(SummaryLine::Transfer {
                total_written,
                total_read,
                bytes_per_sec,
            }) => {
                tracing::debug!(
                    total_written,
                    total_read,
                    bytes_per_sec,
                    "Matched rsync transfer summary line"
                );
                self.stats.found = true;
                self.stats.total_written = total_written;
                self.stats.total_read = total_read;
                self.stats.bytes_per_sec = bytes_per_sec;
            }
            Some(SummaryLine::TotalSize { total_size }) => {
                tracing::debug!(total_size, "Matched rsync total size summary line");
                self.stats.found = true;
                self.stats.total_size = total_size;
            }
            None => {}
        }
        Ok(())
    }

    /// Returns what has been accumulated so far.
    #[must_use]
    pub fn finish(self) -> TransferStats {
        self.stats
    }
}

/// Reads `reader` to the end and extracts rsync transfer totals.
pub async fn parse<R>(reader: R) -> Result<TransferStats, ParseError>
where
    R: AsyncBufRead + Unpin,
{
    parse_with(reader, |_| {}).await
}

/// Like [`parse`], handing every line to `inspect` before matching it.
///
/// Lines are read one at a time into a reused buffer, so memory stays bounded
/// by the longest line. Invalid UTF-8 (file names in listings) is decoded
/// lossily rather than failing the whole run.
#[instrument(
    name = "rsync_prom_parser::parse",
    target = "parser::parser",
    skip_all,
    level = "debug"
)]
pub async fn parse_with<R, F>(mut reader: R, mut inspect: F) -> Result<TransferStats, ParseError>
where
    R: AsyncBufRead + Unpin,
    F: FnMut(&str),
{
    let mut parser = StatsParser::new();
    let mut buffer = Vec::with_capacity(256);
    let mut lines_read: u64 = 0;

    loop {
        buffer.clear();
        let n = match reader.read_until(b'\n', &mut buffer).await {
            Ok(n) => n,
            Err(e) => {
                tracing::error!(error = %e, lines_read, "Reading rsync output failed");
                return Err(e.into());
            }
        };
        if n == 0 {
            break;
        }

        let decoded = String::from_utf8_lossy(&buffer);
        let line = decoded.trim_end();
        inspect(line);
        parser.feed_line(line)?;
        lines_read += 1;
    }

    let stats = parser.finish();
    tracing::debug!(lines_read, found = stats.found, "Reached end of rsync output");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use tokio::io::{AsyncRead, BufReader, ReadBuf};

    const SUMMARY: &str = "\n\nsent 1,192,097 bytes  received 1,039 bytes  795,424.00 bytes/sec\n\
                           total size is 1,188,046  speedup is 1.00\n";

    #[tokio::test]
    async fn parses_both_summary_lines() {
        let stats = parse(SUMMARY.as_bytes()).await.unwrap();
        assert_eq!(
            stats,
            TransferStats {
                found: true,
                total_written: 1_192_097,
                total_read: 1_039,
                bytes_per_sec: 795_424.0,
                total_size: 1_188_046,
            }
        );
    }

    #[tokio::test]
    async fn summary_line_order_does_not_matter() {
        let input = "total size is 1,188,046  speedup is 738.83\n\
                     sent 1,590 bytes  received 18 bytes  3,216.00 bytes/sec\n";
        let stats = parse(input.as_bytes()).await.unwrap();
        assert_eq!(
            stats,
            TransferStats {
                found: true,
                total_written: 1_590,
                total_read: 18,
                bytes_per_sec: 3_216.0,
                total_size: 1_188_046,
            }
        );
    }

    #[tokio::test]
    async fn output_without_summary_is_not_found() {
        let input = "sending incremental file list\n\
                     ./\n\
                     docs/readme.txt\n\
                     sent a postcard to grandma\n";
        let stats = parse(input.as_bytes()).await.unwrap();
        assert_eq!(stats, TransferStats::default());
    }

    #[tokio::test]
    async fn empty_stream_is_not_an_error() {
        let stats = parse(&b""[..]).await.unwrap();
        assert!(!stats.found);
    }

    #[tokio::test]
    async fn single_shape_leaves_other_fields_zero() {
        let stats = parse(&b"total size is 42  speedup is 0.00"[..]).await.unwrap();
        assert!(stats.found);
        assert_eq!(stats.total_size, 42);
        assert_eq!(stats.total_written, 0);
        assert_eq!(stats.total_read, 0);
        assert_eq!(stats.bytes_per_sec, 0.0);
    }

    #[tokio::test]
    async fn last_occurrence_wins() {
        let input = "sent 10 bytes  received 1 bytes  5.00 bytes/sec\n\
                     sent 20 bytes  received 2 bytes  7.50 bytes/sec\n";
        let stats = parse(input.as_bytes()).await.unwrap();
        assert_eq!(stats.total_written, 20);
        assert_eq!(stats.total_read, 2);
        assert_eq!(stats.bytes_per_sec, 7.5);
    }

    #[tokio::test]
    async fn accepts_crlf_and_dry_run_suffix() {
        let input = "sent 1,590 bytes  received 18 bytes  3,216.00 bytes/sec\r\n\
                     total size is 1,188,046  speedup is 738.83 (DRY RUN)\r\n";
        let stats = parse(input.as_bytes()).await.unwrap();
        assert_eq!(stats.total_written, 1_590);
        assert_eq!(stats.total_size, 1_188_046);
    }

    #[tokio::test]
    async fn invalid_utf8_in_listing_is_tolerated() {
        let mut input = b"caf\xe9.txt\n".to_vec();
        input.extend_from_slice(b"total size is 7  speedup is 1.00\n");
        let stats = parse(&input[..]).await.unwrap();
        assert_eq!(stats.total_size, 7);
    }

    #[tokio::test]
    async fn localized_number_is_a_hard_error() {
        let input = "sent 1.192.097 bytes  received 1.039 bytes  795.424,00 bytes/sec\n";
        let err = parse(input.as_bytes()).await.unwrap_err();
        match err {
            ParseError::InvalidNumber { field, value, .. } => {
                assert_eq!(field, "total_written");
                assert_eq!(value, "1.192.097");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn overflowing_number_is_a_hard_error() {
        let input = "total size is 99,999,999,999,999,999,999,999  speedup is 1.00\n";
        assert!(matches!(
            parse(input.as_bytes()).await,
            Err(ParseError::InvalidNumber { field: "total_size", .. })
        ));
    }

    #[tokio::test]
    async fn inspector_sees_every_line() {
        let mut seen = Vec::new();
        parse_with(SUMMARY.as_bytes(), |line| seen.push(line.to_string()))
            .await
            .unwrap();
        assert_eq!(seen.len(), 4);
        assert_eq!(seen[0], "");
        assert!(seen[3].starts_with("total size is"));
    }

    struct FailAfterFirstRead {
        data: &'static [u8],
        served: bool,
    }

    impl AsyncRead for FailAfterFirstRead {
        fn poll_read(
            mut self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            if self.served {
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "rsync pipe closed",
                )));
            }
            buf.put_slice(self.data);
            self.served = true;
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn stream_error_propagates() {
        let reader = BufReader::new(FailAfterFirstRead {
            data: b"sent 1 bytes  received 1 bytes  1.00 bytes/sec\npartial",
            served: false,
        });
        assert!(matches!(parse(reader).await, Err(ParseError::Io(_))));
    }

    #[test]
    fn grouping_separators_are_stripped() {
        assert_eq!(
            match_summary_line("total size is 1,192,097  speedup is 2.00").unwrap(),
            Some(SummaryLine::TotalSize {
                total_size: 1_192_097
            })
        );
        assert_eq!(
            match_summary_line("sent 0 bytes  received 0 bytes  795,424.00 bytes/sec").unwrap(),
            Some(SummaryLine::Transfer {
                total_written: 0,
                total_read: 0,
                bytes_per_sec: 795_424.0,
            })
        );
    }

    #[test]
    fn prefix_without_full_shape_is_ignored() {
        assert_eq!(match_summary_line("sent 12 files to backup").unwrap(), None);
        assert_eq!(
            match_summary_line("total size is unknown  speedup is n/a").unwrap(),
            None
        );
        assert_eq!(
            match_summary_line("sent 1 bytes received 1 bytes 1.00 bytes/sec").unwrap(),
            None
        );
    }

    #[test]
    fn feed_line_accumulates_synchronously() {
        let mut parser = StatsParser::new();
        parser
            .feed_line("sent 1,590 bytes  received 18 bytes  3,216.00 bytes/sec")
            .unwrap();
        parser
            .feed_line("total size is 1,188,046  speedup is 738.83")
            .unwrap();
        let stats = parser.finish();
        assert!(stats.found);
        assert_eq!(stats.total_written, 1_590);
        assert_eq!(stats.total_read, 18);
        assert_eq!(stats.bytes_per_sec, 3_216.0);
        assert_eq!(stats.total_size, 1_188_046);
    }
}
