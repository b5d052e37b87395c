// batching.rs
use anyhow::{Context, Result};
use log::{debug, info};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::address::extract_address;
use crate::config::{NoMatchPolicy, MAX_BATCH_SIZE};
use crate::geocoder::BatchSubmitter;
use crate::models::{AddressRecord, GeocodeResult, MatchStatus};
use crate::response::header_line;

/// Rows waiting to be submitted. Never holds more than `capacity` records.
#[derive(Debug)]
pub struct BatchBuffer {
    rows: Vec<AddressRecord>,
    capacity: usize,
}

impl BatchBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_BATCH_SIZE);
        Self {
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds a record; returns `true` once the buffer has reached capacity.
    pub fn push(&mut self, record: AddressRecord) -> bool {
        debug_assert!(self.rows.len() < self.capacity);
        self.rows.push(record);
        self.is_full()
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn take(&mut self) -> Vec<AddressRecord> {
        std::mem::replace(&mut self.rows, Vec::with_capacity(self.capacity))
    }
}

/// Lines to print for one flushed batch, plus what they contained.
#[derive(Debug, Default)]
pub struct FlushOutcome {
    pub submitted: usize,
    pub lines: Vec<String>,
    pub matched: usize,
    pub unmatched: usize,
    pub ties: usize,
}

/// Submits everything buffered and filters the response by `policy`.
/// The buffer is left empty. Any submission or parse failure is returned as is.
pub async fn flush<S>(buffer: &mut BatchBuffer, submitter: &S, policy: NoMatchPolicy) -> Result<FlushOutcome>
where
    S: BatchSubmitter + ?Sized,
{
    let batch = buffer.take();
    let mut outcome = FlushOutcome {
        submitted: batch.len(),
        ..Default::default()
    };
    let body = submitter.submit(&batch).await?;

    for line in body.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            continue;
        }
        let result = GeocodeResult::parse(line)?;
        match result.match_status {
            MatchStatus::Match => outcome.matched += 1,
            MatchStatus::NoMatch => outcome.unmatched += 1,
            MatchStatus::Tie => outcome.ties += 1,
        }
        if policy == NoMatchPolicy::Drop && result.match_status == MatchStatus::NoMatch {
            continue;
        }
        outcome.lines.push(line.to_string());
    }
    Ok(outcome)
}

/// Header rows start with `EIN`; whitespace-only lines are blank.
pub fn is_header_or_blank(line: &str) -> bool {
    line.trim().is_empty() || line.starts_with("EIN")
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResolverStats {
    pub rows: usize,
    pub batches: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub ties: usize,
    pub written: usize,
}

impl ResolverStats {
    fn record(&mut self, outcome: &FlushOutcome) {
        self.batches += 1;
        self.matched += outcome.matched;
        self.unmatched += outcome.unmatched;
        self.ties += outcome.ties;
        self.written += outcome.lines.len();
    }
}

fn write_outcome<W: Write>(out: &mut W, outcome: &FlushOutcome) -> Result<()> {
    for line in &outcome.lines {
        writeln!(out, "{}", line).context("Failed to write geocoder results")?;
    }
    out.flush().context("Failed to flush geocoder results")
}

/// Streams tab-delimited rows from `input` through the geocoder in batches of
/// at most `batch_size`, writing the header once and then each batch's result
/// lines to `out` as soon as that batch returns.
pub async fn run_resolver<R, W, S>(
    input: R,
    out: &mut W,
    submitter: &S,
    batch_size: usize,
    policy: NoMatchPolicy,
) -> Result<ResolverStats>
where
    R: AsyncBufRead + Unpin,
    W: Write,
    S: BatchSubmitter + ?Sized,
{
    let mut buffer = BatchBuffer::new(batch_size);
    let mut stats = ResolverStats::default();
    let mut lines = input.lines();
    let mut line_no = 0usize;

    writeln!(out, "{}", header_line()).context("Failed to write output header")?;

    while let Some(line) = lines.next_line().await.context("Failed to read input row")? {
        line_no += 1;
        let line = line.trim_end_matches('\r');
        if is_header_or_blank(line) {
            debug!("Skipping header/blank line {}", line_no);
            continue;
        }
        let record = extract_address(line).with_context(|| format!("Input line {}", line_no))?;
        stats.rows += 1;

        if buffer.push(record) {
            let outcome = flush(&mut buffer, submitter, policy)
                .await
                .with_context(|| format!("Batch {} failed", stats.batches + 1))?;
            stats.record(&outcome);
            info!(
                "Batch {}: {} addresses, {} matched, {} unmatched, {} ties",
                stats.batches, outcome.submitted, outcome.matched, outcome.unmatched, outcome.ties
            );
            write_outcome(out, &outcome)?;
        }
    }

    if buffer.is_empty() {
        debug!("No rows left for a final batch");
    } else {
        let outcome = flush(&mut buffer, submitter, policy)
            .await
            .with_context(|| format!("Final batch {} failed", stats.batches + 1))?;
        stats.record(&outcome);
        info!(
            "Final batch {}: {} addresses, {} matched, {} unmatched, {} ties",
            stats.batches, outcome.submitted, outcome.matched, outcome.unmatched, outcome.ties
        );
        write_outcome(out, &outcome)?;
    }

    out.flush().context("Failed to flush geocoder results")?;
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::tests::{row, street_row};
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::io::BufReader;

    /// Answers every address with a canned row and remembers what it was sent.
    /// Ids ending in `0` come back unmatched.
    #[derive(Default)]
    struct FakeGeocoder {
        batches: Mutex<Vec<Vec<AddressRecord>>>,
        fail_on_batch: Option<usize>,
    }

    impl FakeGeocoder {
        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl BatchSubmitter for FakeGeocoder {
        async fn submit(&self, batch: &[AddressRecord]) -> Result<String> {
            let mut batches = self.batches.lock().unwrap();
            batches.push(batch.to_vec());
            if self.fail_on_batch == Some(batches.len()) {
                bail!("Geocoder API error 503 Service Unavailable: try again later");
            }
            let lines: Vec<String> = batch
                .iter()
                .map(|r| {
                    if r.id.ends_with('0') {
                        format!("\"{}\",\"{}\",\"No_Match\"", r.id, r.street())
                    } else {
                        format!(
                            "\"{}\",\"{}\",\"Match\",\"Exact\",\"{}\",\"-87.5,41.7\",\"1\",\"R\",\"17\",\"031\",\"834300\",\"4009\"",
                            r.id,
                            r.street(),
                            r.street().to_uppercase()
                        )
                    }
                })
                .collect();
            Ok(lines.join("\n") + "\n")
        }
    }

    fn input(rows: usize) -> String {
        (1..=rows)
            .map(|i| street_row(&i.to_string(), &format!("{} Main St", i)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    async fn run(text: &str, geocoder: &FakeGeocoder, policy: NoMatchPolicy) -> Result<(ResolverStats, String)> {
        let mut out = Vec::new();
        let stats = run_resolver(BufReader::new(text.as_bytes()), &mut out, geocoder, MAX_BATCH_SIZE, policy).await?;
        Ok((stats, String::from_utf8(out).unwrap()))
    }

    #[test]
    fn buffer_reports_full_at_capacity() {
        let mut buffer = BatchBuffer::new(2);
        let rec = extract_address(&street_row("1", "1 Main St")).unwrap();
        assert!(!buffer.push(rec.clone()));
        assert!(buffer.push(rec));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.take().len(), 2);
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_capacity_never_exceeds_service_ceiling() {
        assert_eq!(BatchBuffer::new(5000).capacity(), MAX_BATCH_SIZE);
        assert_eq!(BatchBuffer::new(0).capacity(), 1);
    }

    #[test]
    fn header_and_blank_detection() {
        assert!(is_header_or_blank(""));
        assert!(is_header_or_blank("   "));
        assert!(is_header_or_blank("EIN\tNAME\tICO"));
        assert!(!is_header_or_blank(&street_row("1", "1 Main St")));
    }

    #[tokio::test]
    async fn fifteen_hundred_rows_make_two_batches_and_one_header() {
        let geocoder = FakeGeocoder::default();
        let (stats, out) = run(&input(1500), &geocoder, NoMatchPolicy::Keep).await.unwrap();

        assert_eq!(geocoder.batch_sizes(), vec![1000, 500]);
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.rows, 1500);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], header_line());
        assert_eq!(lines.iter().filter(|l| **l == header_line()).count(), 1);
        assert_eq!(lines.len(), 1 + 1500);
    }

    #[tokio::test]
    async fn exact_multiple_does_not_submit_an_empty_batch() {
        let geocoder = FakeGeocoder::default();
        let (stats, _) = run(&input(2000), &geocoder, NoMatchPolicy::Keep).await.unwrap();
        assert_eq!(geocoder.batch_sizes(), vec![1000, 1000]);
        assert_eq!(stats.batches, 2);
    }

    #[tokio::test]
    async fn empty_input_writes_only_the_header() {
        let geocoder = FakeGeocoder::default();
        let (stats, out) = run("EIN\tNAME\n\n", &geocoder, NoMatchPolicy::Keep).await.unwrap();
        assert!(geocoder.batch_sizes().is_empty());
        assert_eq!(stats, ResolverStats::default());
        assert_eq!(out, format!("{}\n", header_line()));
    }

    #[tokio::test]
    async fn header_and_blank_lines_do_not_count_toward_a_batch() {
        let mut text = String::from("EIN\tNAME\tSTREET\n");
        for i in 1..=1000 {
            text.push_str(&street_row(&i.to_string(), "1 Main St"));
            text.push_str("\n   \n\n");
        }
        let geocoder = FakeGeocoder::default();
        let (stats, _) = run(&text, &geocoder, NoMatchPolicy::Keep).await.unwrap();
        assert_eq!(geocoder.batch_sizes(), vec![1000]);
        assert_eq!(stats.rows, 1000);
    }

    #[tokio::test]
    async fn drop_policy_filters_no_match_rows_in_every_batch() {
        let geocoder = FakeGeocoder::default();
        let (stats, out) = run(&input(1500), &geocoder, NoMatchPolicy::Drop).await.unwrap();

        // ids 10, 20, ... 1500 are unmatched
        assert_eq!(stats.unmatched, 150);
        assert_eq!(stats.matched, 1350);
        assert_eq!(stats.written, 1350);
        assert!(!out.contains("No_Match"));
        assert_eq!(out.lines().count(), 1 + 1350);
    }

    #[tokio::test]
    async fn keep_policy_writes_no_match_rows_verbatim() {
        let geocoder = FakeGeocoder::default();
        let (_, out) = run(&input(10), &geocoder, NoMatchPolicy::Keep).await.unwrap();
        assert!(out.contains("\"10\",\"10 Main St\",\"No_Match\""));
    }

    #[tokio::test]
    async fn po_box_rows_are_submitted_with_alternate_address() {
        let text = row(&[(0, "208970676"), (16, "PO Box 439465"), (10, "1 Main St"), (11, "Chicago"), (13, "IL"), (14, "60643")]);
        let geocoder = FakeGeocoder::default();
        run(&text, &geocoder, NoMatchPolicy::Keep).await.unwrap();
        let batches = geocoder.batches.lock().unwrap();
        assert_eq!(batches[0][0].street(), "1 Main St");
        assert_eq!(batches[0][0].zip, "60643");
    }

    #[tokio::test]
    async fn malformed_row_aborts_the_run() {
        let text = format!("{}\nshort\trow\n", street_row("1", "1 Main St"));
        let geocoder = FakeGeocoder::default();
        let err = run(&text, &geocoder, NoMatchPolicy::Keep).await.unwrap_err();
        assert!(format!("{:#}", err).contains("Input line 2"));
        assert!(geocoder.batch_sizes().is_empty());
    }

    #[tokio::test]
    async fn submission_failure_stops_further_batches() {
        let geocoder = FakeGeocoder {
            fail_on_batch: Some(1),
            ..Default::default()
        };
        let err = run(&input(2500), &geocoder, NoMatchPolicy::Keep).await.unwrap_err();
        assert!(format!("{:#}", err).contains("503"));
        assert_eq!(geocoder.batch_sizes(), vec![1000]);
    }

    #[test]
    fn flush_empties_the_buffer() {
        let geocoder = FakeGeocoder::default();
        let mut buffer = BatchBuffer::new(10);
        buffer.push(extract_address(&street_row("7", "7 Main St")).unwrap());
        let outcome = tokio_test::block_on(flush(&mut buffer, &geocoder, NoMatchPolicy::Drop)).unwrap();
        assert!(buffer.is_empty());
        assert_eq!(outcome.submitted, 1);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.lines.len(), 1);
    }
}
