use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::io::{BufRead, Read};
use std::thread::{self, JoinHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::fetch::{HttpClient, fetch_bytes};
use crate::sample::Sample;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// On-disk layout of a sample log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// One JSON object per line.
    JsonLines,
    /// Header row `latitude,longitude,speed,has_accuracy,timestamp`.
    Csv,
}

impl SampleFormat {
    /// Picks a format from a file name or URL, ignoring a trailing `.gz`.
    pub fn from_name(name: &str) -> Self {
        let path = name
            .split(['?', '#'])
            .next()
            .unwrap_or(name)
            .to_ascii_lowercase();
        let path = path.strip_suffix(".gz").unwrap_or(&path);
        if path.ends_with(".csv") {
            SampleFormat::Csv
        } else {
            SampleFormat::JsonLines
        }
    }
}

/// Decodes a sample log, transparently gunzipping it.
///
/// Lines that fail to parse or validate are logged and skipped.
pub fn parse_samples(bytes: &[u8], format: SampleFormat) -> Result<Vec<Sample>> {
    let decompressed;
    let bytes = if bytes.starts_with(&GZIP_MAGIC) {
        let mut buf = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut buf)
            .context("failed to decompress sample log")?;
        decompressed = buf;
        &decompressed[..]
    } else {
        bytes
    };

    let samples = match format {
        SampleFormat::JsonLines => parse_json_lines(bytes)?,
        SampleFormat::Csv => parse_csv(bytes),
    };
    debug!(count = samples.len(), ?format, "Sample log decoded");
    Ok(samples)
}

fn parse_json_lines(bytes: &[u8]) -> Result<Vec<Sample>> {
    let text = std::str::from_utf8(bytes).context("sample log is not valid UTF-8")?;
    Ok(text
        .lines()
        .enumerate()
        .filter_map(|(i, line)| parse_line(i + 1, line))
        .collect())
}

fn parse_csv(bytes: &[u8]) -> Vec<Sample> {
    let mut rdr = csv::Reader::from_reader(bytes);
    let mut samples = Vec::new();

    for (i, result) in rdr.deserialize::<Sample>().enumerate() {
        // +2: header row, then 1-based numbering
        let line = i + 2;
        match result {
            Ok(sample) => {
                if let Some(sample) = validated(line, sample) {
                    samples.push(sample);
                }
            }
            Err(e) => warn!(line, error = %e, "Skipping unreadable sample"),
        }
    }

    samples
}

fn parse_line(line_no: usize, line: &str) -> Option<Sample> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    match serde_json::from_str::<Sample>(line) {
        Ok(sample) => validated(line_no, sample),
        Err(e) => {
            warn!(line = line_no, error = %e, "Skipping unreadable sample");
            None
        }
    }
}

fn validated(line: usize, sample: Sample) -> Option<Sample> {
    match sample.validate() {
        Ok(()) => Some(sample),
        Err(e) => {
            warn!(line, error = %e, "Skipping invalid sample");
            None
        }
    }
}

/// Loads a sample log from a local path or over HTTP.
#[tracing::instrument(skip(client))]
pub async fn load_samples<C: HttpClient>(source: &str, client: &C) -> Result<Vec<Sample>> {
    let bytes = if source.starts_with("http://") || source.starts_with("https://") {
        fetch_bytes(client, source).await?
    } else {
        std::fs::read(source).with_context(|| format!("failed to read {source}"))?
    };
    info!(bytes = bytes.len(), "Sample log loaded");

    parse_samples(&bytes, SampleFormat::from_name(source))
}

/// Streams JSON Lines samples from `reader` as they arrive.
///
/// Reading happens on a dedicated OS thread so a read blocked on an idle
/// terminal never holds up runtime shutdown. The thread ends at end of input,
/// or at the next line after the receiver is dropped, yielding the number of
/// samples forwarded.
pub fn spawn_line_reader<R>(
    reader: R,
    capacity: usize,
) -> (mpsc::Receiver<Sample>, JoinHandle<Result<usize>>)
where
    R: BufRead + Send + 'static,
{
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let handle = thread::spawn(move || {
        let mut forwarded = 0;

        for (i, line) in reader.lines().enumerate() {
            let line = line.context("failed to read sample line")?;
            let Some(sample) = parse_line(i + 1, &line) else {
                continue;
            };
            if tx.blocking_send(sample).is_err() {
                debug!("Sample receiver dropped, stopping reader");
                break;
            }
            forwarded += 1;
        }

        Ok::<usize, anyhow::Error>(forwarded)
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    const JSONL: &str = r#"{"latitude":42.0,"longitude":-71.0,"speed":10.0,"has_accuracy":true,"timestamp":"2024-05-01T12:00:00Z"}
# comment lines are skipped

not json
{"latitude":95.0,"longitude":-71.0,"speed":10.0,"has_accuracy":true,"timestamp":"2024-05-01T12:00:02Z"}
{"latitude":42.001,"longitude":-71.0,"speed":0.0,"has_accuracy":false,"timestamp":"2024-05-01T12:00:04Z"}
"#;

    const CSV: &str = "latitude,longitude,speed,has_accuracy,timestamp
42.0,-71.0,10.0,true,2024-05-01T12:00:00Z
42.001,-71.0,12.5,false,2024-05-01T12:00:02Z
42.002,-71.0,-3.0,true,2024-05-01T12:00:04Z
oops,-71.0,1.0,true,2024-05-01T12:00:06Z
";

    #[test]
    fn test_format_from_name() {
        assert_eq!(SampleFormat::from_name("drive.csv"), SampleFormat::Csv);
        assert_eq!(SampleFormat::from_name("drive.CSV.gz"), SampleFormat::Csv);
        assert_eq!(SampleFormat::from_name("drive.csv.GZ"), SampleFormat::Csv);
        assert_eq!(SampleFormat::from_name("drive.jsonl"), SampleFormat::JsonLines);
        assert_eq!(
            SampleFormat::from_name("https://host/logs/drive.csv?sig=abc"),
            SampleFormat::Csv
        );
    }

    #[test]
    fn test_parse_json_lines_skips_bad_lines() {
        let samples = parse_samples(JSONL.as_bytes(), SampleFormat::JsonLines).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].speed_mps, 10.0);
        assert!(!samples[1].has_accuracy);
    }

    #[test]
    fn test_parse_csv_skips_bad_rows() {
        let samples = parse_samples(CSV.as_bytes(), SampleFormat::Csv).unwrap();

        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1].speed_mps, 12.5);
        assert!(!samples[1].has_accuracy);
    }

    #[test]
    fn test_parse_gzipped_log() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(CSV.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let samples = parse_samples(&compressed, SampleFormat::Csv).unwrap();
        assert_eq!(samples.len(), 2);
    }

    /// Repeats one fix forever; never reaches end of input.
    struct EndlessFixes;

    impl Read for EndlessFixes {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let line = concat!(
                r#"{"latitude":42.0,"longitude":-71.0,"speed":3.0,"#,
                r#""has_accuracy":true,"timestamp":"2024-05-01T12:00:00Z"}"#,
                "\n"
            );
            let n = line.len().min(buf.len());
            buf[..n].copy_from_slice(&line.as_bytes()[..n]);
            Ok(n)
        }
    }

    #[test]
    fn test_line_reader_streams_valid_samples() {
        let (mut rx, handle) = spawn_line_reader(JSONL.as_bytes(), 4);

        let mut received = Vec::new();
        while let Some(sample) = rx.blocking_recv() {
            received.push(sample);
        }

        assert_eq!(received.len(), 2);
        assert_eq!(handle.join().unwrap().unwrap(), 2);
    }

    #[test]
    fn test_line_reader_stops_when_receiver_dropped() {
        let (mut rx, handle) = spawn_line_reader(std::io::BufReader::new(EndlessFixes), 1);

        for _ in 0..3 {
            assert!(rx.blocking_recv().is_some());
        }
        drop(rx);

        let forwarded = handle.join().unwrap().unwrap();
        assert!(forwarded >= 3);
    }

    #[tokio::test]
    async fn test_load_samples_from_file() {
        let path = std::env::temp_dir().join("trip_meter_test_load.jsonl");
        std::fs::write(&path, JSONL).unwrap();

        let samples = load_samples(path.to_str().unwrap(), &crate::fetch::BasicClient::new())
            .await
            .unwrap();
        assert_eq!(samples.len(), 2);

        std::fs::remove_file(&path).unwrap();
    }
}
