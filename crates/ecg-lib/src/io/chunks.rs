use anyhow::{anyhow, Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::io::Read;
use std::path::Path;

/// Two parallel lead sample vectors read from one file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChannelPair {
    pub ch1: Vec<f64>,
    pub ch2: Vec<f64>,
}

impl ChannelPair {
    pub fn len(&self) -> usize {
        self.ch1.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ch1.is_empty()
    }

    pub fn append(&mut self, other: ChannelPair) {
        self.ch1.extend(other.ch1);
        self.ch2.extend(other.ch2);
    }
}

/// Read a comma-separated chunk file whose header names `ch1` and `ch2`.
pub fn read_channel_file(path: &Path) -> Result<ChannelPair> {
    let file =
        std::fs::File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    read_channels(file).with_context(|| format!("failed to parse {}", path.display()))
}

/// Parse `ch1`/`ch2` columns from any CSV source; other columns are ignored.
pub fn read_channels<R: Read>(source: R) -> Result<ChannelPair> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(source);
    let headers = reader.headers().context("reading header")?.clone();
    let ch1_idx = locate_column(&headers, "ch1")?;
    let ch2_idx = locate_column(&headers, "ch2")?;

    let mut out = ChannelPair::default();
    for (row, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("reading record {}", row + 1))?;
        out.ch1.push(parse_field(&record, ch1_idx, "ch1", row)?);
        out.ch2.push(parse_field(&record, ch2_idx, "ch2", row)?);
    }
    Ok(out)
}

fn parse_field(record: &StringRecord, idx: usize, name: &str, row: usize) -> Result<f64> {
    let raw = record
        .get(idx)
        .ok_or_else(|| anyhow!("record {} is missing {}", row + 1, name))?;
    raw.parse::<f64>()
        .with_context(|| format!("record {}: {} is not f64: {}", row + 1, name, raw))
}

fn locate_column(headers: &StringRecord, requested: &str) -> Result<usize> {
    headers
        .iter()
        .position(|name| name.eq_ignore_ascii_case(requested))
        .ok_or_else(|| anyhow!("missing {} column", requested))
}
