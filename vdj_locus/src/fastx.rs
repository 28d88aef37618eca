// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// FASTA and FASTQ readers plus the couple of sequence helpers the boundary
// adjuster and CDR3 extractor need.  The reference FASTA is small (one locus)
// and loads whole; the query FASTQ streams one record at a time in lockstep
// with the delta stream.

use anyhow::{ensure, Context, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::Path;

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// SEQUENCE HELPERS
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// 1-based inclusive subsequence, clamped to the sequence.  Requests hanging
/// off either end come back shorter than asked, so a missing flank shows up
/// as a short string rather than a panic.
pub fn subseq(seq: &str, start: i32, end: i32) -> String {
    let lo = (start.max(1) - 1) as usize;
    let hi = (end.max(0) as usize).min(seq.len());
    if lo >= hi {
        return String::new();
    }
    seq[lo..hi].to_string()
}

/// Reverse complement, preserving soft-mask case; characters outside the
/// nucleotide alphabet pass through unchanged.
pub fn revcom(seq: &str) -> String {
    seq.chars()
        .rev()
        .map(|c| match c {
            'A' => 'T',
            'C' => 'G',
            'G' => 'C',
            'T' => 'A',
            'a' => 't',
            'c' => 'g',
            'g' => 'c',
            't' => 'a',
            other => other,
        })
        .collect()
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// FASTA
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Load a FASTA file into an id -> sequence map.  The id is the first
/// whitespace token after '>'.
pub fn read_fasta(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("could not read fasta file {}", path.display()))?;
    read_fasta_text(&text).with_context(|| format!("bad fasta file {}", path.display()))
}

pub fn read_fasta_text(text: &str) -> Result<HashMap<String, String>> {
    let mut fasta = HashMap::new();
    let mut uid = String::new();
    for line in text.lines() {
        if let Some(header) = line.strip_prefix('>') {
            uid = header
                .split_whitespace()
                .next()
                .context("empty fasta header")?
                .to_string();
            fasta.entry(uid.clone()).or_insert_with(String::new);
        } else if !line.trim().is_empty() {
            ensure!(!uid.is_empty(), "fasta sequence before first header");
            *fasta.get_mut(&uid).unwrap() += line.trim();
        }
    }
    ensure!(!fasta.is_empty(), "fasta file has no records");
    Ok(fasta)
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// FASTQ
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

#[derive(Clone, Debug, Default)]
pub struct FastqRecord {
    pub uid: String,
    pub seq: String,
    pub qual: String,
}

/// Streaming four-line FASTQ reader.
pub struct FastqReader {
    lines: Lines<BufReader<File>>,
    path: String,
}

impl FastqReader {
    pub fn open(path: impl AsRef<Path>) -> Result<FastqReader> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open fastq file {}", path.display()))?;
        Ok(FastqReader {
            lines: BufReader::new(file).lines(),
            path: path.display().to_string(),
        })
    }

    /// Read the next record, or None at end of file.  A truncated record is
    /// an error.
    pub fn read_next(&mut self) -> Result<Option<FastqRecord>> {
        let header = match self.lines.next() {
            None => return Ok(None),
            Some(line) => line?,
        };
        let uid = header
            .strip_prefix('@')
            .with_context(|| format!("bad fastq header in {}: {}", self.path, header))?
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_string();
        let mut field = || -> Result<String> {
            Ok(self
                .lines
                .next()
                .with_context(|| format!("truncated fastq record in {}", self.path))??)
        };
        let seq = field()?;
        let _plus = field()?;
        let qual = field()?;
        ensure!(
            seq.len() == qual.len(),
            "fastq record {} has mismatched sequence and quality lengths",
            uid
        );
        Ok(Some(FastqRecord { uid, seq, qual }))
    }
}
