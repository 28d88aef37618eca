// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Reader for delta-format alignment files.  The file opens with the
// reference and query FASTA paths and a data-type line, then carries one
// record per (reference contig, query) pair: a header line
// >idR idQ lenR lenQ, followed by alignment blocks of seven integers and a
// zero-terminated signed gap-offset list.  Consecutive records for one query
// are merged into a single candidate set before the pipeline sees them.

use crate::align::DeltaAlign;
use anyhow::{bail, ensure, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct DeltaRecord {
    pub id_r: String, // reference contig id (first contig when merged)
    pub id_q: String, // query id
    pub len_r: i32,
    pub len_q: i32,
    pub aligns: Vec<DeltaAlign>,
}

pub struct DeltaReader<R: BufRead> {
    tokens: Tokens<R>,
    pending: Option<DeltaRecord>,
    pub ref_path: String,
    pub query_path: String,
    pub data_type: String,
}

impl DeltaReader<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("could not open delta file {}", path.display()))?;
        DeltaReader::from_reader(BufReader::new(file))
            .with_context(|| format!("could not parse delta file {}", path.display()))
    }
}

impl<R: BufRead> DeltaReader<R> {
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut tokens = Tokens::new(reader);
        let ref_path = tokens.next_token()?.context("missing reference path")?;
        let query_path = tokens.next_token()?.context("missing query path")?;
        let data_type = tokens.next_token()?.context("missing data type line")?;
        Ok(DeltaReader {
            tokens,
            pending: None,
            ref_path,
            query_path,
            data_type,
        })
    }

    /// Read the next query's candidate set, merging consecutive records that
    /// share a query id (a query aligned against several reference contigs).
    /// Returns None at end of file.
    pub fn read_next(&mut self) -> Result<Option<DeltaRecord>> {
        let mut rec = match self.pending.take() {
            Some(rec) => rec,
            None => match self.read_record()? {
                Some(rec) => rec,
                None => return Ok(None),
            },
        };
        while let Some(next) = self.read_record()? {
            if next.id_q == rec.id_q {
                rec.aligns.extend(next.aligns);
            } else {
                self.pending = Some(next);
                break;
            }
        }
        Ok(Some(rec))
    }

    // One raw record.
    fn read_record(&mut self) -> Result<Option<DeltaRecord>> {
        let header = match self.tokens.next_token()? {
            None => return Ok(None),
            Some(t) => t,
        };
        let Some(id_r) = header.strip_prefix('>') else {
            bail!("expected record header, found {}", header);
        };
        let mut rec = DeltaRecord {
            id_r: id_r.to_string(),
            id_q: self.tokens.require("query id")?,
            len_r: self.tokens.require_int("reference length")?,
            len_q: self.tokens.require_int("query length")?,
            aligns: Vec::new(),
        };
        loop {
            match self.tokens.peek()? {
                None => break,
                Some(t) if t.starts_with('>') => break,
                Some(_) => {}
            }
            rec.aligns.push(self.read_align()?);
        }
        Ok(Some(rec))
    }

    fn read_align(&mut self) -> Result<DeltaAlign> {
        let mut head = [0i32; 7];
        for (i, v) in head.iter_mut().enumerate() {
            *v = self
                .tokens
                .require_int("alignment header")
                .with_context(|| format!("alignment header field {}", i + 1))?;
        }
        let mut deltas = Vec::new();
        loop {
            let d = self.tokens.require_int("gap offset")?;
            deltas.push(d);
            if d == 0 {
                break;
            }
        }
        ensure!(
            head[0] <= head[1],
            "alignment has a reversed reference span {}-{}",
            head[0],
            head[1]
        );
        Ok(DeltaAlign::from_delta_block(
            head[0], head[1], head[2], head[3], head[4], head[5], head[6], &deltas,
        ))
    }
}

// Whitespace-token stream with one-token lookahead.
struct Tokens<R: BufRead> {
    lines: std::io::Lines<R>,
    buf: Vec<String>,
    peeked: Option<String>,
}

impl<R: BufRead> Tokens<R> {
    fn new(reader: R) -> Self {
        Tokens {
            lines: reader.lines(),
            buf: Vec::new(),
            peeked: None,
        }
    }

    fn next_token(&mut self) -> Result<Option<String>> {
        if let Some(t) = self.peeked.take() {
            return Ok(Some(t));
        }
        while self.buf.is_empty() {
            match self.lines.next() {
                None => return Ok(None),
                Some(line) => {
                    let line = line?;
                    self.buf = line.split_whitespace().rev().map(String::from).collect();
                }
            }
        }
        Ok(self.buf.pop())
    }

    fn peek(&mut self) -> Result<Option<&String>> {
        if self.peeked.is_none() {
            self.peeked = self.next_token()?;
        }
        Ok(self.peeked.as_ref())
    }

    fn require(&mut self, what: &str) -> Result<String> {
        self.next_token()?
            .with_context(|| format!("unexpected end of delta file, wanted {what}"))
    }

    fn require_int(&mut self, what: &str) -> Result<i32> {
        let t = self.require(what)?;
        t.parse()
            .with_context(|| format!("bad {what} in delta file: {t}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const DELTA: &str = "\
ref.fa qry.fa
NUCMER
>locus read1 5000 200
1 100 1 100 2 0 0
40
0
>locus read1 5000 200
300 360 120 180 0 0 0
0
>locus read2 5000 150
500 560 150 90 1 0 0
-20
0
";

    fn reader() -> DeltaReader<Cursor<&'static str>> {
        DeltaReader::from_reader(Cursor::new(DELTA)).unwrap()
    }

    #[test]
    fn test_header() {
        let r = reader();
        assert_eq!(r.ref_path, "ref.fa");
        assert_eq!(r.query_path, "qry.fa");
        assert_eq!(r.data_type, "NUCMER");
    }

    #[test]
    fn test_merges_consecutive_records() {
        let mut r = reader();
        let rec = r.read_next().unwrap().unwrap();
        assert_eq!(rec.id_q, "read1");
        assert_eq!(rec.aligns.len(), 2);
        assert_eq!(rec.aligns[1].ref_start, 300);
        let rec = r.read_next().unwrap().unwrap();
        assert_eq!(rec.id_q, "read2");
        assert_eq!(rec.aligns.len(), 1);
        assert!(!rec.aligns[0].fw);
        assert!(r.read_next().unwrap().is_none());
    }

    #[test]
    fn test_alignment_fields() {
        let mut r = reader();
        let rec = r.read_next().unwrap().unwrap();
        let a = &rec.aligns[0];
        assert_eq!((a.ref_start, a.ref_end), (1, 100));
        assert_eq!(a.mmgp, 2);
        assert_eq!(a.gaps_q, 1);
        assert_eq!(a.q_len, 100);
    }
}
