// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// The gene-segment exon table for one species/locus pair.  Rows of the table
// map reference coordinate ranges to named exons of V/D/J/C segments; the
// table is loaded once, sorted by start coordinate, and queried by binary
// search for every alignment of every read.

use anyhow::{bail, ensure, Context, Result};
use std::fmt;
use std::path::Path;

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// GENE CLASS AND CHAIN RANK
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Segment class of an alignment.  The derived order is the priority used to
/// pick a group representative: V beats J beats D beats C, and intergenic
/// alignments lose to everything.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum GeneClass {
    V,
    J,
    D,
    C,
    I,
}

impl GeneClass {
    pub fn from_letter(c: char) -> Option<GeneClass> {
        match c {
            'V' => Some(GeneClass::V),
            'J' => Some(GeneClass::J),
            'D' => Some(GeneClass::D),
            'C' => Some(GeneClass::C),
            'I' => Some(GeneClass::I),
            _ => None,
        }
    }

    /// Class letter of a segment name like TRBV3-1 or IGHC2: the character
    /// following the three-letter locus prefix.
    pub fn of_seg_name(name: &str) -> Option<GeneClass> {
        GeneClass::from_letter(name.chars().nth(3)?)
    }
}

impl fmt::Display for GeneClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = match self {
            GeneClass::V => 'V',
            GeneClass::J => 'J',
            GeneClass::D => 'D',
            GeneClass::C => 'C',
            GeneClass::I => 'I',
        };
        write!(f, "{c}")
    }
}

/// Family digit of a segment name like TRBJ2-3 or TRBC2: the character
/// following the class letter.
pub fn family_digit(name: &str) -> Option<char> {
    name.chars().nth(4)
}

/// Class-plus-exon-rank tag of an annotated alignment.  The derived order is
/// the canonical transcription order of a rearranged receptor: leaderless V,
/// V leader, V main exon, D, J, then the four constant-region exons.
/// Intergenic alignments carry no rank and never join a chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum ChainRank {
    V0,
    V1,
    V2,
    D0,
    J0,
    C1,
    C2,
    C3,
    C4,
}

impl ChainRank {
    /// Rank of (class letter of the first spanned segment, exon index of the
    /// last spanned exon).  Combinations outside the closed table get None
    /// and are treated like intergenic alignments downstream.
    pub fn new(class: GeneClass, exon_index: u8) -> Option<ChainRank> {
        match (class, exon_index) {
            (GeneClass::V, 0) => Some(ChainRank::V0),
            (GeneClass::V, 1) => Some(ChainRank::V1),
            (GeneClass::V, 2) => Some(ChainRank::V2),
            (GeneClass::D, 0) => Some(ChainRank::D0),
            (GeneClass::J, 0) => Some(ChainRank::J0),
            (GeneClass::C, 1) => Some(ChainRank::C1),
            (GeneClass::C, 2) => Some(ChainRank::C2),
            (GeneClass::C, 3) => Some(ChainRank::C3),
            (GeneClass::C, 4) => Some(ChainRank::C4),
            _ => None,
        }
    }
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// EXON TABLE
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// One exon of a V/D/J/C segment.  Multi-exon segments are split into one
/// entry per exon, with exon indices reflecting transcription order, so a
/// reverse-strand segment indexes its exons from the far end.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegmentExon {
    pub seg: String,      // segment name, e.g. TRBV3-1
    pub seg_exon: String, // segment_exon name, e.g. TRBV3-1_2
    pub class: GeneClass,
    pub fw: bool,
    pub start: i32, // 1-based inclusive reference range
    pub end: i32,
    pub exon_index: u8,
}

/// Result of locating one alignment's reference span in the exon table.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SegCall {
    pub seg: String,      // ~-joined names of the spanned segments
    pub seg_exon: String, // ~-joined exon names
    pub class: GeneClass, // class of the first spanned segment
    pub rank: Option<ChainRank>,
}

#[derive(Clone, Debug, Default)]
pub struct ExonTable {
    pub locus: String, // species_gene, e.g. hsa_trb
    pub gene: String,  // e.g. TRB
    pub exons: Vec<SegmentExon>,
}

impl ExonTable {
    pub fn load(path: impl AsRef<Path>) -> Result<ExonTable> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read vdj table {}", path.display()))?;
        ExonTable::from_text(&text)
            .with_context(|| format!("could not parse vdj table {}", path.display()))
    }

    /// Parse the tab-delimited segment table.  Each row is
    /// species_gene, segment, functional flag, strand, exon ranges, where the
    /// ranges look like 1..41,159..450.
    pub fn from_text(text: &str) -> Result<ExonTable> {
        let mut table = ExonTable::default();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            ensure!(fields.len() >= 5, "line {}: expected five fields", n + 1);
            let (locus, seg, strand, ranges) = (fields[0], fields[1], fields[3], fields[4]);
            ensure!(locus.len() >= 7, "line {}: malformed locus {}", n + 1, locus);
            if table.locus.is_empty() {
                table.locus = locus.to_string();
                table.gene = locus[4..7].to_uppercase();
            }
            let class = match GeneClass::of_seg_name(seg) {
                Some(c) if c != GeneClass::I => c,
                _ => bail!("line {}: segment {} has no V/D/J/C class letter", n + 1, seg),
            };
            let fw = match strand {
                "+" => true,
                "-" => false,
                _ => bail!("line {}: bad strand {}", n + 1, strand),
            };
            let mut spans = Vec::<(i32, i32)>::new();
            for r in ranges.split(',') {
                let (a, b) = r
                    .split_once("..")
                    .with_context(|| format!("line {}: bad exon range {}", n + 1, r))?;
                spans.push((a.parse()?, b.parse()?));
            }
            table.push_exons(seg, class, fw, &spans);
        }
        ensure!(!table.exons.is_empty(), "table has no exon rows");
        table.exons.sort_by_key(|e| e.start);
        Ok(table)
    }

    // Single-exon segments get exon index 0; multi-exon segments number their
    // exons 1..n in transcription order, which runs backwards along the
    // reference for minus-strand segments.
    fn push_exons(&mut self, seg: &str, class: GeneClass, fw: bool, spans: &[(i32, i32)]) {
        let n = spans.len();
        for (i, &(start, end)) in spans.iter().enumerate() {
            let exon_index = if n == 1 {
                0
            } else if fw {
                i as u8 + 1
            } else {
                (n - i) as u8
            };
            self.exons.push(SegmentExon {
                seg: seg.to_string(),
                seg_exon: format!("{seg}_{exon_index}"),
                class,
                fw,
                start,
                end,
                exon_index,
            });
        }
    }

    fn intergenic(&self) -> SegCall {
        SegCall {
            seg: format!("{}I", self.gene),
            seg_exon: format!("{}I_0", self.gene),
            class: GeneClass::I,
            rank: None,
        }
    }

    /// Locate an alignment's reference span [ref_start, ref_end] in the
    /// table.  The span may cover several exons or whole segments, in which
    /// case their names are joined with ~.  A span starting past the last
    /// exon's start, or inside no exon at all, is intergenic; the former case
    /// keeps the last exon's segment name when the start still falls inside
    /// the exon, but carries no chain rank either way.
    pub fn annotate(&self, ref_start: i32, ref_end: i32) -> SegCall {
        let info = &self.exons;
        let last = info.len() - 1;

        if ref_start > info[last].start {
            if ref_start > info[last].end {
                return self.intergenic();
            }
            return SegCall {
                seg: info[last].seg.clone(),
                seg_exon: info[last].seg_exon.clone(),
                class: info[last].class,
                rank: None,
            };
        }

        // Greatest exon whose start is <= ref_start.
        let (mut si, mut ei) = (0, last);
        let mut mid = (si + ei) / 2;
        while mid != si {
            if ref_start < info[mid].start {
                ei = mid;
            } else {
                si = mid;
            }
            mid = (si + ei) / 2;
        }

        let mut seg = String::new();
        let mut seg_exon = String::new();
        let mut first_class = None;
        let mut last_exon_index = 0;
        if ref_start <= info[si].end {
            seg.push_str(&info[si].seg);
            seg_exon.push_str(&info[si].seg_exon);
            first_class = Some(info[si].class);
            last_exon_index = info[si].exon_index;
        }
        loop {
            si += 1;
            if si > last || ref_end < info[si].start {
                break;
            }
            if !seg_exon.is_empty() {
                seg.push('~');
                seg_exon.push('~');
            }
            seg.push_str(&info[si].seg);
            seg_exon.push_str(&info[si].seg_exon);
            if first_class.is_none() {
                first_class = Some(info[si].class);
            }
            last_exon_index = info[si].exon_index;
        }
        match first_class {
            None => self.intergenic(),
            Some(class) => SegCall {
                rank: ChainRank::new(class, last_exon_index),
                seg,
                seg_exon,
                class,
            },
        }
    }
}
