// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// One gapped local alignment of a read against the reference locus, with the
// coordinate walks everything downstream leans on: rendering the two gapped
// sequence rows for an end of the alignment, cutting an alignment at a query
// offset, and mapping a reference coordinate into a read coordinate.

use crate::{GAP_SCORE, MATCH_SCORE, MISMATCH_SCORE};
use itertools::Itertools;
use vdj_locus::exons::{ChainRank, GeneClass};

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// GAP OPS
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// One column run of a gapped alignment.  QueryGap is a gap in the read row
/// (the reference has an unmatched base there); RefGap is a gap in the
/// reference row.  The legacy delta encoding packs a match run and the gap
/// column that follows it into one signed integer: +d is d-1 match columns
/// then a query gap, -d is d-1 match columns then a reference gap, and 0
/// terminates the list with an implied trailing match run.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GapOp {
    MatchRun(i32),
    QueryGap(i32),
    RefGap(i32),
}

impl GapOp {
    /// Expand a zero-terminated signed delta list into explicit ops covering
    /// the whole reference span.
    pub fn from_deltas(deltas: &[i32], ref_len: i32) -> Vec<GapOp> {
        let mut ops = Vec::new();
        let mut consumed = 0;
        for &d in deltas {
            if d == 0 {
                break;
            }
            let m = d.abs() - 1;
            if m > 0 {
                ops.push(GapOp::MatchRun(m));
            }
            if d > 0 {
                ops.push(GapOp::QueryGap(1));
                consumed += m + 1;
            } else {
                ops.push(GapOp::RefGap(1));
                consumed += m;
            }
        }
        if ref_len - consumed > 0 {
            ops.push(GapOp::MatchRun(ref_len - consumed));
        }
        ops
    }

    /// Collapse explicit ops back into the zero-terminated signed form used
    /// by the delta file and the concise output field.
    pub fn to_deltas(ops: &[GapOp]) -> Vec<i32> {
        let mut deltas = Vec::new();
        let mut pending = 0;
        for &op in ops {
            match op {
                GapOp::MatchRun(m) => pending += m,
                GapOp::QueryGap(k) => {
                    deltas.push(pending + 1);
                    deltas.extend(std::iter::repeat(1).take(k as usize - 1));
                    pending = 0;
                }
                GapOp::RefGap(k) => {
                    deltas.push(-(pending + 1));
                    deltas.extend(std::iter::repeat(-1).take(k as usize - 1));
                    pending = 0;
                }
            }
        }
        deltas.push(0);
        deltas
    }
}

// Position reached by walking an op list: reference and query offsets from
// the alignment start, plus the op index and the offset consumed inside it.
#[derive(Clone, Copy, Debug, Default)]
struct Walk {
    ri: i32,
    qi: i32,
    idx: usize,
    off: i32,
}

// Advance n query bases from the alignment start.  Query gaps consume no
// query bases and are walked over eagerly; a query gap bound to the match run
// it follows is consumed together with it, so the position lands after the
// gapped reference base, mirroring the packed encoding.
fn advance_query(ops: &[GapOp], n: i32) -> Walk {
    let mut w = Walk::default();
    let mut d = n;
    while d > 0 && w.idx < ops.len() {
        match ops[w.idx] {
            GapOp::MatchRun(m) => {
                let avail = m - w.off;
                if d < avail {
                    w.ri += d;
                    w.qi += d;
                    w.off += d;
                    d = 0;
                } else {
                    w.ri += avail;
                    w.qi += avail;
                    d -= avail;
                    w.idx += 1;
                    w.off = 0;
                    if d == 0 {
                        if let Some(GapOp::QueryGap(k)) = ops.get(w.idx) {
                            w.ri += k;
                            w.idx += 1;
                        }
                    }
                }
            }
            GapOp::QueryGap(k) => {
                w.ri += k;
                w.idx += 1;
            }
            GapOp::RefGap(k) => {
                let avail = k - w.off;
                if d < avail {
                    w.qi += d;
                    w.off += d;
                    d = 0;
                } else {
                    w.qi += avail;
                    d -= avail;
                    w.idx += 1;
                    w.off = 0;
                }
            }
        }
    }
    w
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// DELTA ALIGNMENT
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

#[derive(Clone, Debug)]
pub struct DeltaAlign {
    pub ref_start: i32, // 1-based inclusive reference span
    pub ref_end: i32,
    pub q_start: i32, // raw read span, reversed for minus alignments
    pub q_end: i32,
    pub mmgp: i32,    // mismatches plus gaps
    pub sim_low: i32, // columns with similarity score < 1
    pub stops: i32,   // stop codons
    pub fw: bool,     // raw orientation
    pub gene_fw: bool, // orientation corrected for the inverted V segment
    pub oq_start: i32, // strand-normalized read span
    pub oq_end: i32,
    pub q_len: i32,  // aligned query length
    pub gaps_q: i32, // gap columns in the read row
    pub score: i32,
    pub identity: f64,
    pub remove: bool, // marked for removal by the boundary adjuster
    pub ops: Vec<GapOp>,

    // Sequence context, loaded only when boundary adjustment needs it.
    pub rseg: String,
    pub lflank: String,
    pub rflank: String,
    pub qseg: String,

    // Annotation against the exon table.
    pub seg: String,
    pub seg_exon: String,
    pub class: GeneClass,
    pub rank: Option<ChainRank>,

    // Competing alignments with the same query extent; empty once ambiguity
    // is resolved.
    pub ties: Vec<DeltaAlign>,
}

impl Default for DeltaAlign {
    fn default() -> Self {
        DeltaAlign {
            ref_start: 0,
            ref_end: 0,
            q_start: 0,
            q_end: 0,
            mmgp: 0,
            sim_low: 0,
            stops: 0,
            fw: true,
            gene_fw: true,
            oq_start: 0,
            oq_end: 0,
            q_len: 0,
            gaps_q: 0,
            score: 0,
            identity: 0.0,
            remove: false,
            ops: Vec::new(),
            rseg: String::new(),
            lflank: String::new(),
            rflank: String::new(),
            qseg: String::new(),
            seg: String::new(),
            seg_exon: String::new(),
            class: GeneClass::I,
            rank: None,
            ties: Vec::new(),
        }
    }
}

impl DeltaAlign {
    /// Build one alignment from the fields of a delta block, deriving the
    /// oriented span, gap counts, score and identity.
    #[allow(clippy::too_many_arguments)]
    pub fn from_delta_block(
        ref_start: i32,
        ref_end: i32,
        q_start: i32,
        q_end: i32,
        mmgp: i32,
        sim_low: i32,
        stops: i32,
        deltas: &[i32],
    ) -> DeltaAlign {
        let fw = q_start < q_end;
        let oq_start = q_start.min(q_end);
        let oq_end = q_start.max(q_end);
        let q_len = oq_end - oq_start + 1;
        let mut gaps_t = 0;
        let mut gaps_q = 0;
        for &d in deltas {
            if d > 0 {
                gaps_q += 1;
                gaps_t += 1;
            } else if d < 0 {
                gaps_t += 1;
            }
        }
        let mismatch = mmgp - gaps_t;
        let matches = q_len + gaps_q - mmgp;
        DeltaAlign {
            ref_start,
            ref_end,
            q_start,
            q_end,
            mmgp,
            sim_low,
            stops,
            fw,
            gene_fw: fw,
            oq_start,
            oq_end,
            q_len,
            gaps_q,
            score: matches * MATCH_SCORE + mismatch * MISMATCH_SCORE + gaps_t * GAP_SCORE,
            identity: f64::from(matches) / f64::from(q_len + gaps_q),
            ops: GapOp::from_deltas(deltas, ref_end - ref_start + 1),
            ..Default::default()
        }
    }

    /// Sort key for the optimal-set selection: score descending, identity
    /// breaking ties.
    pub fn cmp_score_desc(a: &Self, b: &Self) -> std::cmp::Ordering {
        b.score
            .cmp(&a.score)
            .then(b.identity.total_cmp(&a.identity))
    }

    /// True when the oriented-query overlap with b exceeds half of b's own
    /// aligned length.  The test is one-directional on purpose: a short
    /// alignment buried in a long one fails it, while the long one survives
    /// the same comparison against the short.
    pub fn overlaps_most_of(&self, b: &DeltaAlign) -> bool {
        let ol = if self.oq_start < b.oq_start {
            self.oq_end - b.oq_start + 1
        } else {
            b.oq_end - self.oq_start + 1
        };
        f64::from(ol) > f64::from(b.q_len) * 0.5
    }

    /// Render the reference and read rows for one end of the alignment, with
    /// gap columns as '_'.  Positive n takes the first n read bases, negative
    /// n the last |n|.  Requires rseg/qseg to be loaded.  With rev, both rows
    /// come back reverse-complemented.
    pub fn end_alignment(&self, n: i32, rev: bool) -> (String, String) {
        let start = if n < 0 {
            advance_query(&self.ops, self.q_len + n)
        } else {
            Walk::default()
        };
        let mut d = n.abs();
        let (mut ri, mut qi, mut idx, mut off) =
            (start.ri as usize, start.qi as usize, start.idx, start.off);
        let rb = self.rseg.as_bytes();
        let qb = self.qseg.as_bytes();
        let mut ra = Vec::<u8>::new();
        let mut qa = Vec::<u8>::new();
        while d > 0 && idx < self.ops.len() {
            match self.ops[idx] {
                GapOp::MatchRun(m) => {
                    let avail = m - off;
                    let t = d.min(avail) as usize;
                    ra.extend_from_slice(&rb[ri..ri + t]);
                    qa.extend_from_slice(&qb[qi..qi + t]);
                    ri += t;
                    qi += t;
                    if d <= avail {
                        d = 0;
                    } else {
                        d -= avail;
                        idx += 1;
                        off = 0;
                    }
                }
                GapOp::QueryGap(k) => {
                    ra.extend_from_slice(&rb[ri..ri + k as usize]);
                    qa.extend(std::iter::repeat(b'_').take(k as usize));
                    ri += k as usize;
                    idx += 1;
                }
                GapOp::RefGap(k) => {
                    let t = d.min(k - off) as usize;
                    ra.extend(std::iter::repeat(b'_').take(t));
                    qa.extend_from_slice(&qb[qi..qi + t]);
                    qi += t;
                    d -= t as i32;
                    if t as i32 == k - off {
                        idx += 1;
                        off = 0;
                    } else {
                        off += t as i32;
                    }
                }
            }
        }
        let mut ra = String::from_utf8(ra).unwrap();
        let mut qa = String::from_utf8(qa).unwrap();
        if rev {
            ra = vdj_locus::fastx::revcom(&ra);
            qa = vdj_locus::fastx::revcom(&qa);
        }
        (ra, qa)
    }

    /// Cut n read bases off the head (n > 0) or |n| off the tail (n < 0),
    /// re-walking the op list to recompute spans, deltas and the mismatch
    /// count.  Requires rseg/qseg to be loaded.
    pub fn cut_end(&mut self, n: i32) {
        if n == 0 {
            return;
        }

        // Mismatches in the removed end come off the running count.
        let (cut_r, cut_q) = self.end_alignment(n, false);
        let cut_mmgp = cut_r
            .bytes()
            .zip(cut_q.bytes())
            .filter(|&(r, q)| r.to_ascii_uppercase() != q)
            .count() as i32;
        self.mmgp -= cut_mmgp;

        let d = if n > 0 { n } else { self.q_len + n };
        let w = advance_query(&self.ops, d);

        if n > 0 {
            // Cut from the head.
            self.ref_start += w.ri;
            self.q_len -= n;
            self.rseg = self.rseg.split_off(w.ri as usize);
            self.qseg = self.qseg.split_off(w.qi as usize);
            self.ops = ops_after(&self.ops, w.idx, w.off);
            if self.fw {
                self.q_start += w.qi;
                self.oq_start += w.qi;
            } else {
                self.q_start -= w.qi;
                self.oq_end -= w.qi;
            }
        } else {
            // Cut from the tail.
            let rl = (self.ref_end - self.ref_start + 1) - w.ri;
            let ql = self.q_len - w.qi;
            self.ref_end -= rl;
            self.q_len += n;
            self.rseg.truncate(w.ri as usize);
            self.qseg.truncate(w.qi as usize);
            self.ops = ops_before(&self.ops, w.idx, w.off);
            if self.fw {
                self.q_end -= ql;
                self.oq_end -= ql;
            } else {
                self.q_end += ql;
                self.oq_start += ql;
            }
        }
        // sim_low, stops, gaps_q, score and identity are left stale; nothing
        // downstream of boundary adjustment reads them.
    }

    /// Map a reference coordinate inside [ref_start, ref_end] to the raw read
    /// coordinate it is aligned to, walking the op list from the alignment
    /// start.
    pub fn ref_to_query(&self, ref_pos: i32) -> i32 {
        let rl = ref_pos - self.ref_start;
        let o = if self.fw { 1 } else { -1 };
        let mut ri: i32 = -1;
        let mut qi: i32 = -1;
        for &op in &self.ops {
            match op {
                GapOp::MatchRun(m) => {
                    let d = rl - ri;
                    if d <= m {
                        ri += d;
                        qi += d;
                        break;
                    }
                    ri += m;
                    qi += m;
                }
                GapOp::QueryGap(k) => ri += k,
                GapOp::RefGap(k) => qi += k,
            }
            if ri >= rl {
                break;
            }
        }
        self.q_start + qi * o
    }

    /// The concise per-alignment output field:
    /// locus:exons:refspan:readspan:mmgp:deltas.
    pub fn concise_form(&self, locus: &str) -> String {
        format!(
            "{}:{}:{}-{}:{}-{}:{}:{}",
            locus,
            self.seg_exon,
            self.ref_start,
            self.ref_end,
            self.q_start,
            self.q_end,
            self.mmgp,
            GapOp::to_deltas(&self.ops).iter().format(",")
        )
    }
}

// Ops from a walk position to the end, the op under the position truncated.
fn ops_after(ops: &[GapOp], idx: usize, off: i32) -> Vec<GapOp> {
    let mut out = Vec::new();
    if idx < ops.len() {
        match ops[idx] {
            GapOp::MatchRun(m) if m - off > 0 => out.push(GapOp::MatchRun(m - off)),
            GapOp::RefGap(k) if k - off > 0 => out.push(GapOp::RefGap(k - off)),
            GapOp::QueryGap(k) => out.push(GapOp::QueryGap(k)),
            _ => {}
        }
        out.extend_from_slice(&ops[idx + 1..]);
    }
    out
}

// Ops from the start up to a walk position.
fn ops_before(ops: &[GapOp], idx: usize, off: i32) -> Vec<GapOp> {
    let mut out = ops[..idx.min(ops.len())].to_vec();
    if off > 0 {
        match ops[idx] {
            GapOp::MatchRun(_) => out.push(GapOp::MatchRun(off)),
            GapOp::RefGap(_) => out.push(GapOp::RefGap(off)),
            GapOp::QueryGap(_) => {}
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    // Alignment of a 9-base read to a 10-base reference with one query gap
    // after the fourth read base.
    fn gapped() -> DeltaAlign {
        let mut a = DeltaAlign::from_delta_block(1, 10, 1, 9, 1, 0, 0, &[5, 0]);
        a.rseg = "ACGTACGTAC".to_string();
        a.qseg = "ACGTCGTAC".to_string();
        a
    }

    #[test]
    fn test_delta_round_trip() {
        let deltas = vec![5, 1, -3, 0];
        let ops = GapOp::from_deltas(&deltas, 12);
        assert_eq!(GapOp::to_deltas(&ops), deltas);
    }

    #[test]
    fn test_derived_fields() {
        let a = gapped();
        assert_eq!(a.q_len, 9);
        assert_eq!(a.gaps_q, 1);
        // 9 matching columns, 0 mismatches, 1 gap.
        assert_eq!(a.score, 9 * MATCH_SCORE + GAP_SCORE);
        assert!((a.identity - 0.9).abs() < 1e-9);
        assert!(a.fw);
    }

    #[test]
    fn test_end_alignment_renders_gap() {
        let a = gapped();
        let (r, q) = a.end_alignment(9, false);
        assert_eq!(r, "ACGTACGTAC");
        assert_eq!(q, "ACGT_CGTAC");
        let (r, q) = a.end_alignment(-3, false);
        assert_eq!(r, "TAC");
        assert_eq!(q, "TAC");
    }

    #[test]
    fn test_cut_head() {
        let mut a = gapped();
        a.cut_end(2);
        assert_eq!((a.ref_start, a.ref_end), (3, 10));
        assert_eq!((a.q_start, a.q_end), (3, 9));
        assert_eq!(a.q_len, 7);
        assert_eq!(GapOp::to_deltas(&a.ops), vec![3, 0]);
        assert_eq!(a.rseg, "GTACGTAC");
        assert_eq!(a.qseg, "GTCGTAC");
    }

    #[test]
    fn test_cut_tail() {
        let mut a = gapped();
        a.cut_end(-3);
        assert_eq!((a.ref_start, a.ref_end), (1, 7));
        assert_eq!((a.q_start, a.q_end), (1, 6));
        assert_eq!(a.q_len, 6);
        assert_eq!(GapOp::to_deltas(&a.ops), vec![5, 0]);
        assert_eq!(a.qseg, "ACGTCG");
    }

    #[test]
    fn test_cut_conserves_query_bases() {
        // Cutting two overlapping alignments at one offset keeps the union of
        // their read spans and makes them disjoint.
        let mut a = DeltaAlign::from_delta_block(1, 60, 1, 60, 0, 0, 0, &[0]);
        a.rseg = "A".repeat(60);
        a.qseg = "A".repeat(60);
        let mut b = DeltaAlign::from_delta_block(101, 160, 41, 100, 0, 0, 0, &[0]);
        b.rseg = "A".repeat(60);
        b.qseg = "A".repeat(60);
        let ol = a.oq_end - b.oq_start + 1; // 20
        let cut = 8;
        a.cut_end(-(ol - cut));
        b.cut_end(cut);
        assert_eq!(a.oq_end + 1, b.oq_start);
        assert_eq!(a.oq_start, 1);
        assert_eq!(b.oq_end, 100);
    }

    #[test]
    fn test_cut_adjusts_mismatches() {
        let mut a = DeltaAlign::from_delta_block(1, 8, 1, 8, 2, 0, 0, &[0]);
        a.rseg = "ACGTACGT".to_string();
        a.qseg = "ACGTACCA".to_string(); // two mismatches in the tail
        a.cut_end(-2);
        assert_eq!(a.mmgp, 0);
        assert_eq!(a.q_len, 6);
    }

    #[test]
    fn test_ref_to_query_identity_walk() {
        let a = DeltaAlign::from_delta_block(100, 199, 11, 110, 0, 0, 0, &[0]);
        // No indels: read coordinate is read start plus the anchor offset.
        assert_eq!(a.ref_to_query(150), 11 + 50);
    }

    #[test]
    fn test_ref_to_query_skips_query_gap() {
        let a = gapped();
        // Reference offset 6 sits one gapped column past offset 4.
        assert_eq!(a.ref_to_query(7), 6);
    }

    #[test]
    fn test_ref_to_query_reverse() {
        let a = DeltaAlign::from_delta_block(100, 199, 110, 11, 0, 0, 0, &[0]);
        assert!(!a.fw);
        assert_eq!(a.ref_to_query(150), 110 - 50);
    }

    #[test]
    fn test_overlap_is_one_directional() {
        let long = DeltaAlign::from_delta_block(1, 100, 1, 100, 0, 0, 0, &[0]);
        let short = DeltaAlign::from_delta_block(200, 230, 60, 90, 0, 0, 0, &[0]);
        assert!(long.overlaps_most_of(&short));
        assert!(!short.overlaps_most_of(&long));
    }

    #[test]
    fn test_concise_form() {
        let mut a = gapped();
        a.seg_exon = "TRBV1_0".to_string();
        assert_eq!(a.concise_form("hsa_trb"), "hsa_trb:TRBV1_0:1-10:1-9:1:5,0");
    }
}
