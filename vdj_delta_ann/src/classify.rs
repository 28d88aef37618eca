// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Classification of a read's overall gene arrangement, and resolution of its
// canonical V(D)J order via the longest rank-monotone chain of alignments.

use serde::Serialize;
use std::fmt;
use vdj_delta::align::DeltaAlign;
use vdj_delta::reader::DeltaRecord;
use vdj_locus::exons::{ChainRank, GeneClass};

use crate::annotate::INVERTED_V;

// A class switch can put a C1 alignment where genomic order wants C2; the
// regression is tolerated up to the distance between the two constant
// regions on the reference.
const REPLACEABLE_C: &str = "TRBC1";
const C_REPLACE_SPAN: i32 = 9346;

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// RECOMBINATION CODE
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
pub enum Recomb {
    Normal,
    Rearranged,
}

impl fmt::Display for Recomb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recomb::Normal => write!(f, "normal"),
            Recomb::Rearranged => write!(f, "rearranged"),
        }
    }
}

/// Classify the arrangement of a read's alignments.  More than one constant
/// region, mixed gene orientations, or reference coordinates running
/// backwards along the read all mean the read does not lay out like the
/// germline locus.  The inverted V segment is set aside before the
/// coordinate check, and a backward step into the replaceable C1 is allowed
/// within the genomic distance separating the constant regions.
pub fn recomb_code(aligns: &[DeltaAlign]) -> Recomb {
    if aligns.is_empty() {
        return Recomb::Normal;
    }
    let mut c_count = 0;
    let (mut fw, mut rc) = (0, 0);
    for a in aligns {
        if a.class == GeneClass::C {
            c_count += 1;
        }
        if a.gene_fw {
            fw += 1;
        } else {
            rc += 1;
        }
    }
    if c_count > 1 || (fw > 0 && rc > 0) {
        return Recomb::Rearranged;
    }

    let mut rest: Vec<&DeltaAlign> = aligns.iter().filter(|a| a.seg != INVERTED_V).collect();
    if rc > 0 {
        rest.reverse();
    }
    for w in rest.windows(2) {
        if w[0].ref_start > w[1].ref_start {
            if w[1].seg == REPLACEABLE_C && w[0].ref_start <= w[1].ref_start + C_REPLACE_SPAN {
                continue;
            }
            return Recomb::Rearranged;
        }
    }
    Recomb::Normal
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// ORDER RESOLUTION
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Everything the order resolution decides about one read.
#[derive(Clone, Debug)]
pub struct QueryCall {
    pub fw: bool,          // resolved read orientation
    pub chain: Vec<usize>, // indices of the winning rank-monotone chain
    pub vi: i32,           // index of the V, D, J alignment, -1 when absent
    pub di: i32,
    pub ji: i32,
    pub combined: String, // V:D:J annotation, ties |-joined
    pub aligned_len: i32,
    pub aligned_frac: f64,
    pub regularity: i32, // -1, 0, 1 or 2
}

impl Default for QueryCall {
    fn default() -> Self {
        QueryCall {
            fw: true,
            chain: Vec::new(),
            vi: -1,
            di: -1,
            ji: -1,
            combined: String::new(),
            aligned_len: 0,
            aligned_frac: 0.0,
            regularity: -1,
        }
    }
}

// The two monotone-chain DPs over the class-plus-exon-rank order, maximizing
// total aligned length.  Intergenic alignments never join a chain.  Returns
// the winning chain's indices and the resolved orientation: a strict
// non-decreasing win with more than one link is forward, a non-increasing
// win is reverse, and anything else falls back to the orientation of the
// chain's last alignment.
fn longest_monotone_chain(aligns: &[DeltaAlign]) -> (Vec<usize>, bool) {
    let n = aligns.len();
    let mut nd_len: Vec<i32> = aligns.iter().map(|a| a.q_len).collect();
    let mut ni_len = nd_len.clone();
    let mut nd_from = vec![-1i32; n];
    let mut ni_from = vec![-1i32; n];

    for i in 1..n {
        for j in 0..i {
            let (Some(rj), Some(ri)) = (aligns[j].rank, aligns[i].rank) else {
                continue;
            };
            if rj <= ri && nd_len[j] + aligns[i].q_len > nd_len[i] {
                nd_len[i] = nd_len[j] + aligns[i].q_len;
                nd_from[i] = j as i32;
            }
            if rj >= ri && ni_len[j] + aligns[i].q_len > ni_len[i] {
                ni_len[i] = ni_len[j] + aligns[i].q_len;
                ni_from[i] = j as i32;
            }
        }
    }

    let (mut nd_max, mut nd_max_i) = (0, 0);
    let (mut ni_max, mut ni_max_i) = (0, 0);
    for i in 0..n {
        if nd_len[i] >= nd_max {
            nd_max = nd_len[i];
            nd_max_i = i;
        }
        if ni_len[i] >= ni_max {
            ni_max = ni_len[i];
            ni_max_i = i;
        }
    }

    let backtrack = |from: &[i32], mut i: usize| {
        let mut chain = vec![i];
        while from[i] != -1 {
            i = from[i] as usize;
            chain.insert(0, i);
        }
        chain
    };

    if nd_max >= ni_max {
        let chain = backtrack(&nd_from, nd_max_i);
        let fw = if nd_max > ni_max && chain.len() > 1 {
            true
        } else {
            aligns[nd_max_i].gene_fw
        };
        (chain, fw)
    } else {
        (backtrack(&ni_from, ni_max_i), false)
    }
}

/// Resolve the read's orientation and canonical gene order, reorder the
/// alignments to forward orientation, locate the V/D/J alignments, and grade
/// how regular the call is.
pub fn resolve_order(rec: &mut DeltaRecord, frac_threshold: f64) -> QueryCall {
    let mut call = QueryCall::default();
    if rec.aligns.is_empty() {
        return call;
    }

    let (chain, fw) = longest_monotone_chain(&rec.aligns);
    call.chain = chain;
    call.fw = fw;

    // Total read length covered by any alignment, walking the query-sorted
    // intervals.
    let mut al = 0;
    let (mut qs, mut qe) = (rec.aligns[0].oq_start, rec.aligns[0].oq_end);
    for a in &rec.aligns[1..] {
        if a.oq_start > qe {
            al += qe - qs + 1;
            qs = a.oq_start;
            qe = a.oq_end;
        } else {
            qe = a.oq_end;
        }
    }
    al += qe - qs + 1;
    call.aligned_len = al;
    call.aligned_frac = f64::from(al) / f64::from(rec.len_q);

    if !call.fw {
        rec.aligns.reverse();
    }

    // V, D and J indices; a later D or J never displaces a chain that
    // already found its V.
    for (i, a) in rec.aligns.iter().enumerate() {
        let i = i as i32;
        match a.rank {
            Some(ChainRank::V0) | Some(ChainRank::V2) => call.vi = i,
            Some(ChainRank::D0) if call.vi != -1 || call.di == -1 => call.di = i,
            Some(ChainRank::J0) if call.vi != -1 || call.di != -1 || call.ji == -1 => {
                call.ji = i;
            }
            _ => {}
        }
    }

    let combined = |idx: i32| -> String {
        if idx < 0 {
            return "---".to_string();
        }
        let a = &rec.aligns[idx as usize];
        std::iter::once(&a.seg)
            .chain(a.ties.iter().map(|t| &t.seg))
            .cloned()
            .collect::<Vec<String>>()
            .join("|")
    };
    call.combined = format!(
        "{}:{}:{}",
        combined(call.vi),
        combined(call.di),
        combined(call.ji)
    );

    // Regularity: tier 1 for a contiguous V(D)J, tier 2 when the call is
    // additionally anchored at both ends of the read (allowing a leading V
    // leader exon of the same segment and a trailing C1), tier 0 otherwise,
    // and -1 when too little of the read aligned at all.
    let (vi, di, ji) = (call.vi, call.di, call.ji);
    let n = rec.aligns.len() as i32;
    if vi != -1 && ji != -1 {
        if ji - vi == 1 || (ji - vi == 2 && di == (vi + ji) / 2) {
            call.regularity = 1;
            let mut vq = vi <= 1;
            if vi == 1
                && !(rec.aligns[0].rank == Some(ChainRank::V1)
                    && rec.aligns[0].seg == rec.aligns[1].seg)
            {
                vq = false;
            }
            let mut cq = ji >= n - 2;
            if ji == n - 2 && rec.aligns[(ji + 1) as usize].rank != Some(ChainRank::C1) {
                cq = false;
            }
            if vq && cq {
                call.regularity = 2;
            }
        } else {
            call.regularity = 0;
        }
    } else {
        call.regularity = 0;
    }
    if call.aligned_frac < frac_threshold {
        call.regularity = -1;
    }
    call
}

#[cfg(test)]
mod tests {
    use super::*;
    use vdj_locus::exons::{ExonTable, GeneClass};

    fn table() -> ExonTable {
        ExonTable::from_text(
            "hsa_trb\tTRBV1\tF\t+\t100..180,300..600\n\
             hsa_trb\tTRBD1\tF\t+\t1000..1012\n\
             hsa_trb\tTRBJ2-1\tF\t+\t1500..1550\n\
             hsa_trb\tTRBC1\tF\t+\t2000..2380,2500..2610,2700..2717,2800..3070\n",
        )
        .unwrap()
    }

    fn annotated(spans: &[(i32, i32, i32, i32)]) -> DeltaRecord {
        let mut rec = DeltaRecord {
            id_r: "locus".to_string(),
            id_q: "read".to_string(),
            len_r: 5000,
            len_q: spans.iter().map(|s| s.2.max(s.3)).max().unwrap_or(0),
            aligns: spans
                .iter()
                .map(|&(rs, re, qs, qe)| DeltaAlign::from_delta_block(rs, re, qs, qe, 0, 0, 0, &[0]))
                .collect(),
        };
        crate::annotate::annotate_segments(&mut rec.aligns, &table());
        rec
    }

    #[test]
    fn test_normal_read() {
        let rec = annotated(&[(300, 600, 1, 301), (1500, 1550, 310, 360)]);
        assert_eq!(recomb_code(&rec.aligns), Recomb::Normal);
    }

    #[test]
    fn test_two_constants_is_rearranged() {
        let rec = annotated(&[(2000, 2100, 1, 101), (2500, 2600, 110, 210)]);
        // Both alignments land in C exons of the same segment here, which is
        // enough for the count.
        assert_eq!(recomb_code(&rec.aligns), Recomb::Rearranged);
    }

    #[test]
    fn test_mixed_orientation_is_rearranged() {
        let rec = annotated(&[(300, 600, 1, 301), (1500, 1550, 360, 310)]);
        assert_eq!(recomb_code(&rec.aligns), Recomb::Rearranged);
    }

    #[test]
    fn test_backward_reference_order_is_rearranged() {
        let rec = annotated(&[(1500, 1550, 1, 51), (300, 600, 60, 360)]);
        assert_eq!(recomb_code(&rec.aligns), Recomb::Rearranged);
    }

    #[test]
    fn test_classification_symmetric_under_reversal() {
        let mut rec = annotated(&[(300, 600, 1, 301), (1500, 1550, 310, 360)]);
        let forward = recomb_code(&rec.aligns);
        for a in &mut rec.aligns {
            std::mem::swap(&mut a.q_start, &mut a.q_end);
            a.fw = !a.fw;
            a.gene_fw = !a.gene_fw;
        }
        rec.aligns.reverse();
        assert_eq!(recomb_code(&rec.aligns), forward);
    }

    #[test]
    fn test_resolve_order_forward_vj() {
        let mut rec = annotated(&[(300, 600, 1, 301), (1500, 1550, 310, 360)]);
        let call = resolve_order(&mut rec, 0.5);
        assert!(call.fw);
        assert_eq!((call.vi, call.di, call.ji), (0, -1, 1));
        assert_eq!(call.combined, "TRBV1:---:TRBJ2-1");
        assert_eq!(call.regularity, 2);
        assert_eq!(call.aligned_len, 301 + 51);
    }

    #[test]
    fn test_resolve_order_reverse_read() {
        // The same arrangement read from the other strand: J first on the
        // read, both alignments reverse.
        let mut rec = annotated(&[(1500, 1550, 51, 1), (300, 600, 360, 60)]);
        let call = resolve_order(&mut rec, 0.5);
        assert!(!call.fw);
        assert_eq!((call.vi, call.ji), (0, 1));
        assert_eq!(rec.aligns[0].class, GeneClass::V);
        assert_eq!(call.regularity, 2);
    }

    #[test]
    fn test_low_coverage_overrides_tier() {
        let mut rec = annotated(&[(300, 600, 1, 301), (1500, 1550, 310, 360)]);
        rec.len_q = 1000;
        let call = resolve_order(&mut rec, 0.5);
        assert_eq!(call.regularity, -1);
    }

    #[test]
    fn test_irregular_order_gets_tier_zero() {
        let mut rec = annotated(&[
            (300, 600, 1, 301),
            (2000, 2100, 310, 410),
            (1500, 1550, 420, 470),
        ]);
        let call = resolve_order(&mut rec, 0.1);
        assert_eq!(call.regularity, 0);
    }

    #[test]
    fn test_empty_record_stays_tier_minus_one() {
        let mut rec = DeltaRecord::default();
        let call = resolve_order(&mut rec, 0.5);
        assert_eq!(call.regularity, -1);
        assert_eq!(call.combined, "");
    }

    #[test]
    fn test_trailing_c1_keeps_tier_two() {
        let mut rec = annotated(&[
            (300, 600, 1, 301),
            (1500, 1550, 310, 360),
            (2000, 2100, 370, 470),
        ]);
        // Trailing alignment lands in TRBC1 exon 1.
        let call = resolve_order(&mut rec, 0.5);
        assert_eq!((call.vi, call.ji), (0, 1));
        assert_eq!(call.regularity, 2);
    }
}
