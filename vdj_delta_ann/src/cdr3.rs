// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Extraction and translation of the CDR3 junction.  The anchors live in
// reference coordinates; each one is pushed through its alignment's gap
// structure to a read coordinate, and the read substring between the two
// mapped anchors is the junction.

use amino::codon_to_aa;
use vdj_delta::align::DeltaAlign;
use vdj_locus::anchors::Cdr3Anchors;
use vdj_locus::fastx::revcom;

pub const SENTINEL: &str = "---";

/// One V x J candidate pair's junction: the V:junction:J triple, the
/// read-quality substring under it, and its translation.
#[derive(Clone, Debug)]
pub struct Cdr3Call {
    pub triple: String,
    pub qual: String,
    pub aa: String,
}

/// Translate in frame 0.  A codon outside the 64-entry table becomes '*',
/// and a trailing partial codon is marked with '_'.
pub fn translate(seq: &str) -> String {
    let b = seq.as_bytes();
    let mut aa = String::new();
    for codon in b.chunks_exact(3) {
        if codon.iter().all(|c| matches!(c, b'A' | b'C' | b'G' | b'T')) {
            aa.push(codon_to_aa(codon) as char);
        } else {
            aa.push('*');
        }
    }
    if b.len() % 3 != 0 {
        aa.push('_');
    }
    aa
}

/// Extract the junction for every V x J candidate pair, the representative
/// first and its ties after it on both sides.  A candidate without an anchor
/// (a pseudogene), or whose anchor falls outside its own alignment span,
/// yields the sentinel triple for its pairs.
pub fn extract_cdr3(
    v_aln: &DeltaAlign,
    j_aln: &DeltaAlign,
    anchors: &Cdr3Anchors,
    seq: &str,
    qual: &str,
) -> Vec<Cdr3Call> {
    let mut calls = Vec::new();
    for v in candidates(v_aln) {
        for j in candidates(j_aln) {
            let mut cdr3_seq = SENTINEL.to_string();
            let mut cdr3_qual = SENTINEL.to_string();
            let mut cdr3_aa = SENTINEL.to_string();

            let anchored = match (anchors.get(&v.seg), anchors.get(&j.seg)) {
                (Some(vp), Some(jp)) => {
                    v.ref_start <= vp
                        && vp <= v.ref_end
                        && j.ref_start <= jp
                        && jp <= j.ref_end
                }
                _ => false,
            };
            if anchored {
                let vq = v.ref_to_query(anchors.get(&v.seg).unwrap());
                let jq = j.ref_to_query(anchors.get(&j.seg).unwrap());
                // The junction runs V to J on the read; when the J alignment
                // runs leftward the extract comes off the other strand.
                let (lo, hi, rc) = if j.q_start < j.q_end {
                    (vq, jq, false)
                } else {
                    (jq, vq, true)
                };
                if let (true, Some(s), Some(q)) = (
                    lo >= 1,
                    seq.get(lo.max(1) as usize - 1..hi.max(0) as usize),
                    qual.get(lo.max(1) as usize - 1..hi.max(0) as usize),
                ) {
                    if rc {
                        cdr3_seq = revcom(s);
                        cdr3_qual = q.chars().rev().collect();
                    } else {
                        cdr3_seq = s.to_string();
                        cdr3_qual = q.to_string();
                    }
                    cdr3_aa = translate(&cdr3_seq);
                }
            }

            calls.push(Cdr3Call {
                triple: format!("{}:{}:{}", v.seg, cdr3_seq, j.seg),
                qual: cdr3_qual,
                aa: cdr3_aa,
            });
        }
    }
    calls
}

fn candidates(a: &DeltaAlign) -> Vec<&DeltaAlign> {
    std::iter::once(a).chain(a.ties.iter()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use vdj_locus::anchors::Cdr3Anchors;

    #[test]
    fn test_translate() {
        assert_eq!(translate("ATGGGC"), "MG");
        assert_eq!(translate("ATGG"), "M_");
        assert_eq!(translate("TAA"), "*");
        assert_eq!(translate("ATNGGC"), "*G");
        assert_eq!(translate(""), "");
    }

    fn anchors() -> Cdr3Anchors {
        Cdr3Anchors::from_text(
            "hsa_trb\tTRBV1\t0\t1\t2\t95\n\
             hsa_trb\tTRBJ2-1\t0\t---\t---\t505\n\
             hsa_trb\tTRBV9\t0\t---\t---\t---\n",
        )
        .unwrap()
    }

    fn v_align() -> DeltaAlign {
        let mut v = DeltaAlign::from_delta_block(1, 100, 1, 100, 0, 0, 0, &[0]);
        v.seg = "TRBV1".to_string();
        v
    }

    fn j_align() -> DeltaAlign {
        let mut j = DeltaAlign::from_delta_block(500, 560, 110, 170, 0, 0, 0, &[0]);
        j.seg = "TRBJ2-1".to_string();
        j
    }

    #[test]
    fn test_forward_junction() {
        let seq = "ACGT".repeat(50);
        let qual = "I".repeat(200);
        let calls = extract_cdr3(&v_align(), &j_align(), &anchors(), &seq, &qual);
        assert_eq!(calls.len(), 1);
        // Anchors at ref 95 and 505 map to read 95 and 115.
        let junction = &seq[94..115];
        assert_eq!(calls[0].triple, format!("TRBV1:{junction}:TRBJ2-1"));
        assert_eq!(calls[0].qual, "I".repeat(21));
        assert_eq!(calls[0].aa, translate(junction));
        assert!(!calls[0].triple.contains(SENTINEL));
    }

    #[test]
    fn test_reverse_junction_is_reverse_complemented() {
        // A read off the other strand: both alignments run leftward, the J
        // anchor maps left of the V anchor, and the junction comes back
        // reverse-complemented with its quality reversed.
        let mut v = DeltaAlign::from_delta_block(1, 100, 200, 101, 0, 0, 0, &[0]);
        v.seg = "TRBV1".to_string();
        let mut j = DeltaAlign::from_delta_block(500, 560, 70, 10, 0, 0, 0, &[0]);
        j.seg = "TRBJ2-1".to_string();
        let seq = "ACGT".repeat(50);
        let qual: String = (b'#'..b'J').map(|c| c as char).cycle().take(200).collect();
        let calls = extract_cdr3(&v, &j, &anchors(), &seq, &qual);
        assert_eq!(calls.len(), 1);
        // V anchor 95 maps to 200 - 94 = 106, J anchor 505 to 70 - 5 = 65.
        let expect = revcom(&seq[64..106]);
        assert_eq!(calls[0].triple, format!("TRBV1:{expect}:TRBJ2-1"));
        let expect_qual: String = qual[64..106].chars().rev().collect();
        assert_eq!(calls[0].qual, expect_qual);
    }

    #[test]
    fn test_missing_anchor_gives_sentinel() {
        let mut v = v_align();
        v.seg = "TRBV9".to_string(); // pseudogene, no anchor
        let seq = "A".repeat(200);
        let calls = extract_cdr3(&v, &j_align(), &anchors(), &seq, &seq);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].triple, "TRBV9:---:TRBJ2-1");
        assert_eq!(calls[0].aa, SENTINEL);
    }

    #[test]
    fn test_anchor_outside_span_gives_sentinel() {
        let mut v = v_align();
        v.ref_end = 90; // anchor at 95 now outside
        let seq = "A".repeat(200);
        let calls = extract_cdr3(&v, &j_align(), &anchors(), &seq, &seq);
        assert_eq!(calls[0].qual, SENTINEL);
    }

    #[test]
    fn test_all_pairs_reported() {
        let mut v = v_align();
        let mut v2 = v_align();
        v2.seg = "TRBV9".to_string();
        v.ties.push(v2);
        let seq = "A".repeat(200);
        let calls = extract_cdr3(&v, &j_align(), &anchors(), &seq, &seq);
        assert_eq!(calls.len(), 2);
        assert!(calls[0].triple.starts_with("TRBV1:"));
        assert!(calls[1].triple.starts_with("TRBV9:---:"));
    }
}
