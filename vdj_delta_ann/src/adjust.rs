// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Boundary adjustment of adjacent overlapping alignments.  When two segment
// alignments claim the same stretch of the read, the shared region is walked
// base by base and cut at the position maximizing the combined match score,
// with a bonus for cuts that land on canonical GT/AG splice dinucleotides.

use vdj_delta::align::DeltaAlign;
use vdj_delta::{EXACT_BONUS, GAP_SCORE, MATCH_SCORE, MISMATCH_SCORE, SPLICE_BONUS};
use vdj_locus::exons::GeneClass;
use vdj_locus::fastx::{revcom, subseq};
use vector_utils::erase_if;

use crate::annotate::MIN_INTERGENIC_LEN;

/// Trim every adjacent overlapping pair of unambiguous alignments at the
/// best-scoring cut point inside the overlap.  An earlier alignment that
/// would end up enclosed in the later one is marked and removed instead, and
/// pairs touching the very start of the reference are left alone.  Query
/// bases are only reassigned between the two alignments, never dropped.
pub fn adjust_overlaps(aligns: &mut Vec<DeltaAlign>, refstr: &str, qry: &str) {
    for i in 1..aligns.len() {
        if !aligns[i - 1].ties.is_empty() || !aligns[i].ties.is_empty() {
            continue;
        }
        let ol = aligns[i - 1].oq_end - aligns[i].oq_start + 1;
        if ol <= 0 {
            continue;
        }

        // The earlier alignment would be enclosed in the later one once cut.
        if aligns[i - 1].oq_start + aligns[i - 1].oq_end >= 2 * aligns[i].oq_start {
            aligns[i - 1].remove = true;
            continue;
        }

        // A segment abutting the start of the reference has no usable splice
        // context.
        if aligns[i - 1].ref_start == 1 || aligns[i].ref_start == 1 {
            continue;
        }

        if aligns[i - 1].rseg.is_empty() {
            load_context(&mut aligns[i - 1], refstr, qry);
        }
        load_context(&mut aligns[i], refstr, qry);

        if aligns[i - 1].fw == aligns[i].fw {
            // Both on one strand: orient the pair along the reference, so the
            // GT donor follows the reference-earlier segment and the AG
            // acceptor precedes the reference-later one.
            let (e, l) = if aligns[i].fw { (i - 1, i) } else { (i, i - 1) };
            let seq1 = aligns[e].end_alignment(-ol, false);
            let seq2 = aligns[l].end_alignment(ol, false);
            let cut = max_score_position(&seq1, &seq2, &aligns[e].rflank, &aligns[l].lflank);
            aligns[e].cut_end(-(ol - cut));
            aligns[l].cut_end(cut);
        } else {
            // Opposite strands: orient both along the read; no splice signal
            // to speak of.
            let seq1 = if aligns[i - 1].fw {
                aligns[i - 1].end_alignment(-ol, false)
            } else {
                aligns[i - 1].end_alignment(ol, true)
            };
            let seq2 = if aligns[i].fw {
                aligns[i].end_alignment(ol, false)
            } else {
                aligns[i].end_alignment(-ol, true)
            };
            let cut = max_score_position(&seq1, &seq2, "", "");
            let n1 = if aligns[i - 1].fw { -(ol - cut) } else { ol - cut };
            aligns[i - 1].cut_end(n1);
            let n2 = if aligns[i].fw { cut } else { -cut };
            aligns[i].cut_end(n2);
        }
    }

    let to_delete: Vec<bool> = aligns
        .iter()
        .map(|a| a.remove || (a.class == GeneClass::I && a.q_len < MIN_INTERGENIC_LEN))
        .collect();
    erase_if(aligns, &to_delete);
}

fn load_context(a: &mut DeltaAlign, refstr: &str, qry: &str) {
    a.rseg = subseq(refstr, a.ref_start, a.ref_end);
    a.lflank = subseq(refstr, a.ref_start - 2, a.ref_start - 1);
    a.rflank = subseq(refstr, a.ref_end + 1, a.ref_end + 2);
    a.qseg = subseq(qry, a.oq_start, a.oq_end);
    if !a.fw {
        a.qseg = revcom(&a.qseg);
    }
}

// Pick the cut offset in [0, overlap] maximizing (cumulative score of the
// earlier segment up to the cut) minus (cumulative score of the later segment
// up to the cut).  Exact matches earn the match score plus a bonus,
// soft-masked matches the match score alone.  When both flanking
// dinucleotides are known, a GT immediately after the earlier segment's cut
// and an AG immediately before the later segment's cut earn the splice
// bonus.  Ties break to the leftmost offset.
fn max_score_position(
    seq1: &(String, String),
    seq2: &(String, String),
    rfk1: &str,
    rfk2: &str,
) -> i32 {
    let spq = rfk1.len() == 2 && rfk2.len() == 2;
    let mut sps1 = Vec::<i32>::new();
    let mut sps2 = Vec::<i32>::new();
    if spq {
        let r1 = format!("{}{}", seq1.0, rfk1).to_uppercase().into_bytes();
        for i in 0..r1.len() - 1 {
            sps1.push(if r1[i] == b'G' && r1[i + 1] == b'T' {
                SPLICE_BONUS
            } else {
                0
            });
        }
        let r2 = format!("{}{}", rfk2, seq2.0).to_uppercase().into_bytes();
        for i in 2..r2.len() + 1 {
            sps2.push(if r2[i - 2] == b'A' && r2[i - 1] == b'G' {
                SPLICE_BONUS
            } else {
                0
            });
        }
    }

    // The acceptor bonus is subtracted from the later segment's running
    // score, so the earlier-minus-later difference rewards both signals.
    let qps1 = cumulative_scores(seq1, &sps1, spq, 1);
    let qps2 = cumulative_scores(seq2, &sps2, spq, -1);

    let n = qps1.len().min(qps2.len());
    let mut best = 0;
    for i in 1..n {
        if qps1[i] - qps2[i] > qps1[best] - qps2[best] {
            best = i;
        }
    }
    best as i32
}

// Position-indexed cumulative alignment score over the gapped rows, with the
// splice bonus folded in at each candidate cut.
fn cumulative_scores(seq: &(String, String), sps: &[i32], spq: bool, sign: i32) -> Vec<i32> {
    let rb = seq.0.as_bytes();
    let qb = seq.1.as_bytes();
    let bonus = |ri: i32| -> i32 {
        if spq {
            sign * sps.get((ri + 1) as usize).copied().unwrap_or(0)
        } else {
            0
        }
    };
    let mut qps = Vec::with_capacity(rb.len() + 1);
    let mut cs = 0;
    let mut ri: i32 = -1;
    qps.push(bonus(ri));
    for i in 0..rb.len() {
        if rb[i] != b'_' {
            ri += 1;
        }
        if qb[i] != b'_' {
            if rb[i] != b'_' {
                if rb[i] == qb[i] {
                    cs += MATCH_SCORE + EXACT_BONUS;
                } else if rb[i] - 32 == qb[i] {
                    cs += MATCH_SCORE;
                } else {
                    cs += MISMATCH_SCORE;
                }
            } else {
                cs += GAP_SCORE;
            }
            qps.push(cs + bonus(ri));
        } else {
            cs += GAP_SCORE;
        }
    }
    qps
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn seqs(r: &str, q: &str) -> (String, String) {
        (r.to_string(), q.to_string())
    }

    #[test]
    fn test_cut_at_mismatch_boundary() {
        // Earlier segment matches the first four read bases, later segment
        // the rest; the score peak sits where the mismatches change sides.
        let seq1 = seqs("ACGTTTTT", "ACGTACCA");
        let seq2 = seqs("GGGGACCA", "ACGTACCA");
        assert_eq!(max_score_position(&seq1, &seq2, "", ""), 4);
    }

    #[test]
    fn test_splice_bonus_breaks_flat_ties() {
        // Both rows match everywhere, so without flanks the combined score is
        // flat and the cut stays leftmost.
        let seq1 = seqs("ACGTAC", "ACGTAC");
        let seq2 = seqs("ACGTAC", "ACGTAC");
        assert_eq!(max_score_position(&seq1, &seq2, "", ""), 0);
        // A GT donor right after position 2 of the earlier segment tips it.
        let seq1 = seqs("ACGTAC", "ACGTAC");
        assert_eq!(max_score_position(&seq1, &seq2, "CC", "CC"), 2);
    }

    #[test]
    fn test_adjustment_conserves_read_bases() {
        let refstr = format!("{}ACGTACGTACGTACGTACGT{}", "T".repeat(99), "A".repeat(200));
        let qry = "ACGTACGTACGTACGTACGT";
        // Two alignments of one 20-base read, overlapping by 6 read bases.
        let mut aligns = vec![
            DeltaAlign::from_delta_block(100, 113, 1, 14, 0, 0, 0, &[0]),
            DeltaAlign::from_delta_block(108, 119, 9, 20, 0, 0, 0, &[0]),
        ];
        aligns[0].class = GeneClass::V;
        aligns[1].class = GeneClass::J;
        let before: i32 = aligns[0].oq_start.min(aligns[1].oq_start);
        let after: i32 = aligns[0].oq_end.max(aligns[1].oq_end);
        adjust_overlaps(&mut aligns, &refstr, qry);
        assert_eq!(aligns.len(), 2);
        // Disjoint and contiguous: the union is unchanged.
        assert_eq!(aligns[0].oq_end + 1, aligns[1].oq_start);
        assert_eq!(aligns[0].oq_start, before);
        assert_eq!(aligns[1].oq_end, after);
    }

    #[test]
    fn test_splice_context_places_cut() {
        // Same setup as above: the reference carries a GT right after the
        // earlier alignment's overlap offset 2, which decides an otherwise
        // flat score surface.
        let refstr = format!("{}ACGTACGTACGTACGTACGT{}", "T".repeat(99), "A".repeat(200));
        let qry = "ACGTACGTACGTACGTACGT";
        let mut aligns = vec![
            DeltaAlign::from_delta_block(100, 113, 1, 14, 0, 0, 0, &[0]),
            DeltaAlign::from_delta_block(108, 119, 9, 20, 0, 0, 0, &[0]),
        ];
        aligns[0].class = GeneClass::V;
        aligns[1].class = GeneClass::J;
        adjust_overlaps(&mut aligns, &refstr, qry);
        assert_eq!(aligns[0].oq_end, 10);
        assert_eq!(aligns[1].oq_start, 11);
    }

    #[test]
    fn test_enclosed_alignment_removed() {
        let refstr = "A".repeat(400);
        let qry = "A".repeat(100);
        let mut aligns = vec![
            DeltaAlign::from_delta_block(100, 139, 21, 60, 0, 0, 0, &[0]),
            DeltaAlign::from_delta_block(200, 279, 21, 100, 0, 0, 0, &[0]),
        ];
        // Midpoint of the earlier alignment is at or past the later's start.
        adjust_overlaps(&mut aligns, &refstr, &qry);
        assert_eq!(aligns.len(), 1);
        assert_eq!(aligns[0].q_len, 80);
    }

    #[test]
    fn test_reference_start_skipped() {
        let refstr = "ACGTACGTACGTACGTACGT".to_string();
        let qry = "ACGTACGTACGTACGTACGT";
        let mut aligns = vec![
            DeltaAlign::from_delta_block(1, 14, 1, 14, 0, 0, 0, &[0]),
            DeltaAlign::from_delta_block(7, 18, 9, 20, 0, 0, 0, &[0]),
        ];
        aligns[0].class = GeneClass::V;
        aligns[1].class = GeneClass::J;
        adjust_overlaps(&mut aligns, &refstr, qry);
        // Untouched: still overlapping.
        assert_eq!(aligns[0].oq_end, 14);
        assert_eq!(aligns[1].oq_start, 9);
    }
}
