// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Greedy selection of a maximal-score, mutually non-redundant alignment
// subset for one read.

use vdj_delta::align::DeltaAlign;
use vector_utils::erase_if;

/// Keep a greedy optimal subset of the candidate alignments: repeatedly take
/// the best remaining alignment by (score, identity), together with any exact
/// ties, and discard every candidate whose oriented-query overlap with a
/// taken alignment exceeds half of the candidate's own length.  Greedy rather
/// than exact interval cover; for the alignment sets a read produces the
/// difference does not matter and the scan is linear.
pub fn optimal_set(aligns: &mut Vec<DeltaAlign>) {
    aligns.sort_by(DeltaAlign::cmp_score_desc);
    let mut accepted = Vec::<DeltaAlign>::new();
    while !aligns.is_empty() {
        let mut best = vec![aligns.remove(0)];
        while !aligns.is_empty()
            && aligns[0].score == best[0].score
            && aligns[0].identity == best[0].identity
        {
            best.push(aligns.remove(0));
        }
        for b in &best {
            let to_delete: Vec<bool> = aligns.iter().map(|a| b.overlaps_most_of(a)).collect();
            erase_if(aligns, &to_delete);
        }
        accepted.append(&mut best);
    }
    *aligns = accepted;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn align(ref_start: i32, q_start: i32, q_end: i32, mmgp: i32) -> DeltaAlign {
        DeltaAlign::from_delta_block(
            ref_start,
            ref_start + (q_end - q_start).abs(),
            q_start,
            q_end,
            mmgp,
            0,
            0,
            &[0],
        )
    }

    #[test]
    fn test_empty_input() {
        let mut aligns = Vec::new();
        optimal_set(&mut aligns);
        assert!(aligns.is_empty());
    }

    #[test]
    fn test_buried_alignment_is_dropped() {
        // A short alignment inside a long higher-scoring one goes away.
        let mut aligns = vec![align(1, 1, 100, 0), align(500, 20, 60, 0)];
        optimal_set(&mut aligns);
        assert_eq!(aligns.len(), 1);
        assert_eq!(aligns[0].q_len, 100);
    }

    #[test]
    fn test_disjoint_alignments_survive() {
        let mut aligns = vec![align(1, 1, 100, 0), align(500, 120, 180, 0)];
        optimal_set(&mut aligns);
        assert_eq!(aligns.len(), 2);
    }

    #[test]
    fn test_accepted_pairs_respect_overlap_bound() {
        let mut aligns = vec![
            align(1, 1, 100, 0),
            align(300, 60, 220, 1),
            align(600, 80, 130, 0),
            align(900, 190, 260, 2),
        ];
        optimal_set(&mut aligns);
        for a in &aligns {
            for b in &aligns {
                if !std::ptr::eq(a, b) {
                    assert!(!a.overlaps_most_of(b), "accepted pair violates the bound");
                }
            }
        }
    }

    #[test]
    fn test_exact_ties_kept_together() {
        // Two alignments with identical score and identity over the same
        // query extent both survive as one tie group.
        let mut aligns = vec![align(1, 1, 100, 0), align(2000, 1, 100, 0)];
        optimal_set(&mut aligns);
        assert_eq!(aligns.len(), 2);
    }
}
