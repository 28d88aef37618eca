// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Segment annotation against the exon table, grouping of overlapping
// alignments into competing groups, and resolution of the resulting
// ambiguity.

use std::collections::HashMap;
use vdj_delta::align::DeltaAlign;
use vdj_locus::exons::{family_digit, ChainRank, ExonTable, GeneClass};

/// The one V segment of the TRB locus that lies inverted on the reference,
/// so its gene orientation is the opposite of its raw alignment strand.
pub const INVERTED_V: &str = "TRBV30";

// Intergenic alignments shorter than this are noise.
pub const MIN_INTERGENIC_LEN: i32 = 30;

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// SEGMENT ANNOTATION
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Assign each alignment its segment/exon identity by locating its reference
/// span in the exon table, and correct the gene orientation of the inverted V
/// segment.  Re-annotating with the same table is a no-op.
pub fn annotate_segments(aligns: &mut [DeltaAlign], table: &ExonTable) {
    for a in aligns.iter_mut() {
        let call = table.annotate(a.ref_start, a.ref_end);
        a.seg = call.seg;
        a.seg_exon = call.seg_exon;
        a.class = call.class;
        a.rank = call.rank;
        a.gene_fw = if a.seg == INVERTED_V { !a.fw } else { a.fw };
    }
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// OVERLAP GROUPING
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Sort along the query, drop short intergenic noise, then collapse each run
/// of alignments overlapping the run's first member into one representative,
/// chosen by gene-class priority; the rest become its tie list.
pub fn group_overlaps(aligns: &mut Vec<DeltaAlign>) {
    aligns.sort_by_key(|a| a.oq_start);
    aligns.retain(|a| !(a.class == GeneClass::I && a.q_len < MIN_INTERGENIC_LEN));

    let mut rest = std::mem::take(aligns);
    while !rest.is_empty() {
        let mut group = vec![rest.remove(0)];
        while !rest.is_empty() && group[0].overlaps_most_of(&rest[0]) {
            group.push(rest.remove(0));
        }
        if group.len() > 1 {
            group.sort_by_key(|a| a.class);
        }
        let mut rep = group.remove(0);
        rep.ties = group;
        aligns.push(rep);
    }
}

// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓
// AMBIGUITY RESOLUTION
// ▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓▓

/// Resolve tied alignments per group: V/C groups narrow to the candidates
/// whose segment is used most often anywhere in the read; C groups in the
/// TRB/TRG loci that sit next to a J2-family segment narrow to the paired
/// C2 allele.  Afterward a short noisy fragment wedged between the V and J of
/// a junction is deleted outright.
pub fn resolve_ambiguity(aligns: &mut Vec<DeltaAlign>) {
    if aligns.is_empty() {
        return;
    }

    // Usage count of every segment name in the read, ties included.
    let mut counts = HashMap::<String, i32>::new();
    for a in aligns.iter() {
        *counts.entry(a.seg.clone()).or_insert(0) += 1;
        for t in &a.ties {
            *counts.entry(t.seg.clone()).or_insert(0) += 1;
        }
    }
    let count = |seg: &str| counts.get(seg).copied().unwrap_or(0);

    for i in 0..aligns.len() {
        if aligns[i].ties.is_empty() {
            continue;
        }

        if aligns[i].class == GeneClass::V || aligns[i].class == GeneClass::C {
            let group_size = aligns[i].ties.len() + 1;
            let mut rep = aligns[i].clone();
            let ties = std::mem::take(&mut rep.ties);
            let mut cands = vec![rep];
            cands.extend(
                ties.iter()
                    .filter(|t| t.class == GeneClass::V || t.class == GeneClass::C)
                    .cloned(),
            );
            if cands.len() == 1 {
                aligns[i] = cands.pop().unwrap();
            } else {
                let maxn = cands.iter().map(|c| count(&c.seg)).max().unwrap();
                let mut keep: Vec<DeltaAlign> = cands
                    .into_iter()
                    .filter(|c| count(&c.seg) == maxn)
                    .collect();
                if !keep.is_empty() && keep.len() < group_size {
                    let mut rep = keep.remove(0);
                    rep.ties = keep;
                    aligns[i] = rep;
                }
            }
        }

        // Second chance for constant-region groups the counts could not
        // separate: in TRB and TRG a J2-family segment pairs with the C2
        // allele, so strand-aware adjacency to a J2 picks it.
        if !aligns[i].ties.is_empty() && aligns[i].class == GeneClass::C {
            match aligns[i].seg.chars().nth(2) {
                Some('B') | Some('G') => {
                    let j2_adjacent = (aligns[i].fw
                        && i > 0
                        && is_j2(&aligns[i - 1]))
                        || (!aligns[i].fw && i + 1 < aligns.len() && is_j2(&aligns[i + 1]));
                    if j2_adjacent {
                        let mut rep = aligns[i].clone();
                        let ties = std::mem::take(&mut rep.ties);
                        let mut c2: Vec<DeltaAlign> = std::iter::once(rep)
                            .chain(ties)
                            .filter(|c| family_digit(&c.seg) == Some('2'))
                            .collect();
                        if c2.len() == 1 {
                            aligns[i] = c2.pop().unwrap();
                        }
                    }
                }
                Some('L') => {
                    // ◼ IGL constant-region ambiguity has no pairing rule;
                    // the alleles stay tied.
                }
                _ => {}
            }
        }
    }

    // A short, noisy alignment sitting where the junction itself should be,
    // flanked by the V main exon on one side and a J on the other, is a
    // fragment of the junction rather than a segment call.
    let mut junk = None;
    for i in 1..aligns.len().saturating_sub(1) {
        let a = &aligns[i];
        if a.rank == Some(ChainRank::D0) {
            continue;
        }
        if a.q_len >= 60 {
            continue;
        }
        if a.q_len >= MIN_INTERGENIC_LEN && a.identity > 0.9 {
            continue;
        }
        let (prev, next) = (&aligns[i - 1], &aligns[i + 1]);
        let flanked = (prev.rank == Some(ChainRank::V2) && next.rank == Some(ChainRank::J0))
            || (prev.rank == Some(ChainRank::J0) && next.rank == Some(ChainRank::V2));
        if flanked && a.seg_exon != prev.seg_exon && a.seg_exon != next.seg_exon {
            junk = Some(i);
        }
    }
    if let Some(i) = junk {
        aligns.remove(i);
    }
}

fn is_j2(a: &DeltaAlign) -> bool {
    a.class == GeneClass::J && family_digit(&a.seg) == Some('2')
}
