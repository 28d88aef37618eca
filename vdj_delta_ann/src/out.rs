// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Formatting of the two output streams: the per-read annotation row and the
// per-read CDR3 row, plus the JSON rendition of the annotation.

use itertools::Itertools;
use serde::Serialize;
use vdj_delta::align::DeltaAlign;
use vdj_delta::reader::DeltaRecord;

use crate::cdr3::Cdr3Call;
use crate::classify::{QueryCall, Recomb};

/// The tab-separated annotation row: query id, length, regularity tier,
/// reference contig, orientation, combined V:D:J string, space-joined
/// concise alignments with ties |-joined, V/D/J indices, aligned length.
pub fn annotation_row(rec: &DeltaRecord, call: &QueryCall, locus: &str) -> String {
    let concise = |a: &DeltaAlign| -> String {
        std::iter::once(a.concise_form(locus))
            .chain(a.ties.iter().map(|t| t.concise_form(locus)))
            .join("|")
    };
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{},{},{}\t{}",
        rec.id_q,
        rec.len_q,
        call.regularity,
        rec.id_r,
        if call.fw { '+' } else { '-' },
        call.combined,
        rec.aligns.iter().map(concise).join(" "),
        call.vi,
        call.di,
        call.ji,
        call.aligned_len,
    )
}

/// Row for a read with no usable alignment.
pub fn annotation_sentinel(uid: &str, len: impl std::fmt::Display) -> String {
    format!("{uid}\t{len}\t---")
}

#[derive(Serialize)]
struct AnnotationJson<'a> {
    query: &'a str,
    length: i32,
    regularity: i32,
    contig: &'a str,
    orientation: char,
    recomb: Recomb,
    vdj: &'a str,
    alignments: Vec<String>,
    vdj_index: [i32; 3],
    aligned_len: i32,
}

/// The annotation row as one JSON object, carrying the same fields.
pub fn annotation_json(rec: &DeltaRecord, call: &QueryCall, recomb: Recomb, locus: &str) -> String {
    let mut alignments = Vec::new();
    for a in &rec.aligns {
        alignments.push(a.concise_form(locus));
        for t in &a.ties {
            alignments.push(t.concise_form(locus));
        }
    }
    serde_json::to_string(&AnnotationJson {
        query: &rec.id_q,
        length: rec.len_q,
        regularity: call.regularity,
        contig: &rec.id_r,
        orientation: if call.fw { '+' } else { '-' },
        recomb,
        vdj: &call.combined,
        alignments,
        vdj_index: [call.vi, call.di, call.ji],
        aligned_len: call.aligned_len,
    })
    .unwrap()
}

/// The tab-separated CDR3 row: query id, regularity tier, then the
/// V:junction:J triples, qualities and translations, each |-joined across
/// the candidate pairs.
pub fn cdr3_row(uid: &str, regularity: i32, calls: &[Cdr3Call]) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        uid,
        regularity,
        calls.iter().map(|c| &c.triple).join("|"),
        calls.iter().map(|c| &c.qual).join("|"),
        calls.iter().map(|c| &c.aa).join("|"),
    )
}

/// Row for a read whose call is not regular enough to carry a junction.
pub fn cdr3_sentinel(uid: &str) -> String {
    format!("{uid}\t0\t---")
}

/// Row for a read drained from the sequence stream with no alignment at all.
pub fn cdr3_drained(uid: &str) -> String {
    format!("{uid}\t---\t---")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_annotation_row() {
        let mut a = DeltaAlign::from_delta_block(100, 199, 1, 100, 3, 0, 0, &[0]);
        a.seg_exon = "TRBV1_2".to_string();
        let mut b = DeltaAlign::from_delta_block(500, 550, 110, 160, 0, 0, 0, &[0]);
        b.seg_exon = "TRBJ2-1_0".to_string();
        let rec = DeltaRecord {
            id_r: "locus".to_string(),
            id_q: "read1".to_string(),
            len_r: 5000,
            len_q: 170,
            aligns: vec![a, b],
        };
        let call = QueryCall {
            vi: 0,
            ji: 1,
            combined: "TRBV1:---:TRBJ2-1".to_string(),
            aligned_len: 151,
            regularity: 2,
            ..Default::default()
        };
        assert_eq!(
            annotation_row(&rec, &call, "hsa_trb"),
            "read1\t170\t2\tlocus\t+\tTRBV1:---:TRBJ2-1\t\
             hsa_trb:TRBV1_2:100-199:1-100:3:0 hsa_trb:TRBJ2-1_0:500-550:110-160:0:0\t\
             0,-1,1\t151"
        );
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(annotation_sentinel("r", 42), "r\t42\t---");
        assert_eq!(cdr3_sentinel("r"), "r\t0\t---");
        assert_eq!(cdr3_drained("r"), "r\t---\t---");
    }

    #[test]
    fn test_cdr3_row_joins_pairs() {
        let calls = vec![
            Cdr3Call {
                triple: "TRBV1:ACG:TRBJ2-1".to_string(),
                qual: "III".to_string(),
                aa: "T".to_string(),
            },
            Cdr3Call {
                triple: "TRBV2:---:TRBJ2-1".to_string(),
                qual: "---".to_string(),
                aa: "---".to_string(),
            },
        ];
        assert_eq!(
            cdr3_row("read1", 1, &calls),
            "read1\t1\tTRBV1:ACG:TRBJ2-1|TRBV2:---:TRBJ2-1\tIII|---\tT|---"
        );
    }
}
