// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// The per-read pipeline, start to finish.  One record is mutated in place
// through every stage and nothing carries over to the next read.

use std::io::Write;

use io_utils::fwriteln;
use vdj_delta::reader::DeltaRecord;
use vdj_locus::exons::ExonTable;

use crate::classify::{QueryCall, Recomb};
use crate::{adjust, annotate, classify, select};

#[derive(Clone, Copy, Debug)]
pub struct PipelineOpts {
    /// Trim adjacent overlapping alignments at the best splice-scored cut.
    pub adjust: bool,
    /// Minimum aligned fraction of a read for a graded call.
    pub frac: f64,
}

impl Default for PipelineOpts {
    fn default() -> Self {
        PipelineOpts {
            adjust: true,
            frac: 0.5,
        }
    }
}

pub struct ProcessedQuery {
    pub recomb: Recomb,
    pub call: QueryCall,
}

/// Run one read's candidate alignments through selection, annotation,
/// grouping, disambiguation, optional boundary adjustment, classification
/// and order resolution.  Boundary adjustment is skipped for rearranged
/// reads, whose overlaps are not splice artifacts.
pub fn process_query(
    rec: &mut DeltaRecord,
    table: &ExonTable,
    refstr: &str,
    qryseq: &str,
    opts: &PipelineOpts,
    log: &mut Vec<u8>,
) -> ProcessedQuery {
    let candidates = rec.aligns.len();
    select::optimal_set(&mut rec.aligns);
    annotate::annotate_segments(&mut rec.aligns, table);
    annotate::group_overlaps(&mut rec.aligns);
    annotate::resolve_ambiguity(&mut rec.aligns);
    let recomb = classify::recomb_code(&rec.aligns);
    if opts.adjust && recomb != Recomb::Rearranged {
        adjust::adjust_overlaps(&mut rec.aligns, refstr, qryseq);
    }
    let call = classify::resolve_order(rec, opts.frac);
    fwriteln!(
        log,
        "{}: {} candidates, {} kept, {}, {}, tier {}",
        rec.id_q,
        candidates,
        rec.aligns.len(),
        recomb,
        if call.fw { '+' } else { '-' },
        call.regularity
    );
    ProcessedQuery { recomb, call }
}
