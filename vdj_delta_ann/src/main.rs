// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Annotate delta alignments of immune-receptor reads against a locus
// reference, classify each read's recombination pattern, and extract CDR3
// junctions.  Writes <output>.vdjdelta and <output>.cdr3; reads with no
// usable alignment degrade to sentinel rows in both.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use io_utils::fwriteln;
use stats_utils::percent_ratio;
use string_utils::strme;
use vdj_delta::reader::DeltaReader;
use vdj_locus::anchors::Cdr3Anchors;
use vdj_locus::exons::ExonTable;
use vdj_locus::fastx::{read_fasta, FastqReader};

use vdj_delta_ann::cdr3::extract_cdr3;
use vdj_delta_ann::out;
use vdj_delta_ann::pipeline::{process_query, PipelineOpts};

#[derive(Debug, Parser)]
#[clap(
    name = "vdj_delta_ann",
    about = "Annotate delta alignments of immune-receptor reads and extract CDR3 junctions"
)]
struct Opts {
    /// Delta-format alignment file from the upstream aligner.
    delta: String,

    /// Species prefix of the reference tables.
    #[clap(long, default_value = "hsa")]
    species: String,

    /// Immune receptor gene: tra, trb, trd, trg, igh, igk or igl.
    #[clap(long, default_value = "trb")]
    gene: String,

    /// Directory holding the <species>_<gene>.vdj and .cdr tables.
    #[clap(long, default_value = ".")]
    refdir: String,

    /// Query FASTQ; defaults to the delta header's query path with a .fq
    /// extension.
    #[clap(long)]
    fastq: Option<String>,

    /// Leave overlapping alignment boundaries alone.
    #[clap(long)]
    no_adjust: bool,

    /// Minimum aligned fraction of a read for a graded call.
    #[clap(long, default_value_t = 0.5)]
    frac: f64,

    /// Output prefix; writes <prefix>.vdjdelta and <prefix>.cdr3.
    #[clap(long, default_value = "read")]
    output: String,

    /// Write the annotation stream as JSON lines instead of the tab form.
    #[clap(long)]
    json: bool,

    /// Dump the per-read pipeline log to stderr.
    #[clap(long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let opts = Opts::parse();
    let locus = format!("{}_{}", opts.species, opts.gene);

    let refdir = Path::new(&opts.refdir);
    let table = ExonTable::load(refdir.join(format!("{locus}.vdj")))?;
    let anchors = Cdr3Anchors::load(refdir.join(format!("{locus}.cdr")))?;

    let mut delta = DeltaReader::open(&opts.delta)?;
    let refseq = read_fasta(&delta.ref_path)?;
    let fastq_path = opts
        .fastq
        .clone()
        .unwrap_or_else(|| derive_fastq_path(&delta.query_path));
    let mut fastq = FastqReader::open(&fastq_path)?;

    let vdjdelta_path = format!("{}.vdjdelta", opts.output);
    let cdr3_path = format!("{}.cdr3", opts.output);
    let mut out_v = BufWriter::new(
        File::create(&vdjdelta_path)
            .with_context(|| format!("could not create {vdjdelta_path}"))?,
    );
    let mut out_c = BufWriter::new(
        File::create(&cdr3_path).with_context(|| format!("could not create {cdr3_path}"))?,
    );

    let popts = PipelineOpts {
        adjust: !opts.no_adjust,
        frac: opts.frac,
    };
    let (mut total, mut annotated, mut junctions) = (0usize, 0usize, 0usize);

    while let Some(mut rec) = delta.read_next()? {
        // March the sequence stream forward to this query, draining reads
        // that never aligned.
        let mut read = None;
        while let Some(r) = fastq.read_next()? {
            if r.uid == rec.id_q {
                read = Some(r);
                break;
            }
            total += 1;
            fwriteln!(out_v, "{}", out::annotation_sentinel(&r.uid, r.seq.len()));
            fwriteln!(out_c, "{}", out::cdr3_drained(&r.uid));
        }
        let Some(read) = read else {
            bail!(
                "aligned read {} is missing from {} (streams out of sync)",
                rec.id_q,
                fastq_path
            );
        };
        total += 1;

        let refstr = refseq.get(&rec.id_r).with_context(|| {
            format!("reference contig {} is not in {}", rec.id_r, delta.ref_path)
        })?;

        let mut log = Vec::<u8>::new();
        let processed = process_query(&mut rec, &table, refstr, &read.seq, &popts, &mut log);
        if opts.verbose {
            eprint!("{}", strme(&log));
        }

        if processed.call.aligned_len >= 30 {
            annotated += 1;
            if opts.json {
                fwriteln!(
                    out_v,
                    "{}",
                    out::annotation_json(&rec, &processed.call, processed.recomb, &locus)
                );
            } else {
                fwriteln!(out_v, "{}", out::annotation_row(&rec, &processed.call, &locus));
            }
        } else {
            fwriteln!(out_v, "{}", out::annotation_sentinel(&rec.id_q, rec.len_q));
        }

        if processed.call.regularity == 1 || processed.call.regularity == 2 {
            let calls = extract_cdr3(
                &rec.aligns[processed.call.vi as usize],
                &rec.aligns[processed.call.ji as usize],
                &anchors,
                &read.seq,
                &read.qual,
            );
            junctions += 1;
            fwriteln!(
                out_c,
                "{}",
                out::cdr3_row(&rec.id_q, processed.call.regularity, &calls)
            );
        } else {
            fwriteln!(out_c, "{}", out::cdr3_sentinel(&rec.id_q));
        }
    }

    // Whatever is left in the sequence stream never aligned.
    while let Some(r) = fastq.read_next()? {
        total += 1;
        fwriteln!(out_v, "{}", out::annotation_sentinel(&r.uid, r.seq.len()));
        fwriteln!(out_c, "{}", out::cdr3_drained(&r.uid));
    }

    out_v.flush()?;
    out_c.flush()?;
    eprintln!(
        "{total} reads, {annotated} annotated ({:.1}%), {junctions} CDR3 rows",
        percent_ratio(annotated, total.max(1)),
    );
    Ok(())
}

// The query FASTA named in the delta header sits next to its FASTQ.
fn derive_fastq_path(query_path: &str) -> String {
    if let Some(stem) = query_path.strip_suffix(".fasta") {
        format!("{stem}.fastq")
    } else if let Some(stem) = query_path.strip_suffix(".fa") {
        format!("{stem}.fq")
    } else {
        format!("{query_path}.fq")
    }
}
