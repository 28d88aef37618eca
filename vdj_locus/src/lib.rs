// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Reference-side data for delta-alignment VDJ annotation: the gene-segment
// exon table, the CDR3 anchor table, and FASTA/FASTQ readers.

pub mod anchors;
pub mod exons;
pub mod fastx;
