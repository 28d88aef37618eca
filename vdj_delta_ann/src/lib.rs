// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// Per-read processing of delta alignments over an immune locus: selection of
// a non-redundant candidate set, segment annotation, overlap grouping and
// disambiguation, boundary adjustment at plausible splice positions,
// recombination classification, canonical V(D)J ordering, and CDR3
// extraction.

pub mod adjust;
pub mod annotate;
pub mod cdr3;
pub mod classify;
pub mod out;
pub mod pipeline;
pub mod select;
