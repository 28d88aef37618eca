// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// The gapped-alignment value model shared by the whole pipeline, and the
// reader for delta-format alignment files.

pub mod align;
pub mod reader;

// Alignment scoring constants.
pub const MATCH_SCORE: i32 = 3;
pub const MISMATCH_SCORE: i32 = -7;
pub const GAP_SCORE: i32 = -7;
pub const EXACT_BONUS: i32 = 2;
pub const SPLICE_BONUS: i32 = 1;
