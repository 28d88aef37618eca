// Copyright (c) 2021 10x Genomics, Inc. All rights reserved.

// The CDR3 anchor table: one reference coordinate per functional segment,
// marking the codon that opens (V side) or closes (J side) the CDR3 region.
// Pseudogenes and ORFs without a defined anchor are simply absent.

use anyhow::{ensure, Context, Result};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, Default)]
pub struct Cdr3Anchors {
    anchors: HashMap<String, i32>,
}

impl Cdr3Anchors {
    pub fn load(path: impl AsRef<Path>) -> Result<Cdr3Anchors> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("could not read cdr table {}", path.display()))?;
        Cdr3Anchors::from_text(&text)
            .with_context(|| format!("could not parse cdr table {}", path.display()))
    }

    /// Parse the tab-delimited anchor table.  Each row is
    /// species_gene, segment, n, cdr1, cdr2, cdr3, with --- in the cdr3
    /// column for segments that have no anchor.
    pub fn from_text(text: &str) -> Result<Cdr3Anchors> {
        let mut anchors = HashMap::new();
        for (n, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            ensure!(fields.len() >= 6, "line {}: expected six fields", n + 1);
            if fields[5] == "---" {
                continue;
            }
            let pos: i32 = fields[5]
                .parse()
                .with_context(|| format!("line {}: bad cdr3 position {}", n + 1, fields[5]))?;
            anchors.insert(fields[1].to_string(), pos);
        }
        Ok(Cdr3Anchors { anchors })
    }

    pub fn get(&self, seg: &str) -> Option<i32> {
        self.anchors.get(seg).copied()
    }

    pub fn len(&self) -> usize {
        self.anchors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.anchors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anchor_parse_skips_pseudogenes() {
        let text = "hsa_trb\tTRBV1\t0\t77\t132\t271\textra\n\
                    hsa_trb\tTRBV2\t1\t---\t---\t---\n\
                    hsa_trb\tTRBJ2-1\t0\t---\t---\t1517\n";
        let a = Cdr3Anchors::from_text(text).unwrap();
        assert_eq!(a.get("TRBV1"), Some(271));
        assert_eq!(a.get("TRBV2"), None);
        assert_eq!(a.get("TRBJ2-1"), Some(1517));
        assert_eq!(a.len(), 2);
    }
}
