use anyhow::Result;
use rust_htslib::bam;
use rust_htslib::bam::record::{Aux, Cigar};

use crate::mismatch::{aligned_bounds, mismatch_positions};

/// Mismatched bases below this quality do not vote.
pub const PHRED_CUTOFF: u8 = 30;
/// Molecular quality given when every counted read agrees.
pub const MAX_MOLECULAR_PHRED: u8 = 62;

const BASES: &[u8; 5] = b"ACGTN";
const N_INDEX: usize = 4;

/// What consensus calling needs from one family member, detached from
/// the BAM record so families can be resolved on other threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FamilyRead {
    seq: Vec<u8>,
    qual: Vec<u8>,
    cigar: Vec<Cigar>,
    mismatches: Vec<usize>,
}

impl FamilyRead {
    pub fn new(seq: Vec<u8>, qual: Vec<u8>, cigar: Vec<Cigar>, md: &[u8]) -> Result<Self> {
        let mismatches = mismatch_positions(&cigar, md)?;
        Ok(FamilyRead {
            seq: seq,
            qual: qual,
            cigar: cigar,
            mismatches: mismatches,
        })
    }

    /// `None` when the record carries no MD tag.
    pub fn from_record(r: &bam::Record) -> Result<Option<Self>> {
        let md = match r.aux(b"MD") {
            Ok(Aux::String(md)) => md.as_bytes().to_vec(),
            _ => return Ok(None),
        };
        let cigar: Vec<Cigar> = r.cigar().iter().cloned().collect();
        Self::new(r.seq().as_bytes(), r.qual().to_vec(), cigar, &md).map(Some)
    }

    pub fn len(&self) -> usize {
        self.seq.len()
    }

    /// Base at read position `i` if this read may vote there: inside the
    /// aligned part, and not a low-quality mismatch. Outside the aligned
    /// part the read votes N.
    fn vote(&self, i: usize) -> Option<usize> {
        let (start, end) = aligned_bounds(&self.cigar, self.seq.len());
        if i < start || i >= end {
            return Some(N_INDEX);
        }
        if self.mismatches.binary_search(&(i - start)).is_ok() && self.qual[i] < PHRED_CUTOFF {
            return None;
        }
        Some(base_index(self.seq[i]))
    }
}

fn base_index(base: u8) -> usize {
    BASES
        .iter()
        .position(|&b| b == base.to_ascii_uppercase())
        .unwrap_or(N_INDEX)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Consensus {
    pub seq: Vec<u8>,
    pub qual: Vec<u8>,
}

impl Consensus {
    /// Fraction of N among the bases in `start..end`.
    pub fn n_fraction(&self, start: usize, end: usize) -> f64 {
        let span = &self.seq[start.min(self.seq.len())..end.min(self.seq.len())];
        if span.is_empty() {
            return 1.0;
        }
        span.iter().filter(|&&b| b == b'N').count() as f64 / span.len() as f64
    }
}

/// Majority-vote consensus of one family over `read_len` positions.
/// A base is called when its share of the voting reads reaches
/// `cutoff`; ties go to the earlier of A, C, G, T, N. Uncalled
/// positions are N with quality 0.
pub fn consensus(reads: &[FamilyRead], read_len: usize, cutoff: f64) -> Consensus {
    let mut seq = Vec::with_capacity(read_len);
    let mut qual = Vec::with_capacity(read_len);

    for i in 0..read_len {
        let mut counts = [0usize; 5];
        for read in reads.iter() {
            if let Some(idx) = read.vote(i) {
                counts[idx] += 1;
            }
        }

        let total: usize = counts.iter().sum();
        let (best, &best_count) = counts
            .iter()
            .enumerate()
            .rev()
            .max_by_key(|&(_, count)| count)
            .unwrap_or((N_INDEX, &0));

        if total == 0 || best == N_INDEX || (best_count as f64 / total as f64) < cutoff {
            seq.push(b'N');
            qual.push(0);
        } else {
            seq.push(BASES[best]);
            qual.push(molecular_phred(total - best_count, total));
        }
    }

    Consensus { seq: seq, qual: qual }
}

/// `round(-10 log10(errors / total))`, capped at `MAX_MOLECULAR_PHRED`.
pub fn molecular_phred(errors: usize, total: usize) -> u8 {
    if errors == 0 || total == 0 {
        return MAX_MOLECULAR_PHRED;
    }
    let p = errors as f64 / total as f64;
    let q = (-10.0 * p.log10()).round();
    if q >= MAX_MOLECULAR_PHRED as f64 {
        MAX_MOLECULAR_PHRED
    } else {
        q as u8
    }
}
