use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

/// Read counts and family outcomes from one consensus run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SscsStats {
    pub total_reads: u64,
    pub unmapped: u64,
    pub bad_flags: u64,
    pub secondary_supplementary: u64,
    pub missing_md: u64,
    pub sscs_reads: u64,
    pub singletons: u64,
    pub doubletons: u64,
    pub too_many_n: u64,
    pub pairing_anomalies: u64,
    pub family_sizes: Vec<(String, usize)>,
    pub phred: PhredHistogram,
    pub family_quality: FamilyQuality,
}

#[derive(Debug, Serialize)]
struct FamilyRow<'a> {
    tag: &'a str,
    family_size: usize,
}

#[derive(Debug, Serialize)]
struct FamilySizeRow {
    family_size: usize,
    families: usize,
    reads: usize,
    read_fraction: f64,
}

impl SscsStats {
    pub fn write_summary<W: Write>(&self, out: &mut W) -> Result<()> {
        write!(out, "Total reads: {}\n", self.total_reads)?;
        write!(out, "Unmapped reads: {}\n", self.unmapped)?;
        write!(out, "Unmapped flag reads: {}\n", self.bad_flags)?;
        write!(out, "Secondary/Supplementary reads: {}\n", self.secondary_supplementary)?;
        write!(out, "Reads without MD tag: {}\n", self.missing_md)?;
        write!(out, "SSCS reads: {}\n", self.sscs_reads)?;
        write!(out, "singletons: {}\n", self.singletons)?;
        write!(out, "doubletons: {}\n", self.doubletons)?;
        write!(out, "Consensus reads over N cutoff: {}\n", self.too_many_n)?;
        write!(out, "Unpaired families: {}\n", self.pairing_anomalies)?;
        Ok(())
    }

    /// One row per family tag with its read count.
    pub fn write_read_families<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = tsv_writer(path.as_ref())?;
        for (tag, size) in self.family_sizes.iter() {
            writer.serialize(FamilyRow {
                tag: tag,
                family_size: *size,
            })?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Number of families of each size, and the fraction of all
    /// grouped reads that sit in families of that size.
    pub fn family_size_distribution(&self) -> Vec<(usize, usize, f64)> {
        let mut families: BTreeMap<usize, usize> = BTreeMap::new();
        for (_, size) in self.family_sizes.iter() {
            *families.entry(*size).or_insert(0) += 1;
        }
        let total: usize = self.family_sizes.iter().map(|(_, size)| size).sum();

        families
            .into_iter()
            .map(|(size, n)| (size, n, (size * n) as f64 / total as f64))
            .collect()
    }

    pub fn write_family_size_distribution<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = tsv_writer(path.as_ref())?;
        for (size, n, fraction) in self.family_size_distribution() {
            writer.serialize(FamilySizeRow {
                family_size: size,
                families: n,
                reads: size * n,
                read_fraction: fraction,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Molecular quality scores of every consensus base.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PhredHistogram {
    counts: BTreeMap<u8, u64>,
}

#[derive(Debug, Serialize)]
struct PhredRow {
    phred: u8,
    bases: u64,
}

impl PhredHistogram {
    pub fn add(&mut self, quals: &[u8]) {
        for q in quals.iter() {
            *self.counts.entry(*q).or_insert(0) += 1;
        }
    }

    pub fn count(&self, q: u8) -> u64 {
        self.counts.get(&q).cloned().unwrap_or(0)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = tsv_writer(path.as_ref())?;
        for (&phred, &bases) in self.counts.iter() {
            writer.serialize(PhredRow {
                phred: phred,
                bases: bases,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

/// Rounded mean molecular quality of each consensus read, grouped by
/// the size of the family it came from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FamilyQuality {
    // family size -> (consensus reads, sum of their rounded means)
    by_size: BTreeMap<usize, (u64, u64)>,
}

#[derive(Debug, Serialize)]
struct FamilyQualityRow {
    family_size: usize,
    consensus_reads: u64,
    mean_phred: f64,
}

impl FamilyQuality {
    pub fn add(&mut self, family_size: usize, quals: &[u8]) {
        if quals.is_empty() {
            return;
        }
        let sum: u64 = quals.iter().map(|&q| q as u64).sum();
        let mean = (sum as f64 / quals.len() as f64).round() as u64;
        let entry = self.by_size.entry(family_size).or_insert((0, 0));
        entry.0 += 1;
        entry.1 += mean;
    }

    pub fn mean(&self, family_size: usize) -> Option<f64> {
        self.by_size
            .get(&family_size)
            .map(|&(reads, sum)| sum as f64 / reads as f64)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut writer = tsv_writer(path.as_ref())?;
        for (&family_size, &(reads, sum)) in self.by_size.iter() {
            writer.serialize(FamilyQualityRow {
                family_size: family_size,
                consensus_reads: reads,
                mean_phred: sum as f64 / reads as f64,
            })?;
        }
        writer.flush()?;
        Ok(())
    }
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .with_context(|| format!("creating {:?}", path))
}
