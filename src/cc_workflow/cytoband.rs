use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use log::warn;
use serde::Deserialize;

pub const MITOCHONDRIAL: &str = "chrM";

/// A stretch of one reference sequence, processed as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub name: String,
    pub contig: String,
    pub start: i64,
    pub end: i64,
}

impl Region {
    pub fn contains_start(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.end
    }
}

#[derive(Debug, Deserialize)]
struct CytobandRow {
    chrom: String,
    start: i64,
    end: i64,
    arm: String,
}

/// Reads a tab-separated cytoband table. The first line is a header;
/// columns past the fourth are ignored.
pub fn parse_cytoband<R: Read>(input: R) -> Result<Vec<Region>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .flexible(true)
        .from_reader(input);

    let mut regions = Vec::new();
    for row_res in reader.records() {
        let record = row_res?;
        let row: CytobandRow = record.deserialize(None).with_context(|| format!("cytoband line {:?}", record))?;
        regions.push(Region {
            name: format!("{}_{}", row.chrom, row.arm),
            contig: row.chrom,
            start: row.start,
            end: row.end,
        });
    }
    Ok(regions)
}

pub fn read_cytoband<P: AsRef<Path>>(path: P) -> Result<Vec<Region>> {
    let file = std::fs::File::open(path.as_ref()).with_context(|| format!("opening cytoband {:?}", path.as_ref()))?;
    parse_cytoband(file).with_context(|| format!("reading cytoband {:?}", path.as_ref()))
}

/// Regions to visit for a BAM with reference sequences `contigs`
/// (name, length): the whole of `chrM` first when present, then every
/// cytoband region on a contig the BAM knows.
pub fn regions(contigs: &[(String, u64)], cytoband: Vec<Region>) -> Vec<Region> {
    let mut out = Vec::new();

    if let Some((name, len)) = contigs.iter().find(|(name, _)| name == MITOCHONDRIAL) {
        out.push(Region {
            name: name.clone(),
            contig: name.clone(),
            start: 0,
            end: *len as i64,
        });
    }

    for region in cytoband.into_iter() {
        if region.contig == MITOCHONDRIAL {
            continue;
        }
        if contigs.iter().any(|(name, _)| *name == region.contig) {
            out.push(region);
        } else {
            warn!("skipping region {}: {} is not in the BAM header", region.name, region.contig);
        }
    }

    out
}
