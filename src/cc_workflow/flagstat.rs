use std::io::Write;

use anyhow::{bail, Context, Result};
use rust_htslib::bam;
use rust_htslib::bam::Read;

const PAIRED: u16 = 0x1;
const PROPER_PAIR: u16 = 0x2;
const UNMAPPED: u16 = 0x4;
const MATE_UNMAPPED: u16 = 0x8;
const READ1: u16 = 0x40;
const READ2: u16 = 0x80;
const SECONDARY: u16 = 0x100;
const QC_FAIL: u16 = 0x200;
const DUPLICATE: u16 = 0x400;
const SUPPLEMENTARY: u16 = 0x800;

/// Counts for one column of the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagCounts {
    pub total: u64,
    pub primary: u64,
    pub secondary: u64,
    pub supplementary: u64,
    pub duplicates: u64,
    pub primary_duplicates: u64,
    pub mapped: u64,
    pub primary_mapped: u64,
    pub paired: u64,
    pub read1: u64,
    pub read2: u64,
    pub properly_paired: u64,
    pub pair_mapped: u64,
    pub singletons: u64,
    pub mate_other_chr: u64,
    pub mate_other_chr_mapq5: u64,
}

impl FlagCounts {
    fn add(&mut self, flags: u16, tid: i32, mtid: i32, mapq: u8) {
        let is = |bit: u16| flags & bit != 0;

        self.total += 1;
        if is(SECONDARY) {
            self.secondary += 1;
        } else if is(SUPPLEMENTARY) {
            self.supplementary += 1;
        } else {
            self.primary += 1;
            if is(PAIRED) {
                self.paired += 1;
                if is(PROPER_PAIR) && !is(UNMAPPED) {
                    self.properly_paired += 1;
                }
                if is(READ1) {
                    self.read1 += 1;
                }
                if is(READ2) {
                    self.read2 += 1;
                }
                if is(MATE_UNMAPPED) && !is(UNMAPPED) {
                    self.singletons += 1;
                }
                if !is(UNMAPPED) && !is(MATE_UNMAPPED) {
                    self.pair_mapped += 1;
                    if mtid != tid {
                        self.mate_other_chr += 1;
                        if mapq >= 5 {
                            self.mate_other_chr_mapq5 += 1;
                        }
                    }
                }
            }
            if !is(UNMAPPED) {
                self.primary_mapped += 1;
            }
            if is(DUPLICATE) {
                self.primary_duplicates += 1;
            }
        }
        if !is(UNMAPPED) {
            self.mapped += 1;
        }
        if is(DUPLICATE) {
            self.duplicates += 1;
        }
    }
}

/// QC-passed and QC-failed counts, reported side by side as `samtools
/// flagstat` does.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagStats {
    pub passed: FlagCounts,
    pub failed: FlagCounts,
}

impl FlagStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, flags: u16, tid: i32, mtid: i32, mapq: u8) {
        if flags & QC_FAIL != 0 {
            self.failed.add(flags, tid, mtid, mapq);
        } else {
            self.passed.add(flags, tid, mtid, mapq);
        }
    }

    pub fn add_record(&mut self, r: &bam::Record) {
        self.add(r.flags(), r.tid(), r.mtid(), r.mapq());
    }

    pub fn count<R: Read>(bam_in: &mut R) -> Result<Self> {
        let mut stats = Self::new();
        let mut rec = bam::Record::new();
        loop {
            match bam_in.read(&mut rec) {
                Some(Ok(())) => (),
                Some(Err(e)) => bail!(e),
                None => return Ok(stats),
            }
            stats.add_record(&rec);
        }
    }

    pub fn write<W: Write>(&self, out: &mut W) -> Result<()> {
        let (p, f) = (&self.passed, &self.failed);

        line(out, p.total, f.total, "in total (QC-passed reads + QC-failed reads)")?;
        line(out, p.primary, f.primary, "primary")?;
        line(out, p.secondary, f.secondary, "secondary")?;
        line(out, p.supplementary, f.supplementary, "supplementary")?;
        line(out, p.duplicates, f.duplicates, "duplicates")?;
        line(out, p.primary_duplicates, f.primary_duplicates, "primary duplicates")?;
        pct_line(out, p.mapped, f.mapped, "mapped", p.total, f.total)?;
        pct_line(out, p.primary_mapped, f.primary_mapped, "primary mapped", p.primary, f.primary)?;
        line(out, p.paired, f.paired, "paired in sequencing")?;
        line(out, p.read1, f.read1, "read1")?;
        line(out, p.read2, f.read2, "read2")?;
        pct_line(out, p.properly_paired, f.properly_paired, "properly paired", p.paired, f.paired)?;
        line(out, p.pair_mapped, f.pair_mapped, "with itself and mate mapped")?;
        pct_line(out, p.singletons, f.singletons, "singletons", p.paired, f.paired)?;
        line(out, p.mate_other_chr, f.mate_other_chr, "with mate mapped to a different chr")?;
        line(
            out,
            p.mate_other_chr_mapq5,
            f.mate_other_chr_mapq5,
            "with mate mapped to a different chr (mapQ>=5)",
        )?;
        Ok(())
    }
}

fn line<W: Write>(out: &mut W, a: u64, b: u64, what: &str) -> Result<()> {
    write!(out, "{} + {} {}\n", a, b, what)?;
    Ok(())
}

fn pct_line<W: Write>(out: &mut W, a: u64, b: u64, what: &str, of_a: u64, of_b: u64) -> Result<()> {
    write!(out, "{} + {} {} ({} : {})\n", a, b, what, percent(a, of_a), percent(b, of_b))?;
    Ok(())
}

fn percent(n: u64, total: u64) -> String {
    if total == 0 {
        "N/A".to_string()
    } else {
        format!("{:.2}%", 100.0 * n as f64 / total as f64)
    }
}

#[derive(Debug)]
pub struct CLI {
    pub input_bam: String,
    pub output: Option<String>,
}

impl CLI {
    pub fn run(&self) -> Result<()> {
        let mut bam_in = if self.input_bam == "-" {
            bam::Reader::from_stdin()?
        } else {
            bam::Reader::from_path(&self.input_bam)
                .with_context(|| format!("opening {:?}", self.input_bam))?
        };

        let stats = FlagStats::count(&mut bam_in)?;

        match &self.output {
            Some(filename) => {
                let mut out = std::io::BufWriter::new(
                    std::fs::File::create(filename).with_context(|| format!("creating {:?}", filename))?,
                );
                stats.write(&mut out)?;
                out.flush()?;
            }
            None => stats.write(&mut std::io::stdout())?,
        }
        Ok(())
    }
}
