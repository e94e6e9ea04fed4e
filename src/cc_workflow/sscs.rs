use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use bio::alphabets::dna;
use bio::io::fastq;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{debug, info, warn};
use rayon::prelude::*;
use rust_htslib::bam;
use rust_htslib::bam::record::Cigar;
use rust_htslib::bam::Read;

use crate::cytoband::{read_cytoband, regions, Region};
use crate::family::{FamilyTag, BAD_FLAGS};
use crate::family_stats::SscsStats;
use crate::mismatch::aligned_bounds;
use crate::molecular_consensus::{consensus, Consensus, FamilyRead};

pub const DEFAULT_CUTOFF: f64 = 0.7;
pub const DEFAULT_N_CUTOFF: f64 = 0.3;

/// File names derived from the SSCS output BAM. Everything before the
/// first `.sscs` in the name is the base for the companion files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SscsOutputs {
    sscs_bam: PathBuf,
    base: String,
}

impl SscsOutputs {
    pub fn new(outfile: &str) -> Self {
        let base = match outfile.find(".sscs") {
            Some(end) => &outfile[..end],
            None => outfile.trim_end_matches(".bam"),
        };
        SscsOutputs {
            sscs_bam: PathBuf::from(outfile),
            base: base.to_string(),
        }
    }

    fn with_suffix(&self, suffix: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", self.base, suffix))
    }

    pub fn sscs_bam(&self) -> &Path {
        &self.sscs_bam
    }

    pub fn singleton_bam(&self) -> PathBuf {
        self.with_suffix(".singleton.bam")
    }

    pub fn doubleton_bam(&self) -> PathBuf {
        self.with_suffix(".doubleton.bam")
    }

    pub fn sscs_fastq(&self, read1: bool) -> PathBuf {
        self.with_suffix(if read1 { ".sscs_R1.fastq.gz" } else { ".sscs_R2.fastq.gz" })
    }

    pub fn doubleton_fastq(&self, read1: bool) -> PathBuf {
        self.with_suffix(if read1 { ".doubleton_R1.fastq.gz" } else { ".doubleton_R2.fastq.gz" })
    }

    pub fn stats(&self) -> PathBuf {
        self.with_suffix(".stats.txt")
    }

    pub fn read_families(&self) -> PathBuf {
        self.with_suffix(".read_families.txt")
    }

    pub fn tag_fam_size(&self) -> PathBuf {
        self.with_suffix(".tag_fam_size.txt")
    }

    pub fn phred_density(&self) -> PathBuf {
        self.with_suffix(".phred_density.txt")
    }

    pub fn tag_fam_quality(&self) -> PathBuf {
        self.with_suffix(".tag_fam_quality.txt")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SscsParams {
    /// Share of voting reads a base needs to be called.
    pub cutoff: f64,
    /// Consensus reads with a larger share of N are dropped.
    pub n_cutoff: f64,
}

impl Default for SscsParams {
    fn default() -> Self {
        SscsParams {
            cutoff: DEFAULT_CUTOFF,
            n_cutoff: DEFAULT_N_CUTOFF,
        }
    }
}

impl SscsParams {
    pub fn new(cutoff: f64, n_cutoff: f64) -> Result<Self> {
        if !(cutoff > 0.0 && cutoff <= 1.0) {
            bail!("Consensus cutoff {} not in (0, 1]", cutoff);
        }
        if !(n_cutoff >= 0.0 && n_cutoff <= 1.0) {
            bail!("N cutoff {} not in [0, 1]", n_cutoff);
        }
        Ok(SscsParams {
            cutoff: cutoff,
            n_cutoff: n_cutoff,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Unmapped,
    SecondarySupplementary,
    BadFlags,
}

fn skip_reason(r: &bam::Record) -> Option<Skip> {
    if r.is_unmapped() {
        Some(Skip::Unmapped)
    } else if r.is_secondary() || r.is_supplementary() {
        Some(Skip::SecondarySupplementary)
    } else if BAD_FLAGS.contains(&r.flags()) {
        Some(Skip::BadFlags)
    } else {
        None
    }
}

/// Families found in one region, in order of first appearance.
/// Templates stay apart from the member reads since BAM records can't
/// cross threads.
#[derive(Default)]
struct RegionFamilies {
    tags: Vec<FamilyTag>,
    templates: Vec<bam::Record>,
    members: Vec<Vec<FamilyRead>>,
    pairs: Vec<(String, Vec<usize>)>,
}

impl RegionFamilies {
    fn collect<R: Read>(reader: &mut R, region: &Region, stats: &mut SscsStats) -> Result<Self> {
        let mut families = RegionFamilies::default();
        let mut family_index: HashMap<FamilyTag, usize> = HashMap::new();
        let mut pair_index: HashMap<String, usize> = HashMap::new();

        let mut rec = bam::Record::new();
        loop {
            match reader.read(&mut rec) {
                Some(Ok(())) => (),
                Some(Err(e)) => bail!(e),
                None => break,
            }

            // reads overlapping from the previous region were counted there
            if !region.contains_start(rec.pos()) {
                continue;
            }
            stats.total_reads += 1;

            match skip_reason(&rec) {
                Some(Skip::Unmapped) => {
                    stats.unmapped += 1;
                    continue;
                }
                Some(Skip::SecondarySupplementary) => {
                    stats.secondary_supplementary += 1;
                    continue;
                }
                Some(Skip::BadFlags) => {
                    stats.bad_flags += 1;
                    continue;
                }
                None => (),
            }

            let tag = FamilyTag::new(&rec)?;
            let key = match tag.pair_key(rec.flags()) {
                Some(key) => key,
                None => {
                    stats.bad_flags += 1;
                    continue;
                }
            };
            let read = match FamilyRead::from_record(&rec)
                .with_context(|| format!("read {}", String::from_utf8_lossy(rec.qname())))?
            {
                Some(read) => read,
                None => {
                    stats.missing_md += 1;
                    continue;
                }
            };

            match family_index.get(&tag) {
                Some(&i) => families.members[i].push(read),
                None => {
                    let i = families.tags.len();
                    family_index.insert(tag.clone(), i);
                    families.tags.push(tag);
                    families.templates.push(rec.clone());
                    families.members.push(vec![read]);

                    match pair_index.get(&key) {
                        Some(&p) => families.pairs[p].1.push(i),
                        None => {
                            pair_index.insert(key.clone(), families.pairs.len());
                            families.pairs.push((key, vec![i]));
                        }
                    }
                }
            }
        }

        Ok(families)
    }
}

fn bam_out(path: &Path, header: &bam::Header) -> Result<bam::Writer> {
    bam::Writer::from_path(path, header, bam::Format::Bam).with_context(|| format!("creating {:?}", path))
}

fn gz_out(path: &Path) -> Result<GzEncoder<File>> {
    let file = File::create(path).with_context(|| format!("creating {:?}", path))?;
    Ok(GzEncoder::new(file, Compression::default()))
}

/// Gzip streams under the FASTQ writers, held apart so the trailers
/// are written by `finish` and its errors reach the caller.
struct FastqFiles {
    sscs: (GzEncoder<File>, GzEncoder<File>),
    doubleton: (GzEncoder<File>, GzEncoder<File>),
}

impl FastqFiles {
    fn create(outputs: &SscsOutputs) -> Result<Self> {
        Ok(FastqFiles {
            sscs: (gz_out(&outputs.sscs_fastq(true))?, gz_out(&outputs.sscs_fastq(false))?),
            doubleton: (
                gz_out(&outputs.doubleton_fastq(true))?,
                gz_out(&outputs.doubleton_fastq(false))?,
            ),
        })
    }

    fn finish(self) -> Result<()> {
        let FastqFiles { sscs, doubleton } = self;
        for gz in vec![sscs.0, sscs.1, doubleton.0, doubleton.1] {
            gz.finish()?;
        }
        Ok(())
    }
}

type FastqOut<'a> = fastq::Writer<&'a mut GzEncoder<File>>;

struct Writers<'a> {
    sscs: bam::Writer,
    singleton: bam::Writer,
    doubleton: bam::Writer,
    sscs_fastq: (FastqOut<'a>, FastqOut<'a>),
    doubleton_fastq: (FastqOut<'a>, FastqOut<'a>),
}

impl<'a> Writers<'a> {
    fn new(outputs: &SscsOutputs, header: &bam::Header, fastqs: &'a mut FastqFiles) -> Result<Self> {
        Ok(Writers {
            sscs: bam_out(outputs.sscs_bam(), header)?,
            singleton: bam_out(&outputs.singleton_bam(), header)?,
            doubleton: bam_out(&outputs.doubleton_bam(), header)?,
            sscs_fastq: (
                fastq::Writer::new(&mut fastqs.sscs.0),
                fastq::Writer::new(&mut fastqs.sscs.1),
            ),
            doubleton_fastq: (
                fastq::Writer::new(&mut fastqs.doubleton.0),
                fastq::Writer::new(&mut fastqs.doubleton.1),
            ),
        })
    }

    fn flush(&mut self) -> Result<()> {
        self.sscs_fastq.0.flush()?;
        self.sscs_fastq.1.flush()?;
        self.doubleton_fastq.0.flush()?;
        self.doubleton_fastq.1.flush()?;
        Ok(())
    }
}

/// Consensus record built on the first read of a family. The cigar and
/// placement are kept; MD and NM no longer describe the new sequence.
fn consensus_record(template: &bam::Record, name: &str, cons: &Consensus) -> Result<bam::Record> {
    let mut rec = template.clone();
    let cigar = template.cigar().take();
    rec.set(name.as_bytes(), Some(&cigar), &cons.seq, &cons.qual);
    for tag in [&b"MD"[..], &b"NM"[..]].iter() {
        if rec.aux(tag).is_ok() {
            rec.remove_aux(tag)?;
        }
    }
    Ok(rec)
}

/// FASTQ sequence and quality in the original read orientation.
fn fastq_entry(tag: &FamilyTag, cons: &Consensus) -> (Vec<u8>, Vec<u8>) {
    if tag.reverse {
        (dna::revcomp(&cons.seq), cons.qual.iter().rev().map(|q| q + 33).collect())
    } else {
        (cons.seq.clone(), cons.qual.iter().map(|q| q + 33).collect())
    }
}

/// Collapses single-strand families into consensus reads.
#[derive(Debug, Clone)]
pub struct SscsMaker {
    params: SscsParams,
}

impl SscsMaker {
    pub fn new(params: SscsParams) -> Self {
        SscsMaker { params: params }
    }

    /// Reads the coordinate-sorted, indexed `input` region by region and
    /// writes the consensus, doubleton and singleton reads plus the
    /// statistics tables named by `outputs`.
    pub fn run(&self, input: &Path, cytoband: &Path, outputs: &SscsOutputs) -> Result<SscsStats> {
        let mut reader = bam::IndexedReader::from_path(input).with_context(|| format!("opening {:?}", input))?;
        let header = bam::Header::from_template(reader.header());

        let contigs = {
            let view = reader.header();
            let mut contigs = Vec::new();
            for (tid, name) in view.target_names().iter().enumerate() {
                let len = view.target_len(tid as u32).unwrap_or(0);
                contigs.push((String::from_utf8_lossy(name).into_owned(), len));
            }
            contigs
        };
        let regions = regions(&contigs, read_cytoband(cytoband)?);

        let mut fastqs = FastqFiles::create(outputs)?;
        let mut stats = SscsStats::default();
        {
            let mut writers = Writers::new(outputs, &header, &mut fastqs)?;
            for region in regions.iter() {
                reader
                    .fetch((region.contig.as_str(), region.start, region.end))
                    .with_context(|| format!("fetching {}", region.name))?;
                let families = RegionFamilies::collect(&mut reader, region, &mut stats)?;
                debug!("{}: {} families", region.name, families.tags.len());
                self.emit(families, region, &mut writers, &mut stats)?;
            }
            writers.flush()?;
        }
        fastqs.finish()?;

        let mut summary = File::create(outputs.stats()).with_context(|| format!("creating {:?}", outputs.stats()))?;
        stats.write_summary(&mut summary)?;
        stats.write_read_families(outputs.read_families())?;
        stats.write_family_size_distribution(outputs.tag_fam_size())?;
        stats.phred.write(outputs.phred_density())?;
        stats.family_quality.write(outputs.tag_fam_quality())?;

        info!(
            "{} reads: {} SSCS, {} doubletons, {} singletons",
            stats.total_reads, stats.sscs_reads, stats.doubletons, stats.singletons
        );
        Ok(stats)
    }

    fn emit(
        &self,
        families: RegionFamilies,
        region: &Region,
        writers: &mut Writers<'_>,
        stats: &mut SscsStats,
    ) -> Result<()> {
        let cutoff = self.params.cutoff;
        let calls: Vec<Option<Consensus>> = families
            .members
            .par_iter()
            .map(|reads| {
                if reads.len() < 2 {
                    None
                } else {
                    Some(consensus(reads, reads[0].len(), cutoff))
                }
            })
            .collect();

        for (tag, reads) in families.tags.iter().zip(families.members.iter()) {
            stats.family_sizes.push((tag.to_string(), reads.len()));
        }

        let mut unpaired = 0;
        for (key, members) in families.pairs.iter() {
            if members.len() != 2 {
                unpaired += 1;
                continue;
            }

            for &i in members.iter() {
                let size = families.members[i].len();
                let template = &families.templates[i];
                let cons = match &calls[i] {
                    Some(cons) => cons,
                    None => {
                        stats.singletons += 1;
                        writers.singleton.write(template)?;
                        continue;
                    }
                };

                let name = format!("{}:{}", key, size);
                let rec = consensus_record(template, &name, cons)?;
                stats.phred.add(&cons.qual);
                stats.family_quality.add(size, &cons.qual);

                let cigar: Vec<Cigar> = rec.cigar().iter().cloned().collect();
                let (start, end) = aligned_bounds(&cigar, rec.seq_len());
                if cons.n_fraction(start, end) > self.params.n_cutoff {
                    stats.too_many_n += 1;
                    continue;
                }

                let tag = &families.tags[i];
                let (seq, qual) = fastq_entry(tag, cons);
                let (bam_out, fastqs) = if size == 2 {
                    stats.doubletons += 1;
                    (&mut writers.doubleton, &mut writers.doubleton_fastq)
                } else {
                    stats.sscs_reads += 1;
                    (&mut writers.sscs, &mut writers.sscs_fastq)
                };
                bam_out.write(&rec)?;
                let fastq_out = if tag.read1 { &mut fastqs.0 } else { &mut fastqs.1 };
                fastq_out.write(&name, None, &seq, &qual)?;
            }
        }

        if unpaired > 0 {
            warn!("{}: {} families without exactly one mate family", region.name, unpaired);
            stats.pairing_anomalies += unpaired;
        }
        Ok(())
    }
}

/// Native single-strand consensus, for `cc-sscs`.
#[derive(Debug)]
pub struct CLI {
    pub input_bam: String,
    pub outfile: String,
    pub cytoband: String,
    pub cutoff: f64,
    pub n_cutoff: f64,
}

impl CLI {
    pub fn run(&self) -> Result<()> {
        let params = SscsParams::new(self.cutoff, self.n_cutoff)?;
        let outputs = SscsOutputs::new(&self.outfile);
        let stats = SscsMaker::new(params).run(Path::new(&self.input_bam), Path::new(&self.cytoband), &outputs)?;
        stats.write_summary(&mut std::io::stdout())?;
        std::io::stdout().flush()?;
        Ok(())
    }
}
