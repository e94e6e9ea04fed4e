use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::workdir::{require_input, require_output, WorkDir};

/// Forward and reverse reads of one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadPair {
    fastq_r1: PathBuf,
    fastq_r2: PathBuf,
}

impl ReadPair {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(fastq_r1: P, fastq_r2: Q) -> Self {
        ReadPair {
            fastq_r1: fastq_r1.into(),
            fastq_r2: fastq_r2.into(),
        }
    }

    pub fn r1(&self) -> &Path {
        &self.fastq_r1
    }
    pub fn r2(&self) -> &Path {
        &self.fastq_r2
    }

    pub fn check_exists(&self) -> Result<()> {
        require_input("read 1 fastq", &self.fastq_r1)?;
        require_input("read 2 fastq", &self.fastq_r2)
    }
}

/// A sorted BAM file together with its index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlignmentArtifact {
    bam: PathBuf,
    bai: PathBuf,
}

impl AlignmentArtifact {
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(bam: P, bai: Q) -> Self {
        AlignmentArtifact {
            bam: bam.into(),
            bai: bai.into(),
        }
    }

    /// `<bam>` and `<bam>.bai`
    pub fn with_index<P: Into<PathBuf>>(bam: P) -> Self {
        let bam = bam.into();
        let mut bai = bam.clone().into_os_string();
        bai.push(".bai");
        AlignmentArtifact {
            bam: bam,
            bai: PathBuf::from(bai),
        }
    }

    /// `<workdir>/<prefix>.bam` and `<workdir>/<prefix>.bam.bai`
    pub fn for_prefix(workdir: &WorkDir, prefix: &str) -> Self {
        Self::with_index(workdir.output_filename(prefix, ".bam"))
    }

    pub fn bam(&self) -> &Path {
        &self.bam
    }
    pub fn bai(&self) -> &Path {
        &self.bai
    }

    pub fn paths(&self) -> [&Path; 2] {
        [&self.bam, &self.bai]
    }

    pub fn check_input(&self) -> Result<()> {
        require_input("alignment", &self.bam)?;
        require_input("alignment index", &self.bai)
    }

    pub fn check_output(&self, stage: &'static str) -> Result<()> {
        require_output(stage, &self.bam)?;
        require_output(stage, &self.bai)
    }
}

/// Where the consensus caller puts its per-sample results. `Flat`
/// places `dcs_sc/` and `sscs_sc/` directly under `<prefix>/`;
/// `Nested` adds a second `<prefix>/` level, as produced when the
/// caller is given `<prefix>` itself as its output directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    Flat,
    Nested,
}

impl Default for OutputLayout {
    fn default() -> Self {
        OutputLayout::Flat
    }
}

impl FromStr for OutputLayout {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "flat" => Ok(OutputLayout::Flat),
            "nested" => Ok(OutputLayout::Nested),
            _ => bail!("unknown output layout {:?} (expected flat or nested)", s),
        }
    }
}

impl fmt::Display for OutputLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputLayout::Flat => write!(f, "flat"),
            OutputLayout::Nested => write!(f, "nested"),
        }
    }
}

impl OutputLayout {
    /// Directory handed to the caller as its output directory.
    pub fn caller_output_dir(&self, workdir: &WorkDir, prefix: &str) -> PathBuf {
        match self {
            OutputLayout::Flat => workdir.root().to_path_buf(),
            OutputLayout::Nested => workdir.join(prefix),
        }
    }

    /// Directory holding `dcs_sc/` and `sscs_sc/`.
    pub fn results_dir(&self, workdir: &WorkDir, prefix: &str) -> PathBuf {
        self.caller_output_dir(workdir, prefix).join(prefix)
    }
}

/// Terminal outputs of the consensus stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusArtifacts {
    dcs: AlignmentArtifact,
    all_unique: AlignmentArtifact,
    sscs: AlignmentArtifact,
    archive: PathBuf,
}

impl ConsensusArtifacts {
    pub fn archive_name(prefix: &str) -> String {
        format!("{}.consensuscruncher.tar.gz", prefix)
    }

    /// Paths the consensus stage must produce for `prefix`.
    pub fn expected(workdir: &WorkDir, prefix: &str, layout: OutputLayout) -> Self {
        let results = layout.results_dir(workdir, prefix);
        let dcs_sc = results.join("dcs_sc");
        let sscs_sc = results.join("sscs_sc");

        ConsensusArtifacts {
            dcs: AlignmentArtifact::with_index(dcs_sc.join(format!("{}.dcs.sc.sorted.bam", prefix))),
            all_unique: AlignmentArtifact::with_index(
                dcs_sc.join(format!("{}.all.unique.dcs.sorted.bam", prefix)),
            ),
            sscs: AlignmentArtifact::with_index(sscs_sc.join(format!("{}.sscs.sc.sorted.bam", prefix))),
            archive: workdir.join(Self::archive_name(prefix)),
        }
    }

    pub fn dcs(&self) -> &AlignmentArtifact {
        &self.dcs
    }
    pub fn all_unique(&self) -> &AlignmentArtifact {
        &self.all_unique
    }
    pub fn sscs(&self) -> &AlignmentArtifact {
        &self.sscs
    }
    pub fn archive(&self) -> &Path {
        &self.archive
    }

    /// The six BAM and index files, which stay out of the archive.
    pub fn bam_files(&self) -> Vec<&Path> {
        vec![
            self.dcs.bam(),
            self.dcs.bai(),
            self.all_unique.bam(),
            self.all_unique.bai(),
            self.sscs.bam(),
            self.sscs.bai(),
        ]
    }

    pub fn check_bams(&self, stage: &'static str) -> Result<()> {
        self.dcs.check_output(stage)?;
        self.all_unique.check_output(stage)?;
        self.sscs.check_output(stage)
    }

    /// Tab-delimited `output<TAB>path` listing of the workflow outputs.
    pub fn write_manifest<W: Write>(&self, out: &mut W) -> Result<()> {
        write!(out, "dcs_sc_bam\t{}\n", self.dcs.bam().display())?;
        write!(out, "dcs_sc_bam_index\t{}\n", self.dcs.bai().display())?;
        write!(out, "all_unique_bam\t{}\n", self.all_unique.bam().display())?;
        write!(out, "all_unique_bam_index\t{}\n", self.all_unique.bai().display())?;
        write!(out, "sscs_sc_bam\t{}\n", self.sscs.bam().display())?;
        write!(out, "sscs_sc_bam_index\t{}\n", self.sscs.bai().display())?;
        write!(out, "consensus_archive\t{}\n", self.archive.display())?;
        Ok(())
    }
}
