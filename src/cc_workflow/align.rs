use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::artifact::{AlignmentArtifact, ReadPair};
use crate::command::ToolCommand;
use crate::config::{AlignSettings, ConfigTOML, Overrides};
use crate::errors::WorkflowError;
use crate::workdir::{validate_prefix, WorkDir};

pub const STAGE: &str = "align";

/// Aligns a read pair with the consensus caller's `fastq2bam` wrapper
/// (bwa mem, samtools sort and index), then renames the sorted BAM
/// and index to `<prefix>.bam` and `<prefix>.bam.bai`.
#[derive(Debug, Clone)]
pub struct AlignStage {
    settings: AlignSettings,
}

impl AlignStage {
    pub fn new(settings: AlignSettings) -> Self {
        AlignStage { settings: settings }
    }

    pub fn settings(&self) -> &AlignSettings {
        &self.settings
    }

    /// Where the wrapper leaves its sorted BAM before renaming.
    pub fn tool_outputs(workdir: &WorkDir, prefix: &str) -> AlignmentArtifact {
        AlignmentArtifact::with_index(
            workdir
                .join("bamfiles")
                .join(format!("{}.sorted.bam", prefix)),
        )
    }

    pub fn command(&self, reads: &ReadPair, workdir: &WorkDir, prefix: &str) -> Result<ToolCommand> {
        let bwa_ref = self
            .settings
            .bwa_ref
            .as_ref()
            .ok_or(WorkflowError::Unconfigured {
                stage: STAGE,
                setting: "bwa_ref",
            })?;

        Ok(ToolCommand::new(&self.settings.consensus_cruncher)
            .arg("fastq2bam")
            .arg("--fastq1")
            .arg(reads.r1())
            .arg("--fastq2")
            .arg(reads.r2())
            .arg("--output")
            .arg(workdir.root())
            .arg("--name")
            .arg(prefix)
            .arg("--bwa")
            .arg(&self.settings.bwa)
            .arg("--ref")
            .arg(bwa_ref)
            .arg("--samtools")
            .arg(&self.settings.samtools)
            .arg("--skipcheck")
            .current_dir(workdir.root())
            .env("OMP_NUM_THREADS", self.settings.resources.threads))
    }

    pub fn run(&self, reads: &ReadPair, workdir: &WorkDir, prefix: &str) -> Result<AlignmentArtifact> {
        validate_prefix(prefix)?;
        reads.check_exists()?;
        if let Some(bwa_ref) = &self.settings.bwa_ref {
            if !bwa_ref.exists() {
                return Err(WorkflowError::MissingInput {
                    what: "bwa reference",
                    path: bwa_ref.clone(),
                }
                .into());
            }
        }

        let final_outputs = AlignmentArtifact::for_prefix(workdir, prefix);
        for path in final_outputs.paths().iter() {
            workdir.ensure_absent(path)?;
        }
        let tool_outputs = Self::tool_outputs(workdir, prefix);
        for path in tool_outputs.paths().iter() {
            workdir.ensure_absent(path)?;
        }

        let cmd = self.command(reads, workdir, prefix)?;
        let res = &self.settings.resources;
        info!(
            "{} stage for {}: {} threads, {} GB, {} h limit, modules {}",
            STAGE, prefix, res.threads, res.memory_gb, res.timeout_hours, self.settings.modules
        );
        cmd.run(res.timeout())?;

        tool_outputs.check_output(STAGE)?;
        rename(tool_outputs.bam(), final_outputs.bam())?;
        rename(tool_outputs.bai(), final_outputs.bai())?;
        final_outputs.check_output(STAGE)?;

        info!("{} stage produced {:?}", STAGE, final_outputs.bam());
        Ok(final_outputs)
    }
}

fn rename(from: &std::path::Path, to: &std::path::Path) -> Result<()> {
    fs::rename(from, to).with_context(|| format!("renaming {:?} to {:?}", from, to))
}

/// Align stage on its own, for `cc-align`.
#[derive(Debug)]
pub struct CLI {
    pub fastq_r1: String,
    pub fastq_r2: String,
    pub output_prefix: String,
    pub workdir: String,
    pub config_file: Option<String>,
    pub overrides: Overrides,
    pub dry_run: bool,
}

impl CLI {
    pub fn run(&self) -> Result<()> {
        let mut config = ConfigTOML::load(self.config_file.as_ref().map(String::as_str))?;
        self.overrides.apply(&mut config)?;

        let stage = AlignStage::new(config.align_settings()?);
        let reads = ReadPair::new(PathBuf::from(&self.fastq_r1), PathBuf::from(&self.fastq_r2));
        let workdir = WorkDir::new(&self.workdir)?;

        if self.dry_run {
            println!("{}", stage.command(&reads, &workdir, &self.output_prefix)?);
            return Ok(());
        }

        let artifact = stage.run(&reads, &workdir, &self.output_prefix)?;
        println!("bam\t{}", artifact.bam().display());
        println!("bam_index\t{}", artifact.bai().display());
        Ok(())
    }
}
