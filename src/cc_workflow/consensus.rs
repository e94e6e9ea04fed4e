use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::archive::{self, Archiver};
use crate::artifact::{AlignmentArtifact, ConsensusArtifacts};
use crate::command::ToolCommand;
use crate::config::{ConfigTOML, ConsensusSettings, Overrides};
use crate::errors::WorkflowError;
use crate::workdir::{require_input, validate_prefix, WorkDir};

pub const STAGE: &str = "consensus";

/// Runs the consensus caller on one sorted alignment and bundles its
/// auxiliary output into `<prefix>.consensuscruncher.tar.gz`.
#[derive(Debug, Clone)]
pub struct ConsensusStage {
    settings: ConsensusSettings,
    archiver: Archiver,
}

impl ConsensusStage {
    pub fn new(settings: ConsensusSettings) -> Self {
        ConsensusStage {
            settings: settings,
            archiver: Archiver::default(),
        }
    }

    pub fn settings(&self) -> &ConsensusSettings {
        &self.settings
    }

    fn cytoband(&self) -> Result<&Path> {
        self.settings
            .cytoband
            .as_ref()
            .map(PathBuf::as_path)
            .ok_or_else(|| {
                WorkflowError::Unconfigured {
                    stage: STAGE,
                    setting: "cytoband",
                }
                .into()
            })
    }

    /// The caller names its per-sample directory after the input BAM,
    /// so it always reads `<workdir>/<prefix>.bam`.
    pub fn staged_input(workdir: &WorkDir, prefix: &str) -> AlignmentArtifact {
        AlignmentArtifact::for_prefix(workdir, prefix)
    }

    pub fn command(&self, workdir: &WorkDir, prefix: &str) -> Result<ToolCommand> {
        let input = Self::staged_input(workdir, prefix);
        Ok(ToolCommand::new(&self.settings.consensus_cruncher)
            .arg("consensus")
            .arg("-i")
            .arg(input.bam())
            .arg("-o")
            .arg(self.settings.layout.caller_output_dir(workdir, prefix))
            .arg("-s")
            .arg(&self.settings.samtools)
            .arg("--genome")
            .arg(&self.settings.genome)
            .arg("--bedfile")
            .arg(self.cytoband()?)
            .arg("-c")
            .arg(self.settings.cutoff.to_string())
            .current_dir(workdir.root())
            .env("OMP_NUM_THREADS", self.settings.resources.threads))
    }

    /// Checks that do not depend on the alignment: the prefix, the
    /// cytoband file, and that neither the archive nor the sample
    /// directory is already there.
    pub fn check_preconditions(&self, workdir: &WorkDir, prefix: &str) -> Result<()> {
        validate_prefix(prefix)?;
        require_input("cytoband", self.cytoband()?)?;

        let outputs = ConsensusArtifacts::expected(workdir, prefix, self.settings.layout);
        workdir.ensure_absent(outputs.archive())?;
        workdir.ensure_absent(&workdir.join(prefix))?;
        Ok(())
    }

    pub fn run(&self, alignment: &AlignmentArtifact, workdir: &WorkDir, prefix: &str) -> Result<ConsensusArtifacts> {
        self.check_preconditions(workdir, prefix)?;
        alignment.check_input()?;

        let outputs = ConsensusArtifacts::expected(workdir, prefix, self.settings.layout);
        let sample_dir = workdir.join(prefix);

        let staged = stage_input(alignment, workdir, prefix)?;

        let cmd = self.command(workdir, prefix)?;
        let res = &self.settings.resources;
        info!(
            "{} stage for {}: {} threads, {} GB, {} h limit, modules {}",
            STAGE, prefix, res.threads, res.memory_gb, res.timeout_hours, self.settings.modules
        );
        let called = cmd.run(res.timeout());
        if let Some(links) = &staged {
            unstage(links)?;
        }
        called?;

        outputs.check_bams(STAGE)?;

        let kept = outputs.bam_files();
        let archived = self
            .archiver
            .archive(workdir, prefix, &kept, outputs.archive())?;
        if !outputs.archive().is_file() {
            return Err(WorkflowError::MissingOutput {
                stage: STAGE,
                path: outputs.archive().to_path_buf(),
            }
            .into());
        }
        if self.settings.discard_archived {
            archive::discard(&sample_dir, &archived)?;
        }

        info!("{} stage produced {:?}", STAGE, outputs.archive());
        Ok(outputs)
    }
}

/// Links `alignment` in as `<workdir>/<prefix>.bam` (and index) when
/// it lives anywhere else. Returns the links made, if any.
fn stage_input(alignment: &AlignmentArtifact, workdir: &WorkDir, prefix: &str) -> Result<Option<AlignmentArtifact>> {
    let staged = ConsensusStage::staged_input(workdir, prefix);
    if same_file(alignment.bam(), staged.bam()) {
        return Ok(None);
    }

    for path in staged.paths().iter() {
        workdir.ensure_absent(path)?;
    }
    link(alignment.bam(), staged.bam())?;
    link(alignment.bai(), staged.bai())?;
    info!("staged {:?} as {:?}", alignment.bam(), staged.bam());
    Ok(Some(staged))
}

fn unstage(links: &AlignmentArtifact) -> Result<()> {
    for path in links.paths().iter() {
        fs::remove_file(path).with_context(|| format!("removing staged input {:?}", path))?;
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(unix)]
fn link(src: &Path, dst: &Path) -> Result<()> {
    let src = fs::canonicalize(src)?;
    std::os::unix::fs::symlink(&src, dst).with_context(|| format!("linking {:?} to {:?}", dst, src))
}

#[cfg(not(unix))]
fn link(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst).with_context(|| format!("copying {:?} to {:?}", src, dst))?;
    Ok(())
}

/// Consensus stage on its own, for `cc-consensus`.
#[derive(Debug)]
pub struct CLI {
    pub bam: String,
    pub bai: Option<String>,
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

        let stage = ConsensusStage::new(config.consensus_settings()?);
        let alignment = match &self.bai {
            Some(bai) => AlignmentArtifact::new(&self.bam, bai),
            None => AlignmentArtifact::with_index(&self.bam),
        };
        let workdir = WorkDir::new(&self.workdir)?;

        if self.dry_run {
            println!("{}", stage.command(&workdir, &self.output_prefix)?);
            return Ok(());
        }

        let outputs = stage.run(&alignment, &workdir, &self.output_prefix)?;
        outputs.write_manifest(&mut std::io::stdout())
    }
}
