use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use log::info;

use crate::align::AlignStage;
use crate::artifact::{AlignmentArtifact, ConsensusArtifacts, ReadPair};
use crate::command::ToolCommand;
use crate::config::{ConfigTOML, Overrides};
use crate::consensus::ConsensusStage;
use crate::errors::WorkflowError;
use crate::workdir::{validate_prefix, WorkDir};

/// Where the consensus stage gets its alignment from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowInput {
    RawReads(ReadPair),
    PreAligned(AlignmentArtifact),
}

impl WorkflowInput {
    /// Picks the entry point from what was supplied. A pre-aligned BAM
    /// wins over reads; half of a pair is an error, as is nothing at all.
    pub fn resolve(
        fastq_r1: Option<PathBuf>,
        fastq_r2: Option<PathBuf>,
        bam: Option<PathBuf>,
        bai: Option<PathBuf>,
    ) -> Result<Self> {
        match (bam, bai) {
            (Some(bam), Some(bai)) => return Ok(WorkflowInput::PreAligned(AlignmentArtifact::new(bam, bai))),
            (Some(_), None) => {
                return Err(WorkflowError::IncompleteInput("pre-aligned BAM given without its index".to_string()).into())
            }
            (None, Some(_)) => {
                return Err(WorkflowError::IncompleteInput("BAM index given without its BAM".to_string()).into())
            }
            (None, None) => (),
        }

        match (fastq_r1, fastq_r2) {
            (Some(r1), Some(r2)) => Ok(WorkflowInput::RawReads(ReadPair::new(r1, r2))),
            (Some(_), None) => Err(WorkflowError::IncompleteInput("read 1 fastq given without read 2".to_string()).into()),
            (None, Some(_)) => Err(WorkflowError::IncompleteInput("read 2 fastq given without read 1".to_string()).into()),
            (None, None) => Err(WorkflowError::NoAlignmentSource.into()),
        }
    }

    pub fn runs_align(&self) -> bool {
        match self {
            WorkflowInput::RawReads(_) => true,
            WorkflowInput::PreAligned(_) => false,
        }
    }
}

/// Everything a finished run hands back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowOutputs {
    pub alignment: AlignmentArtifact,
    pub aligned_here: bool,
    pub consensus: ConsensusArtifacts,
}

impl WorkflowOutputs {
    pub fn write_manifest<W: Write>(&self, out: &mut W) -> Result<()> {
        if self.aligned_here {
            write!(out, "bam\t{}\n", self.alignment.bam().display())?;
            write!(out, "bam_index\t{}\n", self.alignment.bai().display())?;
        }
        self.consensus.write_manifest(out)
    }
}

/// Align (when needed) followed by consensus calling.
#[derive(Debug, Clone)]
pub struct Workflow {
    align: AlignStage,
    consensus: ConsensusStage,
}

impl Workflow {
    pub fn new(align: AlignStage, consensus: ConsensusStage) -> Self {
        Workflow {
            align: align,
            consensus: consensus,
        }
    }

    pub fn from_config(config: &ConfigTOML) -> Result<Self> {
        Ok(Self::new(
            AlignStage::new(config.align_settings()?),
            ConsensusStage::new(config.consensus_settings()?),
        ))
    }

    /// Commands a run would execute, in order, without running them.
    pub fn plan(&self, input: &WorkflowInput, workdir: &WorkDir, prefix: &str) -> Result<Vec<ToolCommand>> {
        validate_prefix(prefix)?;
        let mut commands = Vec::new();
        if let WorkflowInput::RawReads(reads) = input {
            commands.push(self.align.command(reads, workdir, prefix)?);
        }
        commands.push(self.consensus.command(workdir, prefix)?);
        Ok(commands)
    }

    pub fn run(&self, input: &WorkflowInput, workdir: &WorkDir, prefix: &str) -> Result<WorkflowOutputs> {
        validate_prefix(prefix)?;
        // Both stages must be runnable before anything starts.
        self.plan(input, workdir, prefix)?;
        self.consensus.check_preconditions(workdir, prefix)?;

        let alignment = match input {
            WorkflowInput::RawReads(reads) => self.align.run(reads, workdir, prefix)?,
            WorkflowInput::PreAligned(artifact) => {
                info!("pre-aligned input {:?}, skipping align stage", artifact.bam());
                artifact.clone()
            }
        };

        let consensus = self.consensus.run(&alignment, workdir, prefix)?;

        Ok(WorkflowOutputs {
            alignment: alignment,
            aligned_here: input.runs_align(),
            consensus: consensus,
        })
    }
}

/// Full workflow, for `cc-run`.
#[derive(Debug)]
pub struct CLI {
    pub fastq_r1: Option<String>,
    pub fastq_r2: Option<String>,
    pub bam: Option<String>,
    pub bai: Option<String>,
    pub output_prefix: String,
    pub workdir: String,
    pub config_file: Option<String>,
    pub overrides: Overrides,
    pub dry_run: bool,
}

impl CLI {
    pub fn run(&self) -> Result<()> {
        let input = WorkflowInput::resolve(
            self.fastq_r1.as_ref().map(PathBuf::from),
            self.fastq_r2.as_ref().map(PathBuf::from),
            self.bam.as_ref().map(PathBuf::from),
            self.bai.as_ref().map(PathBuf::from),
        )?;

        let mut config = ConfigTOML::load(self.config_file.as_ref().map(String::as_str))?;
        self.overrides.apply(&mut config)?;
        let workflow = Workflow::from_config(&config)?;
        let workdir = WorkDir::new(&self.workdir)?;

        if self.dry_run {
            for cmd in workflow.plan(&input, &workdir, &self.output_prefix)? {
                println!("{}", cmd);
            }
            return Ok(());
        }

        let outputs = workflow.run(&input, &workdir, &self.output_prefix)?;
        outputs.write_manifest(&mut std::io::stdout())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AlignSettings, AlignTOML, ConsensusSettings, ConsensusTOML};
    use crate::test_tools::{fake_caller, CallerBehavior};
    use std::fs;
    use std::path::Path;

    fn expect_error(err: anyhow::Error) -> WorkflowError {
        match err.downcast::<WorkflowError>() {
            Ok(err) => err,
            Err(other) => panic!("unexpected {:?}", other),
        }
    }

    fn p(s: &str) -> Option<PathBuf> {
        Some(PathBuf::from(s))
    }

    #[test]
    fn resolution() {
        let input = WorkflowInput::resolve(p("r1.fq"), p("r2.fq"), None, None).unwrap();
        assert_eq!(input, WorkflowInput::RawReads(ReadPair::new("r1.fq", "r2.fq")));
        assert!(input.runs_align());

        let input = WorkflowInput::resolve(None, None, p("pre.bam"), p("pre.bam.bai")).unwrap();
        assert_eq!(
            input,
            WorkflowInput::PreAligned(AlignmentArtifact::new("pre.bam", "pre.bam.bai"))
        );
        assert!(!input.runs_align());

        let input = WorkflowInput::resolve(p("r1.fq"), p("r2.fq"), p("pre.bam"), p("pre.bam.bai")).unwrap();
        assert!(!input.runs_align());
    }

    #[test]
    fn resolution_failures() {
        match expect_error(WorkflowInput::resolve(None, None, None, None).unwrap_err()) {
            WorkflowError::NoAlignmentSource => (),
            other => panic!("unexpected {:?}", other),
        }
        match expect_error(WorkflowInput::resolve(p("r1.fq"), None, None, None).unwrap_err()) {
            WorkflowError::IncompleteInput(_) => (),
            other => panic!("unexpected {:?}", other),
        }
        match expect_error(WorkflowInput::resolve(p("r1.fq"), p("r2.fq"), p("pre.bam"), None).unwrap_err()) {
            WorkflowError::IncompleteInput(_) => (),
            other => panic!("unexpected {:?}", other),
        }
        match expect_error(WorkflowInput::resolve(None, None, None, p("pre.bam.bai")).unwrap_err()) {
            WorkflowError::IncompleteInput(_) => (),
            other => panic!("unexpected {:?}", other),
        }
    }

    struct Fixture {
        _tmp: tempfile::TempDir,
        tools: PathBuf,
        inputs: PathBuf,
        workdir: WorkDir,
        workflow: Workflow,
    }

    fn fixture(behavior: CallerBehavior) -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let tools = tmp.path().join("tools");
        let inputs = tmp.path().join("inputs");
        fs::create_dir_all(&inputs).unwrap();
        let caller = fake_caller(&tools, behavior);
        let caller = caller.to_str().map(String::from);

        let bwa_ref = tools.join("hg19.fa");
        fs::write(&bwa_ref, b">chr1\nACGT\n").unwrap();
        let cytoband = tools.join("hg19_cytoBand.txt");
        fs::write(&cytoband, b"chrom\tstart\tend\tname\tgieStain\n").unwrap();

        let align = AlignSettings::new(&AlignTOML {
            consensus_cruncher: caller.clone(),
            bwa_ref: bwa_ref.to_str().map(String::from),
            ..AlignTOML::default()
        })
        .unwrap();
        let consensus = ConsensusSettings::new(&ConsensusTOML {
            consensus_cruncher: caller,
            cytoband: cytoband.to_str().map(String::from),
            ..ConsensusTOML::default()
        })
        .unwrap();

        let workdir = WorkDir::new(tmp.path().join("run")).unwrap();
        Fixture {
            _tmp: tmp,
            tools: tools,
            inputs: inputs,
            workdir: workdir,
            workflow: Workflow::new(AlignStage::new(align), ConsensusStage::new(consensus)),
        }
    }

    impl Fixture {
        fn reads(&self) -> ReadPair {
            let reads = ReadPair::new(self.inputs.join("s_R1.fastq.gz"), self.inputs.join("s_R2.fastq.gz"));
            fs::write(reads.r1(), b"@r1\n").unwrap();
            fs::write(reads.r2(), b"@r2\n").unwrap();
            reads
        }

        fn calls(&self) -> Vec<String> {
            fs::read_to_string(self.tools.join("calls.log"))
                .unwrap_or_default()
                .lines()
                .map(String::from)
                .collect()
        }

        fn rel<'a>(&self, path: &'a Path) -> &'a Path {
            path.strip_prefix(self.workdir.root()).unwrap()
        }
    }

    #[cfg(unix)]
    #[test]
    fn raw_reads_align_then_call() {
        let fx = fixture(CallerBehavior::Complete);
        let input = WorkflowInput::RawReads(fx.reads());

        let outputs = fx.workflow.run(&input, &fx.workdir, "sample1").unwrap();

        assert!(outputs.aligned_here);
        assert_eq!(fx.rel(outputs.alignment.bam()), Path::new("sample1.bam"));
        assert_eq!(fx.rel(outputs.alignment.bai()), Path::new("sample1.bam.bai"));
        assert!(outputs.alignment.bam().is_file());

        let consensus = &outputs.consensus;
        assert_eq!(
            fx.rel(consensus.dcs().bam()),
            Path::new("sample1/dcs_sc/sample1.dcs.sc.sorted.bam")
        );
        assert_eq!(
            fx.rel(consensus.all_unique().bai()),
            Path::new("sample1/dcs_sc/sample1.all.unique.dcs.sorted.bam.bai")
        );
        assert_eq!(
            fx.rel(consensus.sscs().bam()),
            Path::new("sample1/sscs_sc/sample1.sscs.sc.sorted.bam")
        );
        assert_eq!(fx.rel(consensus.archive()), Path::new("sample1.consensuscruncher.tar.gz"));
        for path in consensus.bam_files() {
            assert!(path.is_file(), "{:?}", path);
        }
        assert!(consensus.archive().is_file());

        let calls = fx.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls[0].starts_with("fastq2bam "));
        assert!(calls[1].starts_with("consensus "));
        assert_eq!(calls[2], "consumed aligned");

        let mut manifest = Vec::new();
        outputs.write_manifest(&mut manifest).unwrap();
        assert_eq!(String::from_utf8(manifest).unwrap().lines().count(), 9);
    }

    #[cfg(unix)]
    #[test]
    fn pre_aligned_skips_align() {
        let fx = fixture(CallerBehavior::Complete);
        let supplied = AlignmentArtifact::new(fx.inputs.join("pre-aligned.bam"), fx.inputs.join("pre-aligned.bai"));
        fs::write(supplied.bam(), b"pre-aligned").unwrap();
        fs::write(supplied.bai(), b"index").unwrap();
        let input = WorkflowInput::PreAligned(supplied.clone());

        let outputs = fx.workflow.run(&input, &fx.workdir, "sample2").unwrap();

        assert!(!outputs.aligned_here);
        assert_eq!(outputs.alignment, supplied);
        assert!(!fx.workdir.join("bamfiles").exists());
        assert_eq!(
            fx.rel(outputs.consensus.archive()),
            Path::new("sample2.consensuscruncher.tar.gz")
        );

        let calls = fx.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("consensus "));
        assert_eq!(calls[1], "consumed pre-aligned");

        let mut manifest = Vec::new();
        outputs.write_manifest(&mut manifest).unwrap();
        assert_eq!(String::from_utf8(manifest).unwrap().lines().count(), 7);
    }

    #[cfg(unix)]
    #[test]
    fn same_prefix_same_layout() {
        let first = fixture(CallerBehavior::Complete);
        let second = fixture(CallerBehavior::Complete);
        let a = first
            .workflow
            .run(&WorkflowInput::RawReads(first.reads()), &first.workdir, "s9")
            .unwrap();
        let b = second
            .workflow
            .run(&WorkflowInput::RawReads(second.reads()), &second.workdir, "s9")
            .unwrap();

        let rel_a: Vec<_> = a.consensus.bam_files().into_iter().map(|f| first.rel(f).to_path_buf()).collect();
        let rel_b: Vec<_> = b.consensus.bam_files().into_iter().map(|f| second.rel(f).to_path_buf()).collect();
        assert_eq!(rel_a, rel_b);
    }

    #[cfg(unix)]
    #[test]
    fn align_failure_stops_the_workflow() {
        let fx = fixture(CallerBehavior::Fail);
        let input = WorkflowInput::RawReads(fx.reads());

        let err = fx.workflow.run(&input, &fx.workdir, "s1").unwrap_err();
        match expect_error(err) {
            WorkflowError::ToolFailed { stderr, .. } => {
                assert_eq!(stderr, "fastq2bam: reference index not found")
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(fx.calls().len(), 1);
        assert!(!fx.workdir.join("s1.bam").exists());
    }

    #[cfg(unix)]
    #[test]
    fn unconfigured_consensus_fails_before_align() {
        let fx = fixture(CallerBehavior::Complete);
        let mut settings = fx.workflow.consensus.settings().clone();
        settings.cytoband = None;
        let workflow = Workflow::new(fx.workflow.align.clone(), ConsensusStage::new(settings));

        let err = workflow
            .run(&WorkflowInput::RawReads(fx.reads()), &fx.workdir, "s1")
            .unwrap_err();
        match expect_error(err) {
            WorkflowError::Unconfigured { setting, .. } => assert_eq!(setting, "cytoband"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(fx.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn existing_archive_stops_before_align() {
        let fx = fixture(CallerBehavior::Complete);
        fs::write(fx.workdir.join("s1.consensuscruncher.tar.gz"), b"old").unwrap();

        let err = fx
            .workflow
            .run(&WorkflowInput::RawReads(fx.reads()), &fx.workdir, "s1")
            .unwrap_err();
        match expect_error(err) {
            WorkflowError::OutputCollision(_) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!fx.tools.join("calls.log").exists());
        assert!(!fx.workdir.join("s1.bam").exists());
    }

    #[cfg(unix)]
    #[test]
    fn existing_sample_dir_stops_before_align() {
        let fx = fixture(CallerBehavior::Complete);
        fs::create_dir_all(fx.workdir.join("s1")).unwrap();

        let err = fx
            .workflow
            .run(&WorkflowInput::RawReads(fx.reads()), &fx.workdir, "s1")
            .unwrap_err();
        match expect_error(err) {
            WorkflowError::OutputCollision(_) => (),
            other => panic!("unexpected {:?}", other),
        }
        assert!(fx.calls().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn missing_cytoband_stops_before_align() {
        let fx = fixture(CallerBehavior::Complete);
        fs::remove_file(fx.tools.join("hg19_cytoBand.txt")).unwrap();

        let err = fx
            .workflow
            .run(&WorkflowInput::RawReads(fx.reads()), &fx.workdir, "s1")
            .unwrap_err();
        match expect_error(err) {
            WorkflowError::MissingInput { .. } => (),
            other => panic!("unexpected {:?}", other),
        }
        assert!(!fx.tools.join("calls.log").exists());
        assert!(!fx.workdir.join("s1.bam").exists());
    }

    #[cfg(unix)]
    #[test]
    fn plan_lists_commands() {
        let fx = fixture(CallerBehavior::Complete);
        let raw = WorkflowInput::RawReads(ReadPair::new("r1.fq", "r2.fq"));
        let plan = fx.workflow.plan(&raw, &fx.workdir, "s1").unwrap();
        assert_eq!(plan.len(), 2);
        assert_eq!(plan[0].arg_list()[0], "fastq2bam");
        assert_eq!(plan[1].arg_list()[0], "consensus");

        let pre = WorkflowInput::PreAligned(AlignmentArtifact::with_index("pre.bam"));
        assert_eq!(fx.workflow.plan(&pre, &fx.workdir, "s1").unwrap().len(), 1);

        assert!(fx.workflow.plan(&pre, &fx.workdir, "bad/prefix").is_err());
    }
}
