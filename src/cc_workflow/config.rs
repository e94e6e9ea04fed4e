use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::artifact::OutputLayout;

pub const DEFAULT_CONSENSUS_CRUNCHER: &str = "ConsensusCruncher.py";
pub const DEFAULT_BWA: &str = "bwa";
pub const DEFAULT_SAMTOOLS: &str = "samtools";
pub const DEFAULT_GENOME: &str = "hg19";
pub const DEFAULT_CUTOFF: f64 = 0.7;

pub const DEFAULT_ALIGN_MODULES: &str =
    "consensus-cruncher/5.0 data-hg19-consensus-cruncher/1.0 hg19-bwa-index/0.7.12 samtools/1.9";
pub const DEFAULT_CONSENSUS_MODULES: &str =
    "consensus-cruncher/5.0 data-hg19-consensus-cruncher/1.0 samtools/1.9";

pub const DEFAULT_THREADS: usize = 8;
pub const DEFAULT_MEMORY_GB: usize = 16;
pub const DEFAULT_TIMEOUT_HOURS: f64 = 72.0;

/// Workflow configuration file. Every field may be omitted; the
/// resolved settings fill in the defaults above.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigTOML {
    pub align: Option<AlignTOML>,
    pub consensus: Option<ConsensusTOML>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlignTOML {
    pub consensus_cruncher: Option<String>,
    pub bwa: Option<String>,
    pub bwa_ref: Option<String>,
    pub samtools: Option<String>,
    pub modules: Option<String>,
    pub threads: Option<usize>,
    pub memory_gb: Option<usize>,
    pub timeout_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsensusTOML {
    pub consensus_cruncher: Option<String>,
    pub samtools: Option<String>,
    pub genome: Option<String>,
    pub cytoband: Option<String>,
    pub cutoff: Option<f64>,
    pub layout: Option<OutputLayout>,
    pub discard_archived: Option<bool>,
    pub modules: Option<String>,
    pub threads: Option<usize>,
    pub memory_gb: Option<usize>,
    pub timeout_hours: Option<f64>,
}

impl ConfigTOML {
    pub fn from_file<P: AsRef<Path>>(filename: P) -> Result<Self> {
        let contents = fs::read_to_string(filename.as_ref())
            .with_context(|| format!("reading config file {:?}", filename.as_ref()))?;
        Self::parse(&contents).with_context(|| format!("parsing config file {:?}", filename.as_ref()))
    }

    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads `filename` when given, otherwise starts from all defaults.
    pub fn load(filename: Option<&str>) -> Result<Self> {
        filename.map_or_else(|| Ok(Self::default()), Self::from_file)
    }

    pub fn align_settings(&self) -> Result<AlignSettings> {
        AlignSettings::new(&self.align.clone().unwrap_or_default())
    }

    pub fn consensus_settings(&self) -> Result<ConsensusSettings> {
        ConsensusSettings::new(&self.consensus.clone().unwrap_or_default())
    }
}

/// Command-line values that take precedence over the configuration
/// file. Kept as the raw strings from the argument parser.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub bwa_ref: Option<String>,
    pub cytoband: Option<String>,
    pub genome: Option<String>,
    pub cutoff: Option<String>,
    pub threads: Option<String>,
    pub layout: Option<String>,
}

impl Overrides {
    pub fn apply(&self, config: &mut ConfigTOML) -> Result<()> {
        let align = config.align.get_or_insert_with(AlignTOML::default);
        if let Some(bwa_ref) = &self.bwa_ref {
            align.bwa_ref = Some(bwa_ref.to_string());
        }

        let threads = self
            .threads
            .as_ref()
            .map(|t| usize::from_str(t).with_context(|| format!("bad thread count {:?}", t)))
            .transpose()?;
        if threads.is_some() {
            align.threads = threads;
        }

        let consensus = config.consensus.get_or_insert_with(ConsensusTOML::default);
        if threads.is_some() {
            consensus.threads = threads;
        }
        if let Some(cytoband) = &self.cytoband {
            consensus.cytoband = Some(cytoband.to_string());
        }
        if let Some(genome) = &self.genome {
            consensus.genome = Some(genome.to_string());
        }
        if let Some(cutoff) = &self.cutoff {
            consensus.cutoff =
                Some(f64::from_str(cutoff).with_context(|| format!("bad cutoff {:?}", cutoff))?);
        }
        if let Some(layout) = &self.layout {
            consensus.layout = Some(OutputLayout::from_str(layout)?);
        }

        Ok(())
    }
}

/// Requested per-stage resources. Only the timeout is enforced here;
/// threads are handed to the tool and memory is advisory.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resources {
    pub threads: usize,
    pub memory_gb: usize,
    pub timeout_hours: f64,
}

impl Resources {
    pub fn new(threads: Option<usize>, memory_gb: Option<usize>, timeout_hours: Option<f64>) -> Result<Self> {
        let res = Resources {
            threads: threads.unwrap_or(DEFAULT_THREADS),
            memory_gb: memory_gb.unwrap_or(DEFAULT_MEMORY_GB),
            timeout_hours: timeout_hours.unwrap_or(DEFAULT_TIMEOUT_HOURS),
        };

        if res.threads == 0 {
            bail!("thread count must be positive");
        }
        if res.memory_gb == 0 {
            bail!("memory request must be positive");
        }
        if !(res.timeout_hours >= 0.0)
            || !res.timeout_hours.is_finite()
            || Duration::try_from_secs_f64(res.timeout_hours * 3600.0).is_err()
        {
            bail!("bad timeout {} hours", res.timeout_hours);
        }

        Ok(res)
    }

    /// Wall-clock limit, or `None` for a zero timeout meaning unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_hours > 0.0 {
            Some(Duration::from_secs_f64(self.timeout_hours * 3600.0))
        } else {
            None
        }
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: DEFAULT_THREADS,
            memory_gb: DEFAULT_MEMORY_GB,
            timeout_hours: DEFAULT_TIMEOUT_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlignSettings {
    pub consensus_cruncher: PathBuf,
    pub bwa: PathBuf,
    pub bwa_ref: Option<PathBuf>,
    pub samtools: PathBuf,
    pub modules: String,
    pub resources: Resources,
}

impl AlignSettings {
    pub fn new(toml: &AlignTOML) -> Result<Self> {
        Ok(AlignSettings {
            consensus_cruncher: tool_path(&toml.consensus_cruncher, DEFAULT_CONSENSUS_CRUNCHER)?,
            bwa: tool_path(&toml.bwa, DEFAULT_BWA)?,
            bwa_ref: optional_path(&toml.bwa_ref)?,
            samtools: tool_path(&toml.samtools, DEFAULT_SAMTOOLS)?,
            modules: toml
                .modules
                .clone()
                .unwrap_or_else(|| DEFAULT_ALIGN_MODULES.to_string()),
            resources: Resources::new(toml.threads, toml.memory_gb, toml.timeout_hours)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusSettings {
    pub consensus_cruncher: PathBuf,
    pub samtools: PathBuf,
    pub genome: String,
    pub cytoband: Option<PathBuf>,
    pub cutoff: f64,
    pub layout: OutputLayout,
    pub discard_archived: bool,
    pub modules: String,
    pub resources: Resources,
}

impl ConsensusSettings {
    pub fn new(toml: &ConsensusTOML) -> Result<Self> {
        let cutoff = toml.cutoff.unwrap_or(DEFAULT_CUTOFF);
        if !(cutoff > 0.0 && cutoff <= 1.0) {
            bail!("consensus cutoff {} outside (0, 1]", cutoff);
        }

        Ok(ConsensusSettings {
            consensus_cruncher: tool_path(&toml.consensus_cruncher, DEFAULT_CONSENSUS_CRUNCHER)?,
            samtools: tool_path(&toml.samtools, DEFAULT_SAMTOOLS)?,
            genome: toml
                .genome
                .clone()
                .unwrap_or_else(|| DEFAULT_GENOME.to_string()),
            cytoband: optional_path(&toml.cytoband)?,
            cutoff: cutoff,
            layout: toml.layout.unwrap_or_default(),
            discard_archived: toml.discard_archived.unwrap_or(true),
            modules: toml
                .modules
                .clone()
                .unwrap_or_else(|| DEFAULT_CONSENSUS_MODULES.to_string()),
            resources: Resources::new(toml.threads, toml.memory_gb, toml.timeout_hours)?,
        })
    }
}

fn tool_path(configured: &Option<String>, default: &str) -> Result<PathBuf> {
    let raw = configured.as_ref().map_or(default, String::as_str);
    Ok(PathBuf::from(expand_placeholders(raw)?))
}

fn optional_path(configured: &Option<String>) -> Result<Option<PathBuf>> {
    configured
        .as_ref()
        .map(|raw| expand_placeholders(raw).map(PathBuf::from))
        .transpose()
}

/// Replaces `$NAME` and `${NAME}` with values from the process
/// environment. An unset variable is an error.
pub fn expand_placeholders(raw: &str) -> Result<String> {
    expand_with(raw, |name| std::env::var(name).ok())
}

pub fn expand_with<F>(raw: &str, lookup: F) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut expanded = String::with_capacity(raw.len());
    let mut chars = raw.char_indices().peekable();

    while let Some((_, ch)) = chars.next() {
        if ch != '$' {
            expanded.push(ch);
            continue;
        }

        let name = if let Some(&(_, '{')) = chars.peek() {
            chars.next();
            let mut name = String::new();
            loop {
                match chars.next() {
                    Some((_, '}')) => break,
                    Some((_, c)) => name.push(c),
                    None => bail!("unterminated placeholder in {:?}", raw),
                }
            }
            name
        } else {
            let mut name = String::new();
            while let Some(&(_, c)) = chars.peek() {
                if c.is_ascii_alphanumeric() || c == '_' {
                    name.push(c);
                    chars.next();
                } else {
                    break;
                }
            }
            name
        };

        if name.is_empty() {
            expanded.push('$');
            continue;
        }

        match lookup(&name) {
            Some(value) => expanded.push_str(&value),
            None => bail!("environment variable {} in {:?} is not set", name, raw),
        }
    }

    Ok(expanded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(name: &str) -> Option<String> {
        match name {
            "CC_ROOT" => Some("/opt/cc/5.0".to_string()),
            "HG19_ROOT" => Some("/data/hg19".to_string()),
            _ => None,
        }
    }

    #[test]
    fn expands_both_placeholder_forms() {
        assert_eq!(
            expand_with("$CC_ROOT/bin/ConsensusCruncher.py", fake_env).unwrap(),
            "/opt/cc/5.0/bin/ConsensusCruncher.py"
        );
        assert_eq!(
            expand_with("${HG19_ROOT}_bwa/hg19.fa", fake_env).unwrap(),
            "/data/hg19_bwa/hg19.fa"
        );
        assert_eq!(expand_with("samtools", fake_env).unwrap(), "samtools");
        assert_eq!(expand_with("cost$", fake_env).unwrap(), "cost$");
    }

    #[test]
    fn unset_placeholder_fails() {
        assert!(expand_with("$NOT_SET/bin/bwa", fake_env).is_err());
        assert!(expand_with("${CC_ROOT", fake_env).is_err());
    }

    #[test]
    fn empty_config_gives_defaults() {
        let config = ConfigTOML::parse("").unwrap();

        let align = config.align_settings().unwrap();
        assert_eq!(align.bwa, PathBuf::from(DEFAULT_BWA));
        assert_eq!(align.bwa_ref, None);
        assert_eq!(align.modules, DEFAULT_ALIGN_MODULES);
        assert_eq!(align.resources, Resources::default());

        let consensus = config.consensus_settings().unwrap();
        assert_eq!(consensus.genome, "hg19");
        assert_eq!(consensus.cutoff, 0.7);
        assert_eq!(consensus.layout, OutputLayout::Flat);
        assert!(consensus.discard_archived);
        assert_eq!(consensus.cytoband, None);
    }

    #[test]
    fn toml_values_and_overrides() {
        let contents = r#"
[align]
bwa_ref = "/ref/hg38.fa"
threads = 4
timeout_hours = 12.5

[consensus]
genome = "hg38"
cutoff = 0.8
layout = "nested"
discard_archived = false
memory_gb = 32
"#;
        let mut config = ConfigTOML::parse(contents).unwrap();

        let align = config.align_settings().unwrap();
        assert_eq!(align.bwa_ref, Some(PathBuf::from("/ref/hg38.fa")));
        assert_eq!(align.resources.threads, 4);
        assert_eq!(align.resources.timeout_hours, 12.5);

        let consensus = config.consensus_settings().unwrap();
        assert_eq!(consensus.genome, "hg38");
        assert_eq!(consensus.cutoff, 0.8);
        assert_eq!(consensus.layout, OutputLayout::Nested);
        assert!(!consensus.discard_archived);
        assert_eq!(consensus.resources.memory_gb, 32);
        assert_eq!(consensus.resources.threads, DEFAULT_THREADS);

        let overrides = Overrides {
            cutoff: Some("0.9".to_string()),
            threads: Some("2".to_string()),
            layout: Some("flat".to_string()),
            cytoband: Some("cytoBand.txt".to_string()),
            ..Overrides::default()
        };
        overrides.apply(&mut config).unwrap();

        let align = config.align_settings().unwrap();
        assert_eq!(align.resources.threads, 2);
        let consensus = config.consensus_settings().unwrap();
        assert_eq!(consensus.cutoff, 0.9);
        assert_eq!(consensus.layout, OutputLayout::Flat);
        assert_eq!(consensus.resources.threads, 2);
        assert_eq!(consensus.cytoband, Some(PathBuf::from("cytoBand.txt")));
    }

    #[test]
    fn rejects_bad_values() {
        let config = ConfigTOML::parse("[consensus]\ncutoff = 1.5\n").unwrap();
        assert!(config.consensus_settings().is_err());

        let config = ConfigTOML::parse("[align]\nthreads = 0\n").unwrap();
        assert!(config.align_settings().is_err());

        for timeout in &["-1.0", "nan", "inf", "1e300"] {
            let text = format!("[consensus]\ntimeout_hours = {}\n", timeout);
            let config = ConfigTOML::parse(&text).unwrap();
            assert!(config.consensus_settings().is_err(), "timeout_hours = {}", timeout);
        }
        assert!(Resources::new(None, None, Some(std::f64::INFINITY)).is_err());

        let mut config = ConfigTOML::default();
        let overrides = Overrides {
            threads: Some("many".to_string()),
            ..Overrides::default()
        };
        assert!(overrides.apply(&mut config).is_err());
    }

    #[test]
    fn zero_timeout_is_unlimited() {
        let res = Resources::new(None, None, Some(0.0)).unwrap();
        assert_eq!(res.timeout(), None);
        let res = Resources::new(None, None, Some(0.5)).unwrap();
        assert_eq!(res.timeout(), Some(Duration::from_secs(1800)));
    }
}
