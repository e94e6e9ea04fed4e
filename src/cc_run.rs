extern crate cc_workflow;
extern crate clap;
extern crate env_logger;

use std::io::Write;

use clap::{App, Arg};
use env_logger::Env;

use cc_workflow::config::Overrides;
use cc_workflow::workflow::CLI;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("cc-run")
        .version("1.0")
        .about("Align paired reads and call duplex consensus sequences")
        .arg(
            Arg::with_name("fastq1")
                .long("fastq1")
                .value_name("R1.FASTQ.GZ")
                .help("Read 1 FASTQ")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("fastq2")
                .long("fastq2")
                .value_name("R2.FASTQ.GZ")
                .help("Read 2 FASTQ")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("bam")
                .long("bam")
                .value_name("SORTED.BAM")
                .help("Pre-aligned, coordinate-sorted BAM (skips alignment)")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("bai")
                .long("bai")
                .value_name("SORTED.BAM.BAI")
                .help("Index of the pre-aligned BAM")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("prefix")
                .short("p")
                .long("prefix")
                .value_name("PREFIX")
                .help("Output prefix")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("workdir")
                .short("w")
                .long("workdir")
                .value_name("DIR")
                .help("Working directory for all outputs")
                .takes_value(true)
                .default_value("."),
        )
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("CONFIG.TOML")
                .help("Tool paths and resources")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("bwaref")
                .long("bwa-ref")
                .value_name("REF.FA")
                .help("BWA reference, overrides the config")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("cytoband")
                .long("cytoband")
                .value_name("CYTOBAND.TXT")
                .help("Cytoband table, overrides the config")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("genome")
                .long("genome")
                .value_name("BUILD")
                .help("Genome build, overrides the config")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("cutoff")
                .long("cutoff")
                .value_name("FRACTION")
                .help("Consensus cutoff, overrides the config")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .value_name("N")
                .help("Threads for both stages, overrides the config")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("layout")
                .long("layout")
                .value_name("flat|nested")
                .help("Consensus output layout, overrides the config")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("dryrun")
                .long("dry-run")
                .help("Print the commands without running them"),
        )
        .get_matches();

    let cli = CLI {
        fastq_r1: matches.value_of("fastq1").map(String::from),
        fastq_r2: matches.value_of("fastq2").map(String::from),
        bam: matches.value_of("bam").map(String::from),
        bai: matches.value_of("bai").map(String::from),
        output_prefix: matches.value_of("prefix").unwrap().to_string(),
        workdir: matches.value_of("workdir").unwrap().to_string(),
        config_file: matches.value_of("config").map(String::from),
        overrides: Overrides {
            bwa_ref: matches.value_of("bwaref").map(String::from),
            cytoband: matches.value_of("cytoband").map(String::from),
            genome: matches.value_of("genome").map(String::from),
            cutoff: matches.value_of("cutoff").map(String::from),
            threads: matches.value_of("threads").map(String::from),
            layout: matches.value_of("layout").map(String::from),
        },
        dry_run: matches.is_present("dryrun"),
    };

    match cli.run() {
        Ok(_) => (),
        Err(err) => {
            std::io::stderr()
                .write(format!("{:?}\n", err).as_bytes())
                .unwrap();
            std::process::exit(1);
        }
    }
}
