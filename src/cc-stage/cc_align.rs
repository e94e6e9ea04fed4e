extern crate cc_workflow;
extern crate clap;
extern crate env_logger;

use std::io::Write;

use clap::{App, Arg};
use env_logger::Env;

use cc_workflow::align::CLI;
use cc_workflow::config::Overrides;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("cc-align")
        .version("1.0")
        .about("Align paired reads into a sorted, indexed BAM")
        .arg(
            Arg::with_name("fastq1")
                .long("fastq1")
                .value_name("R1.FASTQ.GZ")
                .help("Read 1 FASTQ")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("fastq2")
                .long("fastq2")
                .value_name("R2.FASTQ.GZ")
                .help("Read 2 FASTQ")
                .takes_value(true)
                .required(true),
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
            Arg::with_name("threads")
                .short("t")
                .long("threads")
                .value_name("N")
                .help("Aligner threads, overrides the config")
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
        fastq_r1: matches.value_of("fastq1").unwrap().to_string(),
        fastq_r2: matches.value_of("fastq2").unwrap().to_string(),
        output_prefix: matches.value_of("prefix").unwrap().to_string(),
        workdir: matches.value_of("workdir").unwrap().to_string(),
        config_file: matches.value_of("config").map(String::from),
        overrides: Overrides {
            bwa_ref: matches.value_of("bwaref").map(String::from),
            threads: matches.value_of("threads").map(String::from),
            ..Overrides::default()
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
