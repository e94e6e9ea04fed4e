extern crate cc_workflow;
extern crate clap;
extern crate env_logger;

use std::io::Write;

use clap::{App, Arg};
use env_logger::Env;

use cc_workflow::consensus::CLI;
use cc_workflow::config::Overrides;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("cc-consensus")
        .version("1.0")
        .about("Call consensus sequences from a sorted alignment")
        .arg(
            Arg::with_name("bam")
                .long("bam")
                .value_name("SORTED.BAM")
                .help("Coordinate-sorted, indexed BAM")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("bai")
                .long("bai")
                .value_name("SORTED.BAM.BAI")
                .help("BAM index (default: BAM path with .bai appended)")
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
                .help("Consensus caller threads, overrides the config")
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
        bam: matches.value_of("bam").unwrap().to_string(),
        bai: matches.value_of("bai").map(String::from),
        output_prefix: matches.value_of("prefix").unwrap().to_string(),
        workdir: matches.value_of("workdir").unwrap().to_string(),
        config_file: matches.value_of("config").map(String::from),
        overrides: Overrides {
            cytoband: matches.value_of("cytoband").map(String::from),
            genome: matches.value_of("genome").map(String::from),
            cutoff: matches.value_of("cutoff").map(String::from),
            threads: matches.value_of("threads").map(String::from),
            layout: matches.value_of("layout").map(String::from),
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
