extern crate cc_workflow;
#[macro_use]
extern crate clap;
extern crate env_logger;

use std::io::Write;

use clap::{App, Arg};
use env_logger::Env;

use cc_workflow::sscs::CLI;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("cc-sscs")
        .version("1.0")
        .about("Collapse single-strand read families into consensus reads")
        .arg(
            Arg::with_name("input")
                .short("i")
                .long("infile")
                .value_name("SORTED.BAM")
                .help("Coordinate-sorted, indexed BAM with barcodes in read names")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("outfile")
                .value_name("OUT.SSCS.BAM")
                .help("Consensus BAM; other outputs are named from it")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("cytoband")
                .short("b")
                .long("bedfile")
                .value_name("CYTOBAND.TXT")
                .help("Cytoband table splitting contigs into regions")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("cutoff")
                .short("c")
                .long("cutoff")
                .value_name("FRACTION")
                .help("Share of reads needed to call a base")
                .takes_value(true)
                .default_value("0.7"),
        )
        .arg(
            Arg::with_name("ncutoff")
                .long("Ncutoff")
                .value_name("FRACTION")
                .help("Largest N fraction kept in a consensus read")
                .takes_value(true)
                .default_value("0.3"),
        )
        .get_matches();

    let cli = CLI {
        input_bam: matches.value_of("input").unwrap().to_string(),
        outfile: matches.value_of("output").unwrap().to_string(),
        cytoband: matches.value_of("cytoband").unwrap().to_string(),
        cutoff: value_t!(matches.value_of("cutoff"), f64).unwrap_or_else(|e| e.exit()),
        n_cutoff: value_t!(matches.value_of("ncutoff"), f64).unwrap_or_else(|e| e.exit()),
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
