extern crate cc_workflow;
extern crate clap;
extern crate env_logger;

use std::io::Write;

use clap::{App, Arg};
use env_logger::Env;

use cc_workflow::flagstat::CLI;

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new("cc-flagstat")
        .version("1.0")
        .about("Count BAM records by flag category")
        .arg(
            Arg::with_name("input")
                .short("i")
                .long("input")
                .value_name("INPUT.BAM")
                .help("BAM file, or - for standard input")
                .takes_value(true)
                .required(true),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .value_name("FLAGSTAT.TXT")
                .help("Report file (default: standard output)")
                .takes_value(true)
                .required(false),
        )
        .get_matches();

    let cli = CLI {
        input_bam: matches.value_of("input").unwrap().to_string(),
        output: matches.value_of("output").map(String::from),
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
