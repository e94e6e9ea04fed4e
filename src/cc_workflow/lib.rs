extern crate bio;
extern crate rust_htslib;

pub mod align;
pub mod archive;
pub mod artifact;
pub mod command;
pub mod config;
pub mod consensus;
pub mod cytoband;
pub mod errors;
pub mod family;
pub mod family_stats;
pub mod flagstat;
pub mod mismatch;
pub mod molecular_consensus;
pub mod sscs;
pub mod workdir;
pub mod workflow;

#[cfg(test)]
mod test_tools;
