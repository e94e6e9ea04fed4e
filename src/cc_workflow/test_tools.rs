//! Stand-in for the consensus caller script in tests. It answers both
//! `fastq2bam` and `consensus`, writes the files the real tool would,
//! and appends each call to `calls.log` beside itself.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerBehavior {
    Complete,
    NoSscs,
    Fail,
}

const SCRIPT: &str = r#"#!/bin/sh
set -e
log="$(dirname "$0")/calls.log"
echo "$@" >> "$log"
mode="$1"
shift
case "$mode" in
fastq2bam)
    while [ $# -gt 0 ]; do
        case "$1" in
            --output) out="$2"; shift 2 ;;
            --name) name="$2"; shift 2 ;;
            --skipcheck) shift ;;
            *) shift 2 ;;
        esac
    done
    mkdir -p "$out/bamfiles"
    printf 'aligned' > "$out/bamfiles/$name.sorted.bam"
    printf 'index' > "$out/bamfiles/$name.sorted.bam.bai"
    ;;
consensus)
    while [ $# -gt 0 ]; do
        case "$1" in
            -i) bam="$2"; shift 2 ;;
            -o) out="$2"; shift 2 ;;
            *) shift 2 ;;
        esac
    done
    echo "consumed $(cat "$bam")" >> "$log"
    name=$(basename "$bam" .bam)
    d="$out/$name"
    mkdir -p "$d/dcs_sc" "$d/sscs_sc" "$d/sscs" "$d/stats"
    for f in "dcs_sc/$name.dcs.sc.sorted.bam" "dcs_sc/$name.all.unique.dcs.sorted.bam" "sscs_sc/$name.sscs.sc.sorted.bam"; do
        echo bam > "$d/$f"
        echo bai > "$d/$f.bai"
    done
    echo sscs > "$d/sscs/$name.sscs.bam"
    echo "Total reads: 10" > "$d/stats/$name.stats.txt"
    __MISSING__
    ;;
esac
__FAIL__
"#;

/// Writes the fake caller to `<dir>/ConsensusCruncher.py` and returns
/// its path.
#[cfg(unix)]
pub fn fake_caller(dir: &Path, behavior: CallerBehavior) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let missing = match behavior {
        CallerBehavior::NoSscs => r#"rm -f "$d/sscs_sc/$name.sscs.sc.sorted.bam""#,
        _ => "",
    };
    let fail = match behavior {
        CallerBehavior::Fail => "echo \"$mode: reference index not found\" >&2\nexit 2",
        _ => "",
    };
    let script = SCRIPT
        .replace("__MISSING__", missing)
        .replace("__FAIL__", fail);

    fs::create_dir_all(dir).unwrap();
    let path = dir.join("ConsensusCruncher.py");
    fs::write(&path, script).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Sorted test alignment: `(qname, flags, tid, pos, mtid, mpos, seq, md)`
/// with every read fully matched at quality 40.
pub type TestRead<'a> = (&'a str, u16, i32, i64, i32, i64, &'a str, Option<&'a str>);

pub fn test_record(read: &TestRead) -> rust_htslib::bam::Record {
    use rust_htslib::bam::record::{Aux, Cigar, CigarString, Record};

    let &(qname, flags, tid, pos, mtid, mpos, seq, md) = read;
    let seq = seq.as_bytes();
    let mut rec = Record::new();
    let cigar = CigarString(vec![Cigar::Match(seq.len() as u32)]);
    rec.set(qname.as_bytes(), Some(&cigar), seq, &vec![40; seq.len()]);
    rec.set_flags(flags);
    rec.set_tid(tid);
    rec.set_pos(pos);
    rec.set_mtid(mtid);
    rec.set_mpos(mpos);
    rec.set_mapq(60);
    if let Some(md) = md {
        rec.push_aux(b"MD", Aux::String(md)).unwrap();
    }
    rec
}

/// Writes `reads` to an indexed BAM with the given SAM header text.
pub fn write_indexed_bam(path: &Path, header: &str, reads: &[TestRead]) {
    use rust_htslib::bam;

    let view = bam::HeaderView::from_bytes(header.as_bytes());
    {
        let mut writer = bam::Writer::from_path(path, &bam::Header::from_template(&view), bam::Format::Bam).unwrap();
        for read in reads.iter() {
            writer.write(&test_record(read)).unwrap();
        }
    }
    bam::index::build(path, None, bam::index::Type::Bai, 1).unwrap();
}
