use std::fmt;

use anyhow::Result;
use rust_htslib::bam;

use crate::errors::WorkflowError;

/// Flags of pairs with an unmapped or oddly placed mate. Such reads
/// cannot be grouped and are skipped.
pub const BAD_FLAGS: [u16; 14] = [73, 133, 89, 121, 165, 181, 101, 117, 153, 185, 69, 137, 77, 141];

/// Each flag and the flag its mate carries.
pub const FLAG_PAIRINGS: [(u16, u16); 8] = [
    (99, 147),
    (83, 163),
    // right insert size, wrong orientation
    (67, 131),
    (115, 179),
    // unexpected insert size
    (81, 161),
    (97, 145),
    // both
    (65, 129),
    (113, 177),
];

pub fn mate_flag(flag: u16) -> Option<u16> {
    FLAG_PAIRINGS.iter().find_map(|&(a, b)| {
        if a == flag {
            Some(b)
        } else if b == flag {
            Some(a)
        } else {
            None
        }
    })
}

/// Molecular barcode: the second `|`-separated field of the read name.
pub fn barcode(qname: &[u8]) -> Result<&[u8]> {
    qname
        .split(|&ch| ch == b'|')
        .nth(1)
        .filter(|bc| !bc.is_empty())
        .ok_or_else(|| WorkflowError::NoBarcode(qname.to_vec()).into())
}

/// Identity shared by every read of one single-strand family: barcode,
/// read and mate coordinates, strand, and read number.
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FamilyTag {
    pub barcode: String,
    pub tid: i32,
    pub pos: i64,
    pub mtid: i32,
    pub mpos: i64,
    pub reverse: bool,
    pub read1: bool,
}

impl FamilyTag {
    pub fn new(r: &bam::Record) -> Result<Self> {
        Ok(FamilyTag {
            barcode: String::from_utf8_lossy(barcode(r.qname())?).into_owned(),
            tid: r.tid(),
            pos: r.pos(),
            mtid: r.mtid(),
            mpos: r.mpos(),
            reverse: r.is_reverse(),
            read1: !r.is_last_in_template(),
        })
    }

    pub fn strand(&self) -> &'static str {
        if self.reverse {
            "rev"
        } else {
            "fwd"
        }
    }

    pub fn read_number(&self) -> &'static str {
        if self.read1 {
            "R1"
        } else {
            "R2"
        }
    }

    /// Name shared by the two mates' families. Coordinates are ordered
    /// lower to higher, `pos`/`neg` records which strand the fragment
    /// came from, and the pair of flags is appended. `None` for a flag
    /// outside the pairing table.
    pub fn pair_key(&self, flag: u16) -> Option<String> {
        let mate = mate_flag(flag)?;

        let swapped = (self.tid, self.pos) > (self.mtid, self.mpos);
        let (low, high) = if swapped {
            ((self.mtid, self.mpos), (self.tid, self.pos))
        } else {
            ((self.tid, self.pos), (self.mtid, self.mpos))
        };

        let positive = if swapped {
            !self.read1
        } else if (self.tid, self.pos) == (self.mtid, self.mpos) && (flag == 83 || flag == 163) {
            false
        } else if (self.tid, self.pos) == (self.mtid, self.mpos) && (flag == 99 || flag == 147) {
            true
        } else {
            self.read1
        };

        Some(format!(
            "{}_{}_{}_{}_{}_{}_{}_{}",
            self.barcode,
            low.0,
            low.1,
            high.0,
            high.1,
            if positive { "pos" } else { "neg" },
            flag.min(mate),
            flag.max(mate)
        ))
    }
}

impl fmt::Display for FamilyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}_{}_{}_{}",
            self.barcode,
            self.tid,
            self.pos,
            self.mtid,
            self.mpos,
            self.strand(),
            self.read_number()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(bc: &str, tid: i32, pos: i64, mtid: i32, mpos: i64, reverse: bool, read1: bool) -> FamilyTag {
        FamilyTag {
            barcode: bc.to_string(),
            tid: tid,
            pos: pos,
            mtid: mtid,
            mpos: mpos,
            reverse: reverse,
            read1: read1,
        }
    }

    #[test]
    fn barcodes() {
        assert_eq!(barcode(b"HWI-D00:8:C5|CCCC.TTGA|1").unwrap(), b"CCCC.TTGA");
        assert_eq!(barcode(b"read7|ACGT").unwrap(), b"ACGT");
        assert!(barcode(b"read7").is_err());
        assert!(barcode(b"read7||x").is_err());
    }

    #[test]
    fn pairings() {
        assert_eq!(mate_flag(99), Some(147));
        assert_eq!(mate_flag(147), Some(99));
        assert_eq!(mate_flag(177), Some(113));
        assert_eq!(mate_flag(73), None);
        assert_eq!(mate_flag(1171), None);
    }

    #[test]
    fn tag_text() {
        let t = tag("CCCC", 12, 25398064, 12, 25398156, false, true);
        assert_eq!(t.to_string(), "CCCC_12_25398064_12_25398156_fwd_R1");
    }

    #[test]
    fn proper_pairs_share_a_key() {
        let pos = "CCCC_12_25398064_12_25398156_pos_99_147";
        assert_eq!(tag("CCCC", 12, 25398064, 12, 25398156, false, true).pair_key(99).unwrap(), pos);
        assert_eq!(tag("CCCC", 12, 25398156, 12, 25398064, true, false).pair_key(147).unwrap(), pos);

        let neg = "CCCC_12_25398064_12_25398156_neg_83_163";
        assert_eq!(tag("CCCC", 12, 25398156, 12, 25398064, true, true).pair_key(83).unwrap(), neg);
        assert_eq!(tag("CCCC", 12, 25398064, 12, 25398156, false, false).pair_key(163).unwrap(), neg);
    }

    #[test]
    fn translocations_order_by_chromosome() {
        let key = "TGGT_1_21842527_13_72956752_pos_113_177";
        assert_eq!(tag("TGGT", 1, 21842527, 13, 72956752, true, true).pair_key(113).unwrap(), key);
        assert_eq!(tag("TGGT", 13, 72956752, 1, 21842527, true, false).pair_key(177).unwrap(), key);

        let key = "TTCA_0_2364_10_135461271_pos_65_129";
        assert_eq!(tag("TTCA", 0, 2364, 10, 135461271, false, true).pair_key(65).unwrap(), key);
        assert_eq!(tag("TTCA", 10, 135461271, 0, 2364, false, false).pair_key(129).unwrap(), key);
    }

    #[test]
    fn same_start_uses_flag_for_strand() {
        let t = tag("AAAA", 1, 500, 1, 500, false, true);
        assert_eq!(t.pair_key(99).unwrap(), "AAAA_1_500_1_500_pos_99_147");
        let t = tag("AAAA", 1, 500, 1, 500, true, true);
        assert_eq!(t.pair_key(83).unwrap(), "AAAA_1_500_1_500_neg_83_163");
        assert_eq!(t.pair_key(73), None);
    }
}
