use anyhow::{bail, Result};
use rust_htslib::bam::record::Cigar;

/// One element of an MD tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MdOp {
    Match(u32),
    Mismatch(u8),
    Deletion(Vec<u8>),
}

pub fn parse_md(md: &[u8]) -> Result<Vec<MdOp>> {
    let mut ops = Vec::new();
    let mut i = 0;

    while i < md.len() {
        let ch = md[i];
        if ch.is_ascii_digit() {
            let mut n: u32 = 0;
            while i < md.len() && md[i].is_ascii_digit() {
                n = n * 10 + u32::from(md[i] - b'0');
                i += 1;
            }
            if n > 0 {
                ops.push(MdOp::Match(n));
            }
        } else if ch == b'^' {
            i += 1;
            let start = i;
            while i < md.len() && md[i].is_ascii_alphabetic() {
                i += 1;
            }
            if i == start {
                bail!("empty deletion in MD tag {:?}", String::from_utf8_lossy(md));
            }
            ops.push(MdOp::Deletion(md[start..i].to_vec()));
        } else if ch.is_ascii_alphabetic() {
            ops.push(MdOp::Mismatch(ch));
            i += 1;
        } else {
            bail!("bad character {:?} in MD tag {:?}", ch as char, String::from_utf8_lossy(md));
        }
    }

    Ok(ops)
}

/// Offsets of mismatched bases counted over aligned (M/=/X) bases only.
fn mismatch_offsets(ops: &[MdOp]) -> Vec<usize> {
    let mut offsets = Vec::new();
    let mut aligned = 0;
    for op in ops.iter() {
        match op {
            MdOp::Match(n) => aligned += *n as usize,
            MdOp::Mismatch(_) => {
                offsets.push(aligned);
                aligned += 1;
            }
            MdOp::Deletion(_) => (),
        }
    }
    offsets
}

/// 0-based positions, within the aligned part of the read (soft clips
/// excluded), of substituted and inserted bases. Deletions have no read
/// position and are skipped.
pub fn mismatch_positions(cigar: &[Cigar], md: &[u8]) -> Result<Vec<usize>> {
    let offsets = mismatch_offsets(&parse_md(md)?);
    let mut next_offset = offsets.iter().peekable();

    let mut positions = Vec::new();
    let mut query = 0;
    let mut aligned = 0;

    for op in cigar.iter() {
        match op {
            Cigar::Match(len) | Cigar::Equal(len) | Cigar::Diff(len) => {
                let end = aligned + *len as usize;
                while let Some(&&off) = next_offset.peek() {
                    if off >= end {
                        break;
                    }
                    positions.push(query + off - aligned);
                    next_offset.next();
                }
                aligned = end;
                query += *len as usize;
            }
            Cigar::Ins(len) => {
                positions.extend(query..(query + *len as usize));
                query += *len as usize;
            }
            Cigar::Del(_) | Cigar::RefSkip(_) | Cigar::SoftClip(_) | Cigar::HardClip(_) | Cigar::Pad(_) => (),
        }
    }

    if next_offset.peek().is_some() {
        bail!(
            "MD tag {:?} has mismatches beyond the {} aligned bases",
            String::from_utf8_lossy(md),
            aligned
        );
    }

    Ok(positions)
}

/// Range of read positions covered by the alignment, that is, the whole
/// read less any leading and trailing soft clip. Hard-clipped bases are
/// not part of the stored sequence and so do not shift it.
pub fn aligned_bounds(cigar: &[Cigar], read_len: usize) -> (usize, usize) {
    let start = match cigar.first() {
        Some(Cigar::SoftClip(len)) => *len as usize,
        _ => 0,
    };
    let trailing = match cigar.last() {
        Some(Cigar::SoftClip(len)) if cigar.len() > 1 => *len as usize,
        _ => 0,
    };
    (start.min(read_len), read_len.saturating_sub(trailing).max(start.min(read_len)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_htslib::bam::record::Cigar::*;

    #[test]
    fn md_tokens() {
        assert_eq!(
            parse_md(b"19^A8G0T70").unwrap(),
            vec![
                MdOp::Match(19),
                MdOp::Deletion(b"A".to_vec()),
                MdOp::Match(8),
                MdOp::Mismatch(b'G'),
                MdOp::Mismatch(b'T'),
                MdOp::Match(70),
            ]
        );
        assert!(parse_md(b"10^").is_err());
        assert!(parse_md(b"10*5").is_err());
    }

    #[test]
    fn substitutions() {
        assert_eq!(
            mismatch_positions(&[Match(98)], b"31A0T22T41G").unwrap(),
            vec![31, 32, 55, 97]
        );
        assert_eq!(mismatch_positions(&[Match(98)], b"31A0T22T42").unwrap(), vec![31, 32, 55]);
        assert_eq!(mismatch_positions(&[Match(98)], b"G30A0T65").unwrap(), vec![0, 31, 32]);
    }

    #[test]
    fn deletions_have_no_position() {
        assert_eq!(
            mismatch_positions(&[Match(19), Del(1), Match(79)], b"19^A8G70").unwrap(),
            vec![27]
        );
        assert_eq!(
            mismatch_positions(&[Match(19), Del(1), Match(54), SoftClip(25)], b"19^A8G5T10T8C0T12T5").unwrap(),
            vec![27, 33, 44, 53, 54, 67]
        );
    }

    #[test]
    fn insertions_shift_later_positions() {
        // substitution 94 aligned bases in lands one read base later
        assert_eq!(
            mismatch_positions(&[Match(28), Ins(1), Match(69)], b"19T74G2").unwrap(),
            vec![19, 28, 95]
        );
        assert_eq!(
            mismatch_positions(&[Match(74), Del(2), Match(3), Ins(2), Match(19)], b"70T1A1^GC22").unwrap(),
            vec![70, 72, 77, 78]
        );
    }

    #[test]
    fn clipping() {
        assert_eq!(mismatch_positions(&[HardClip(65), Match(33)], b"31A1").unwrap(), vec![31]);
        assert_eq!(mismatch_positions(&[Match(37), HardClip(61)], b"37").unwrap(), Vec::<usize>::new());
        assert_eq!(mismatch_positions(&[SoftClip(5), Match(10)], b"2C7").unwrap(), vec![2]);
        assert!(mismatch_positions(&[Match(10)], b"12A1").is_err());
    }

    #[test]
    fn bounds() {
        assert_eq!(aligned_bounds(&[SoftClip(73), Match(20), SoftClip(5)], 98), (73, 93));
        assert_eq!(aligned_bounds(&[SoftClip(6), Match(92)], 98), (6, 98));
        assert_eq!(aligned_bounds(&[Match(23), SoftClip(75)], 98), (0, 23));
        assert_eq!(aligned_bounds(&[Match(37), HardClip(61)], 37), (0, 37));
    }
}
