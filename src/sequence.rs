//! Nucleotide helpers shared by primer extraction, orientation and trimming.

/// Uppercase and lowercase IUPAC nucleotide codes accepted in primer patterns.
pub const IUPAC_BASES: &[u8] = b"ACGTURYSWKMBDHVNacgturyswkmbdhvn";

/// Complement a single base, keeping its case. IUPAC ambiguity codes map to
/// their complementary class (R<->Y, K<->M, B<->V, D<->H; S, W and N are
/// self-complementary). Anything else passes through untouched.
pub fn complement(base: u8) -> u8 {
    match base {
        b'A' => b'T',
        b'T' | b'U' => b'A',
        b'C' => b'G',
        b'G' => b'C',
        b'R' => b'Y',
        b'Y' => b'R',
        b'K' => b'M',
        b'M' => b'K',
        b'B' => b'V',
        b'V' => b'B',
        b'D' => b'H',
        b'H' => b'D',
        b'a' => b't',
        b't' | b'u' => b'a',
        b'c' => b'g',
        b'g' => b'c',
        b'r' => b'y',
        b'y' => b'r',
        b'k' => b'm',
        b'm' => b'k',
        b'b' => b'v',
        b'v' => b'b',
        b'd' => b'h',
        b'h' => b'd',
        other => other,
    }
}

/// Reverse complement a DNA sequence, handling IUPAC ambiguity codes.
///
/// ```
/// use oneroof_amplicons::sequence::reverse_complement;
/// assert_eq!(reverse_complement(b"ATCG"), b"CGAT");
/// assert_eq!(reverse_complement(b"AcGt"), b"aCgT");
/// ```
pub fn reverse_complement(seq: &[u8]) -> Vec<u8> {
    seq.iter().rev().map(|&b| complement(b)).collect()
}

/// Returns the first byte that is not an IUPAC nucleotide code, if any.
pub fn first_invalid_base(seq: &[u8]) -> Option<u8> {
    seq.iter().copied().find(|b| !IUPAC_BASES.contains(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reverse_complement_standard_bases() {
        assert_eq!(reverse_complement(b"ACGT"), b"ACGT");
        assert_eq!(reverse_complement(b"AAAA"), b"TTTT");
        assert_eq!(reverse_complement(b"ATCG"), b"CGAT");
        assert_eq!(reverse_complement(b"ANTN"), b"NANT");
    }

    #[test]
    fn test_reverse_complement_iupac() {
        assert_eq!(reverse_complement(b"RYKM"), b"KMRY");
        assert_eq!(reverse_complement(b"SW"), b"WS");
        assert_eq!(reverse_complement(b"BDHV"), b"BDHV");
        assert_eq!(reverse_complement(b"bdhv"), b"bdhv");
    }

    #[test]
    fn test_reverse_complement_is_involution() {
        let seq = b"ACGTTGCANRYKMSWBDHVacgt";
        assert_eq!(reverse_complement(&reverse_complement(seq)), seq.to_vec());
    }

    #[test]
    fn test_first_invalid_base() {
        assert_eq!(first_invalid_base(b"ACGTNRY"), None);
        assert_eq!(first_invalid_base(b"ACG1T"), Some(b'1'));
    }
}
