use std::fmt;
use std::str::FromStr;

use getset::{CopyGetters, Getters};

use crate::parser;
use crate::parser::ParseError;

/// A genomic position or range: contig plus a half-open interbase interval.
///
/// Two textual forms are accepted: `contig:start[-end]` with 1-based
/// inclusive endpoints, and `contig/start[-end]` with interbase coordinates.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Getters, CopyGetters)]
pub struct Locus {
    #[getset(get = "pub")]
    contig: String,
    #[getset(get_copy = "pub")]
    interbase_start: u64,
    #[getset(get_copy = "pub")]
    interbase_end: u64,
}

impl Locus {
    pub fn interbase(contig: &str, interbase_start: u64, interbase_end: u64) -> Self {
        Locus {
            contig: contig.to_owned(),
            interbase_start,
            interbase_end,
        }
    }

    pub fn parse(input: &str) -> Result<Self, ParseError> {
        parser::parse_locus(input)
    }

    /// Overlap against an interbase interval on a contig, ignoring any
    /// `chr` prefix on either side.
    pub fn overlaps(&self, contig: &str, interbase_start: u64, interbase_end: u64) -> bool {
        same_contig(&self.contig, contig)
            && interbase_start < self.interbase_end
            && self.interbase_start < interbase_end
    }
}

impl fmt::Display for Locus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}-{}",
            self.contig, self.interbase_start, self.interbase_end
        )
    }
}

impl FromStr for Locus {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Locus::parse(s)
    }
}

/// Contig names compare equal regardless of a `chr` prefix.
pub fn same_contig(a: &str, b: &str) -> bool {
    normalize_contig(a) == normalize_contig(b)
}

pub fn normalize_contig(contig: &str) -> &str {
    contig.strip_prefix("chr").unwrap_or(contig)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_overlap() {
        let locus = Locus::parse("chr22:46930257").unwrap();
        assert!(locus.overlaps("22", 46930250, 46930260));
        assert!(locus.overlaps("chr22", 46930256, 46930257));
        // end-exclusive: an interval ending at the locus start does not overlap
        assert!(!locus.overlaps("22", 46930250, 46930256));
        assert!(!locus.overlaps("21", 46930250, 46930260));
    }

    #[test]
    fn test_contig_normalization() {
        assert!(same_contig("chr22", "22"));
        assert!(same_contig("22", "22"));
        assert!(!same_contig("chr22", "chr21"));
    }

    #[test]
    fn test_display_round_trip() {
        let locus = Locus::parse("22/100-200").unwrap();
        assert_eq!(Locus::parse(&locus.to_string()).unwrap(), locus);
    }
}
