use getset::Getters;

use crate::record::Record;
use crate::types::{Metadata, Value};

/// A variant call with normalized alleles.
///
/// Shared flanking bases of ref/alt are trimmed at construction (trailing
/// first, then leading, advancing the start) so that indel coordinates are
/// stable regardless of how the caller padded them.
#[derive(Debug, Clone, PartialEq, Getters)]
#[getset(get = "pub")]
pub struct Variant {
    contig: String,
    /// 1-based inclusive position of the first affected base; read through
    /// the `Record` trait.
    #[getset(skip)]
    inclusive_start: u64,
    ref_allele: String,
    alt_allele: String,
    id: Option<String>,
    qual: Option<f64>,
    filters: Vec<String>,
    info: Metadata,
}

impl Variant {
    pub fn new(contig: &str, inclusive_start: u64, ref_allele: &str, alt_allele: &str) -> Self {
        Self::with_details(
            contig,
            inclusive_start,
            ref_allele,
            alt_allele,
            None,
            None,
            vec![],
            Metadata::new(),
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub fn with_details(
        contig: &str,
        inclusive_start: u64,
        ref_allele: &str,
        alt_allele: &str,
        id: Option<String>,
        qual: Option<f64>,
        filters: Vec<String>,
        info: Metadata,
    ) -> Self {
        let (inclusive_start, ref_allele, alt_allele) =
            trim_shared_flanks(inclusive_start, ref_allele, alt_allele);
        Variant {
            contig: contig.to_owned(),
            inclusive_start,
            ref_allele,
            alt_allele,
            id,
            qual,
            filters,
            info,
        }
    }

    /// Unfiltered or explicitly passing.
    pub fn is_passing(&self) -> bool {
        self.filters.is_empty() || self.filters.iter().all(|f| f == "PASS")
    }
}

fn trim_shared_flanks(start: u64, ref_allele: &str, alt_allele: &str) -> (u64, String, String) {
    let mut r = ref_allele.as_bytes();
    let mut a = alt_allele.as_bytes();
    while r.len() > 1 && a.len() > 1 && r.last() == a.last() {
        r = &r[..r.len() - 1];
        a = &a[..a.len() - 1];
    }
    let mut start = start;
    while !r.is_empty() && !a.is_empty() && r[0] == a[0] && (r.len() > 1 || a.len() > 1) {
        r = &r[1..];
        a = &a[1..];
        start += 1;
    }
    (
        start,
        String::from_utf8_lossy(r).into_owned(),
        String::from_utf8_lossy(a).into_owned(),
    )
}

impl Record for Variant {
    fn contig(&self) -> &str {
        &self.contig
    }

    fn inclusive_start(&self) -> u64 {
        self.inclusive_start
    }

    fn inclusive_end(&self) -> u64 {
        // an insertion (empty ref) spans no reference bases
        self.inclusive_start - 1 + self.ref_allele.len() as u64
    }

    fn reserved_name(&self) -> &'static str {
        "variant"
    }

    fn attributes(&self) -> Metadata {
        let mut attributes = Metadata::new();
        attributes.insert("contig".into(), Value::from(self.contig.as_str()));
        attributes.insert("ref".into(), Value::from(self.ref_allele.as_str()));
        attributes.insert("alt".into(), Value::from(self.alt_allele.as_str()));
        attributes.insert("id".into(), Value::from(self.id.clone()));
        attributes.insert("qual".into(), Value::from(self.qual));
        attributes.insert(
            "filter".into(),
            Value::List(self.filters.iter().map(|f| Value::from(f.as_str())).collect()),
        );
        attributes.insert("info".into(), Value::Map(self.info.clone()));
        attributes
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_snv_coordinates() {
        let v = Variant::new("22", 46931060, "A", "C");
        assert_eq!(v.inclusive_start(), 46931060);
        assert_eq!(v.inclusive_end(), 46931060);
        assert_eq!(v.interbase_start(), 46931059);
        assert_eq!(v.interbase_end(), 46931060);
    }

    #[test]
    fn test_deletion_normalization() {
        // VCF-style padded deletion: AC -> A at 100 is a deletion of C at 101
        let v = Variant::new("1", 100, "AC", "A");
        assert_eq!(v.ref_allele(), "C");
        assert_eq!(v.alt_allele(), "");
        assert_eq!(v.inclusive_start(), 101);
        assert_eq!(v.interbase_start(), 100);
        assert_eq!(v.interbase_end(), 101);
    }

    #[test]
    fn test_insertion_normalization() {
        // A -> AT at 100 inserts T after base 100: empty reference span
        let v = Variant::new("1", 100, "A", "AT");
        assert_eq!(v.ref_allele(), "");
        assert_eq!(v.alt_allele(), "T");
        assert_eq!(v.inclusive_start(), 101);
        assert_eq!(v.interbase_start(), 100);
        assert_eq!(v.interbase_end(), 100);
    }

    #[test]
    fn test_trailing_flank_trimmed_first() {
        let v = Variant::new("1", 100, "CTT", "CAT");
        assert_eq!(v.ref_allele(), "T");
        assert_eq!(v.alt_allele(), "A");
        assert_eq!(v.inclusive_start(), 101);
    }

    #[test]
    fn test_passing() {
        assert!(Variant::new("1", 1, "A", "C").is_passing());
        let v = Variant::with_details(
            "1",
            1,
            "A",
            "C",
            None,
            None,
            vec!["q10".into()],
            Metadata::new(),
        );
        assert!(!v.is_passing());
    }
}
