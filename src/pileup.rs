use indexmap::IndexMap;
use itertools::Itertools;

use crate::bindings::BindingSet;
use crate::expr::{EvalError, FaultPolicy};
use crate::filter::LabeledFilter;
use crate::locus::Locus;
use crate::record::{CigarOp, ReadRecord, Record};
use crate::types::Metadata;

/// The query bases a read aligns to the interbase window `[start, end)`.
///
/// Insertions strictly inside the window are included; deletions contribute
/// nothing. Reads that do not fully span the window yield `None`.
pub fn read_bases_at(
    read: &ReadRecord,
    interbase_start: u64,
    interbase_end: u64,
) -> Option<String> {
    if !read.is_mapped() || read.sequence() == "*" {
        return None;
    }
    if read.interbase_start() > interbase_start || read.interbase_end() < interbase_end {
        return None;
    }

    let seq = read.sequence();
    let mut ref_cursor = read.interbase_start();
    let mut query_cursor = 0usize;
    let mut allele = String::new();

    for (len, op) in read.cigar() {
        let len = u64::from(*len);
        match op {
            CigarOp::AlnMatch | CigarOp::SeqMatch | CigarOp::SeqMismatch => {
                let lo = ref_cursor.max(interbase_start);
                let hi = (ref_cursor + len).min(interbase_end);
                if lo < hi {
                    let offset = query_cursor + (lo - ref_cursor) as usize;
                    allele.push_str(&seq[offset..offset + (hi - lo) as usize]);
                }
                ref_cursor += len;
                query_cursor += len as usize;
            }
            CigarOp::Insertion => {
                if interbase_start < ref_cursor && ref_cursor < interbase_end {
                    allele.push_str(&seq[query_cursor..query_cursor + len as usize]);
                }
                query_cursor += len as usize;
            }
            CigarOp::Deletion | CigarOp::Skip => {
                ref_cursor += len;
            }
            CigarOp::SoftClip => {
                query_cursor += len as usize;
            }
            CigarOp::HardClip | CigarOp::Padding => {}
        }
    }
    Some(allele)
}

/// One output row of the allele-support table.
#[derive(Debug, Clone, PartialEq)]
pub struct AlleleSupport {
    pub contig: String,
    pub interbase_start: u64,
    pub interbase_end: u64,
    pub allele: String,
    pub count: u64,
    /// One count per labeled filter, restricted to reads passing it.
    pub extra_counts: Vec<u64>,
}

/// Group the spanning reads at `locus` by extracted allele. Labeled filters
/// add one restricted count each; their faults fail fast.
pub fn allele_support(
    locus: &Locus,
    reads: &[ReadRecord],
    labeled: &[LabeledFilter],
) -> Result<Vec<AlleleSupport>, EvalError> {
    let start = locus.interbase_start();
    let end = locus.interbase_end();
    let mut counts: IndexMap<String, (u64, Vec<u64>)> = IndexMap::new();

    for read in reads {
        if !locus.overlaps(read.contig(), read.interbase_start(), read.interbase_end()) {
            continue;
        }
        let allele = match read_bases_at(read, start, end) {
            Some(allele) => allele,
            None => continue,
        };
        let passing: Vec<bool> = if labeled.is_empty() {
            vec![]
        } else {
            let bindings = BindingSet::resolve(read, &Metadata::new(), &Metadata::new());
            labeled
                .iter()
                .map(|lf| lf.filter.evaluate(read, &bindings, &FaultPolicy::Raise))
                .collect::<Result<_, _>>()?
        };
        let entry = counts
            .entry(allele)
            .or_insert_with(|| (0, vec![0; labeled.len()]));
        entry.0 += 1;
        for (slot, passed) in entry.1.iter_mut().zip(&passing) {
            if *passed {
                *slot += 1;
            }
        }
    }

    Ok(counts
        .into_iter()
        .map(|(allele, (count, extra_counts))| AlleleSupport {
            contig: locus.contig().clone(),
            interbase_start: start,
            interbase_end: end,
            allele,
            count,
            extra_counts,
        })
        .sorted_by(|a, b| b.count.cmp(&a.count).then_with(|| a.allele.cmp(&b.allele)))
        .collect())
}
