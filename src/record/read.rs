use std::fmt::Write as _;

use getset::Getters;
use num_enum::TryFromPrimitive;

use crate::record::Record;
use crate::types::{Metadata, Value};

const FLAG_PAIRED: u16 = 0x1;
const FLAG_PROPER_PAIR: u16 = 0x2;
const FLAG_UNMAPPED: u16 = 0x4;
const FLAG_MATE_UNMAPPED: u16 = 0x8;
const FLAG_REVERSE: u16 = 0x10;
const FLAG_MATE_REVERSE: u16 = 0x20;
const FLAG_READ1: u16 = 0x40;
const FLAG_READ2: u16 = 0x80;
const FLAG_SECONDARY: u16 = 0x100;
const FLAG_QC_FAIL: u16 = 0x200;
const FLAG_DUPLICATE: u16 = 0x400;
const FLAG_SUPPLEMENTARY: u16 = 0x800;

/// A CIGAR operation, keyed by its SAM character code.
#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive)]
#[repr(u8)]
pub enum CigarOp {
    AlnMatch = b'M',
    Insertion = b'I',
    Deletion = b'D',
    Skip = b'N',
    SoftClip = b'S',
    HardClip = b'H',
    Padding = b'P',
    SeqMatch = b'=',
    SeqMismatch = b'X',
}

impl CigarOp {
    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            CigarOp::AlnMatch
                | CigarOp::Deletion
                | CigarOp::Skip
                | CigarOp::SeqMatch
                | CigarOp::SeqMismatch
        )
    }

    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            CigarOp::AlnMatch
                | CigarOp::Insertion
                | CigarOp::SoftClip
                | CigarOp::SeqMatch
                | CigarOp::SeqMismatch
        )
    }

    pub fn as_char(self) -> char {
        self as u8 as char
    }
}

/// One aligned read, as parsed from a SAM line.
#[derive(Debug, Clone, Getters)]
#[getset(get = "pub")]
pub struct ReadRecord {
    pub(crate) name: String,
    pub(crate) flags: u16,
    pub(crate) contig: String,
    /// 1-based leftmost mapping position; 0 if unmapped.
    pub(crate) pos: u64,
    pub(crate) mapping_quality: u8,
    pub(crate) cigar: Vec<(u32, CigarOp)>,
    pub(crate) mate_contig: String,
    pub(crate) mate_pos: u64,
    pub(crate) template_length: i64,
    pub(crate) sequence: String,
    pub(crate) base_qualities: String,
    pub(crate) tags: Vec<String>,
}

macro_rules! flag_accessors {
    ($($fn_name:ident, $flag:ident;)*) => {
        $(
            pub fn $fn_name(&self) -> bool {
                self.flags & $flag != 0
            }
        )*
    };
}

impl ReadRecord {
    flag_accessors!(
        is_paired, FLAG_PAIRED;
        is_proper_pair, FLAG_PROPER_PAIR;
        is_unmapped, FLAG_UNMAPPED;
        is_mate_unmapped, FLAG_MATE_UNMAPPED;
        is_reverse, FLAG_REVERSE;
        is_mate_reverse, FLAG_MATE_REVERSE;
        is_read1, FLAG_READ1;
        is_read2, FLAG_READ2;
        is_secondary, FLAG_SECONDARY;
        is_qc_fail, FLAG_QC_FAIL;
        is_duplicate, FLAG_DUPLICATE;
        is_supplementary, FLAG_SUPPLEMENTARY;
    );

    pub fn is_mapped(&self) -> bool {
        !self.is_unmapped() && self.pos > 0 && self.contig != "*"
    }

    /// Reference bases consumed by the alignment.
    pub fn reference_length(&self) -> u64 {
        self.cigar
            .iter()
            .filter(|(_, op)| op.consumes_reference())
            .map(|(len, _)| u64::from(*len))
            .sum()
    }

    pub fn cigar_string(&self) -> String {
        if self.cigar.is_empty() {
            return "*".to_owned();
        }
        let mut s = String::new();
        for (len, op) in &self.cigar {
            let _ = write!(s, "{}{}", len, op.as_char());
        }
        s
    }

    /// Re-serialize as one SAM line (no trailing newline).
    pub fn to_sam_line(&self) -> String {
        let mut line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.name,
            self.flags,
            self.contig,
            self.pos,
            self.mapping_quality,
            self.cigar_string(),
            self.mate_contig,
            self.mate_pos,
            self.template_length,
            self.sequence,
            self.base_qualities,
        );
        for tag in &self.tags {
            line.push('\t');
            line.push_str(tag);
        }
        line
    }
}

impl Record for ReadRecord {
    fn contig(&self) -> &str {
        &self.contig
    }

    fn inclusive_start(&self) -> u64 {
        self.pos
    }

    fn inclusive_end(&self) -> u64 {
        let len = self.reference_length();
        if len == 0 {
            self.pos
        } else {
            self.pos + len - 1
        }
    }

    fn reserved_name(&self) -> &'static str {
        "read"
    }

    fn attributes(&self) -> Metadata {
        let mut attributes = Metadata::new();
        attributes.insert("name".into(), Value::from(self.name.as_str()));
        attributes.insert("contig".into(), Value::from(self.contig.as_str()));
        attributes.insert(
            "mapping_quality".into(),
            Value::Int(i64::from(self.mapping_quality)),
        );
        attributes.insert("cigar".into(), Value::Str(self.cigar_string()));
        attributes.insert("sequence".into(), Value::from(self.sequence.as_str()));
        attributes.insert("length".into(), Value::Int(self.sequence.len() as i64));
        attributes.insert("is_paired".into(), Value::Bool(self.is_paired()));
        attributes.insert("is_proper_pair".into(), Value::Bool(self.is_proper_pair()));
        attributes.insert("is_unmapped".into(), Value::Bool(self.is_unmapped()));
        attributes.insert(
            "is_mate_unmapped".into(),
            Value::Bool(self.is_mate_unmapped()),
        );
        attributes.insert("is_reverse".into(), Value::Bool(self.is_reverse()));
        attributes.insert("is_mate_reverse".into(), Value::Bool(self.is_mate_reverse()));
        attributes.insert("is_read1".into(), Value::Bool(self.is_read1()));
        attributes.insert("is_read2".into(), Value::Bool(self.is_read2()));
        attributes.insert("is_secondary".into(), Value::Bool(self.is_secondary()));
        attributes.insert("is_qc_fail".into(), Value::Bool(self.is_qc_fail()));
        attributes.insert("is_duplicate".into(), Value::Bool(self.is_duplicate()));
        attributes.insert(
            "is_supplementary".into(),
            Value::Bool(self.is_supplementary()),
        );
        attributes
    }
}
