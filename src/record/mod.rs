mod read;
mod variant;

use crate::types::Metadata;
pub use read::{CigarOp, ReadRecord};
pub use variant::Variant;

/// A record the filtering core can evaluate expressions against: a variant
/// call or a read alignment.
///
/// Coordinates are 1-based inclusive; the interbase (0-based, end-exclusive)
/// view is derived. An unmapped read reports position 0 and saturates.
pub trait Record {
    fn contig(&self) -> &str;

    fn inclusive_start(&self) -> u64;

    fn inclusive_end(&self) -> u64;

    /// Name the record is bound under in expressions (`variant` or `read`).
    fn reserved_name(&self) -> &'static str;

    /// The record's own fields as a name-to-value map.
    fn attributes(&self) -> Metadata;

    fn interbase_start(&self) -> u64 {
        self.inclusive_start().saturating_sub(1)
    }

    fn interbase_end(&self) -> u64 {
        self.inclusive_end()
    }
}
