pub(crate) mod parser;

pub mod bindings;
pub mod expr;
pub mod filter;
pub mod locus;
pub mod pileup;
pub mod reader;
pub mod record;
pub mod sources;
pub mod types;

pub use bindings::BindingSet;
pub use expr::{evaluate, evaluate_expression, EvalError, Expr, FaultPolicy};
pub use filter::{Filter, FilterGroup, LabeledFilter};
pub use locus::Locus;
pub use parser::ParseError;
pub use record::{ReadRecord, Record, Variant};
pub use sources::{align, AlignError, Alignment};
pub use types::{Metadata, Value};

#[cfg(test)]
mod test {
    use super::bindings::BindingSet;
    use super::expr::{evaluate, Expr};
    use super::filter::{Filter, FilterGroup};
    use super::record::Variant;
    use super::sources::align;
    use super::types::{Metadata, Value};

    #[test]
    fn test_variant_expressions_end_to_end() {
        let variant = Variant::new("22", 46931060, "A", "C");
        let bindings = BindingSet::resolve(&variant, &Metadata::new(), &Metadata::new());
        let expressions = [
            "ref=='A'",
            "alt=='C'",
            "inclusive_start==46931060",
            "interbase_start==46931059",
            "interbase_end==46931060",
        ];
        for text in &expressions {
            let expr: Expr = text.parse().unwrap();
            assert_eq!(
                evaluate(&expr, &bindings).unwrap(),
                Value::Bool(true),
                "{} should hold",
                text
            );
        }

        let group: FilterGroup = expressions
            .iter()
            .map(|t| Filter::parse(t).unwrap())
            .collect();
        assert!(group.passes(&variant, &Metadata::new()).unwrap());
    }

    #[test]
    fn test_named_filter_targets_one_source_end_to_end() {
        let sources = vec!["foo.bam".to_string(), "bar.bam".to_string()];
        let names = vec!["foo".to_string(), "bar".to_string()];
        let alignment = align(
            &sources,
            Some(&names),
            &[vec!["foo:is_reverse".to_string()]],
        )
        .unwrap();

        let forward = crate::parser::sam_record(
            "r1\t0\tchr22\t100\t60\t4M\t=\t0\t0\tACGT\tIIII",
        )
        .unwrap()
        .1;
        let metadata = Metadata::new();
        // foo's group rejects the forward-strand read, bar's empty group
        // passes every record
        assert!(!alignment.groups[0].passes(&forward, &metadata).unwrap());
        assert!(alignment.groups[1].passes(&forward, &metadata).unwrap());
    }
}
