use std::fmt;
use std::iter::FromIterator;
use std::sync::Arc;

use crate::bindings::BindingSet;
use crate::expr::{evaluate_expression, EvalError, Expr, FaultPolicy};
use crate::parser::{self, ParseError};
use crate::record::Record;
use crate::types::Metadata;

/// A caller-supplied predicate filter; invoked directly with the record,
/// faults are never caught.
pub type Predicate = Arc<dyn Fn(&dyn Record) -> bool + Send + Sync>;

/// One filter: a parsed textual expression or a literal predicate.
#[derive(Clone)]
pub enum Filter {
    Expression { source: String, expr: Expr },
    Predicate(Predicate),
}

impl Filter {
    /// Parse a textual filter eagerly so malformed tokens fail before any
    /// record is processed.
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        Ok(Filter::Expression {
            source: token.to_owned(),
            expr: parser::parse_expression(token)?,
        })
    }

    pub fn predicate(f: impl Fn(&dyn Record) -> bool + Send + Sync + 'static) -> Self {
        Filter::Predicate(Arc::new(f))
    }

    /// The source text for expressions, a placeholder for predicates. Used
    /// in error messages and as a default column label.
    pub fn label(&self) -> &str {
        match self {
            Filter::Expression { source, .. } => source,
            Filter::Predicate(_) => "<predicate>",
        }
    }

    pub fn evaluate(
        &self,
        record: &dyn Record,
        bindings: &BindingSet,
        policy: &FaultPolicy,
    ) -> Result<bool, EvalError> {
        match self {
            Filter::Expression { expr, .. } => {
                evaluate_expression(expr, bindings, policy).map(|v| v.truthy())
            }
            Filter::Predicate(f) => Ok(f(record)),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Expression { source, .. } => write!(f, "Filter({:?})", source),
            Filter::Predicate(_) => f.write_str("Filter(<predicate>)"),
        }
    }
}

/// A filter paired with a column label: `NAME:EXPR` labels the column
/// `NAME`, a bare expression labels it with its own text.
#[derive(Debug, Clone)]
pub struct LabeledFilter {
    pub label: String,
    pub filter: Filter,
}

impl LabeledFilter {
    pub fn parse(token: &str) -> Result<Self, ParseError> {
        let (name, expr) = parser::parse_filter_token(token)?;
        let source = match &name {
            Some(prefix) => token[prefix.len() + 1..].trim().to_owned(),
            None => token.to_owned(),
        };
        Ok(LabeledFilter {
            label: name.unwrap_or_else(|| token.to_owned()),
            filter: Filter::Expression { source, expr },
        })
    }
}

/// The filters applied to one input source; a record passes iff every
/// filter evaluates truthy. An empty group passes everything.
#[derive(Debug, Clone, Default)]
pub struct FilterGroup {
    filters: Vec<Filter>,
}

impl FilterGroup {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn push(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Fail-fast combinator: any evaluation fault aborts.
    pub fn passes(&self, record: &dyn Record, metadata: &Metadata) -> Result<bool, EvalError> {
        self.passes_with(record, metadata, &FaultPolicy::Raise)
    }

    /// Resolves bindings once per record, evaluates every filter against
    /// that one binding set and short-circuits on the first false.
    pub fn passes_with(
        &self,
        record: &dyn Record,
        metadata: &Metadata,
        policy: &FaultPolicy,
    ) -> Result<bool, EvalError> {
        if self.filters.is_empty() {
            return Ok(true);
        }
        let bindings = BindingSet::resolve(record, metadata, &Metadata::new());
        for filter in &self.filters {
            if !filter.evaluate(record, &bindings, policy)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl From<Vec<Filter>> for FilterGroup {
    fn from(filters: Vec<Filter>) -> Self {
        FilterGroup { filters }
    }
}

impl FromIterator<Filter> for FilterGroup {
    fn from_iter<I: IntoIterator<Item = Filter>>(iter: I) -> Self {
        FilterGroup {
            filters: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::Variant;
    use crate::types::Value;

    fn variant() -> Variant {
        Variant::new("22", 46931060, "A", "C")
    }

    fn group(tokens: &[&str]) -> FilterGroup {
        tokens
            .iter()
            .map(|t| Filter::parse(t).unwrap())
            .collect()
    }

    #[test]
    fn test_empty_group_vacuously_passes() {
        let v = variant();
        assert!(FilterGroup::new().passes(&v, &Metadata::new()).unwrap());
    }

    #[test]
    fn test_conjunction() {
        let v = variant();
        let metadata = Metadata::new();
        assert!(group(&["ref=='A'", "alt=='C'"])
            .passes(&v, &metadata)
            .unwrap());
        assert!(!group(&["ref=='A'", "alt=='G'"])
            .passes(&v, &metadata)
            .unwrap());
    }

    #[test]
    fn test_short_circuit_skips_faulting_tail() {
        let v = variant();
        // the second filter would fault, but the first one already failed
        let g = group(&["ref=='G'", "undefined_name"]);
        assert!(!g.passes(&v, &Metadata::new()).unwrap());
    }

    #[test]
    fn test_fail_fast_propagates_fault() {
        let v = variant();
        let g = group(&["undefined_name", "ref=='A'"]);
        assert!(g.passes(&v, &Metadata::new()).is_err());
    }

    #[test]
    fn test_fail_soft_uses_sentinel() {
        let v = variant();
        let g = group(&["undefined_name", "ref=='A'"]);
        let kept = g
            .passes_with(
                &v,
                &Metadata::new(),
                &FaultPolicy::Value(Value::Bool(false)),
            )
            .unwrap();
        assert!(!kept);

        let kept = g
            .passes_with(&v, &Metadata::new(), &FaultPolicy::Value(Value::Bool(true)))
            .unwrap();
        assert!(kept);
    }

    #[test]
    fn test_predicate_filter() {
        let v = variant();
        let mut g = FilterGroup::new();
        g.push(Filter::predicate(|r| r.inclusive_start() == 46931060));
        assert!(g.passes(&v, &Metadata::new()).unwrap());

        let mut g = FilterGroup::new();
        g.push(Filter::predicate(|r| r.contig() == "21"));
        assert!(!g.passes(&v, &Metadata::new()).unwrap());
    }

    #[test]
    fn test_malformed_token_fails_at_parse_time() {
        assert!(Filter::parse("ref ==").is_err());
    }

    #[test]
    fn test_labeled_filter() {
        let lf = LabeledFilter::parse("foo:is_reverse").unwrap();
        assert_eq!(lf.label, "foo");
        assert_eq!(lf.filter.label(), "is_reverse");

        let lf = LabeledFilter::parse("is_reverse").unwrap();
        assert_eq!(lf.label, "is_reverse");
    }
}
