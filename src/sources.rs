use std::path::Path;

use itertools::Itertools;
use thiserror::Error;

use crate::filter::{Filter, FilterGroup};
use crate::parser::{self, ParseError};

#[derive(Debug, Error)]
pub enum AlignError {
    #[error(
        "{given} filter occurrence(s) cannot be reconciled with {sources} source(s); \
         give exactly one occurrence (applied to every source) or one per source"
    )]
    Cardinality { given: usize, sources: usize },
    #[error("{given} source name(s) given for {sources} source(s)")]
    NameCardinality { given: usize, sources: usize },
    #[error("filter `{token}` references unknown source `{name}`; known sources: {known}")]
    UnknownSource {
        token: String,
        name: String,
        known: String,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// The reconciled result: one name and one filter group per source, in
/// source order.
#[derive(Debug, Clone)]
pub struct Alignment {
    pub names: Vec<String>,
    pub groups: Vec<FilterGroup>,
}

/// Reconcile K sources with optional name overrides and a list of filter
/// occurrences (each a list of raw tokens).
///
/// Zero occurrences leave every group empty. A single occurrence broadcasts
/// to all K sources. K occurrences apply positionally. Anything else is a
/// cardinality error. A `name:expr` token always routes to the group(s) of
/// the source literally named `name` — in addition to, never instead of,
/// whatever else those groups receive.
pub fn align(
    sources: &[String],
    name_overrides: Option<&[String]>,
    occurrences: &[Vec<String>],
) -> Result<Alignment, AlignError> {
    let names = match name_overrides {
        Some(overrides) => {
            if overrides.len() != sources.len() {
                return Err(AlignError::NameCardinality {
                    given: overrides.len(),
                    sources: sources.len(),
                });
            }
            overrides.to_vec()
        }
        None => derive_names(sources),
    };

    let mut groups = vec![FilterGroup::new(); sources.len()];

    if occurrences.is_empty() {
        return Ok(Alignment { names, groups });
    }

    if occurrences.len() == 1 {
        // broadcast: unnamed tokens go to every source, named tokens once
        // to the named source(s) only
        for token in &occurrences[0] {
            match parse_filter_token(token)? {
                (Some(name), filter) => {
                    route_named(&mut groups, &names, token, &name, filter)?
                }
                (None, filter) => {
                    for group in &mut groups {
                        group.push(filter.clone());
                    }
                }
            }
        }
    } else if occurrences.len() == sources.len() {
        for (i, occurrence) in occurrences.iter().enumerate() {
            for token in occurrence {
                match parse_filter_token(token)? {
                    (Some(name), filter) => {
                        route_named(&mut groups, &names, token, &name, filter)?
                    }
                    (None, filter) => groups[i].push(filter),
                }
            }
        }
    } else {
        return Err(AlignError::Cardinality {
            given: occurrences.len(),
            sources: sources.len(),
        });
    }

    Ok(Alignment { names, groups })
}

fn parse_filter_token(token: &str) -> Result<(Option<String>, Filter), ParseError> {
    let (name, expr) = parser::parse_filter_token(token)?;
    Ok((
        name,
        Filter::Expression {
            source: token.to_owned(),
            expr,
        },
    ))
}

fn route_named(
    groups: &mut [FilterGroup],
    names: &[String],
    token: &str,
    name: &str,
    filter: Filter,
) -> Result<(), AlignError> {
    let mut routed = false;
    for (i, source_name) in names.iter().enumerate() {
        if source_name == name {
            groups[i].push(filter.clone());
            routed = true;
        }
    }
    if routed {
        Ok(())
    } else {
        Err(AlignError::UnknownSource {
            token: token.to_owned(),
            name: name.to_owned(),
            known: names.iter().join(", "),
        })
    }
}

/// Default source names: the identifiers with common path/extension
/// decoration removed. Deterministic; duplicates are allowed.
pub fn derive_names(sources: &[String]) -> Vec<String> {
    match sources {
        [] => vec![],
        [single] => vec![file_stem(single)],
        _ => {
            let prefix = common_prefix_len(sources);
            let stripped: Vec<&str> = sources.iter().map(|s| &s[prefix..]).collect();
            let suffix = common_suffix_len(&stripped);
            stripped
                .iter()
                .zip(sources)
                .map(|(s, original)| {
                    let name = &s[..s.len() - suffix];
                    if name.is_empty() {
                        file_stem(original)
                    } else {
                        name.to_owned()
                    }
                })
                .collect()
        }
    }
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_owned())
}

fn common_prefix_len(strings: &[String]) -> usize {
    let first = match strings.first() {
        Some(f) => f.as_bytes(),
        None => return 0,
    };
    let mut len = first.len();
    for s in &strings[1..] {
        len = s
            .as_bytes()
            .iter()
            .zip(first)
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    len
}

fn common_suffix_len(strings: &[&str]) -> usize {
    let first = match strings.first() {
        Some(f) => f.as_bytes(),
        None => return 0,
    };
    let mut len = first.len();
    for s in &strings[1..] {
        len = s
            .as_bytes()
            .iter()
            .rev()
            .zip(first.iter().rev())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    len
}

#[cfg(test)]
mod test {
    use super::*;

    fn sources(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn labels(group: &FilterGroup) -> Vec<&str> {
        group.filters().iter().map(|f| f.label()).collect()
    }

    #[test]
    fn test_zero_occurrences() {
        let alignment = align(&sources(&["a.vcf", "b.vcf"]), None, &[]).unwrap();
        assert_eq!(alignment.groups.len(), 2);
        assert!(alignment.groups.iter().all(FilterGroup::is_empty));
    }

    #[test]
    fn test_broadcast() {
        let alignment = align(
            &sources(&["x/a.vcf", "x/b.vcf", "x/c.vcf"]),
            None,
            &[vec!["ref=='A'".to_string()]],
        )
        .unwrap();
        assert_eq!(alignment.groups.len(), 3);
        for group in &alignment.groups {
            assert_eq!(labels(group), vec!["ref=='A'"]);
        }
    }

    #[test]
    fn test_positional() {
        let alignment = align(
            &sources(&["x/a.vcf", "x/b.vcf"]),
            None,
            &[
                vec!["ref=='A'".to_string()],
                vec!["ref=='C'".to_string()],
            ],
        )
        .unwrap();
        assert_eq!(labels(&alignment.groups[0]), vec!["ref=='A'"]);
        assert_eq!(labels(&alignment.groups[1]), vec!["ref=='C'"]);
    }

    #[test]
    fn test_cardinality_error() {
        for k in 2..5usize {
            let ids: Vec<String> = (0..k).map(|i| format!("s{}.vcf", i)).collect();
            let occurrences: Vec<Vec<String>> =
                (0..k + 1).map(|_| vec!["true".to_string()]).collect();
            match align(&ids, None, &occurrences) {
                Err(AlignError::Cardinality { given, sources }) => {
                    assert_eq!(given, k + 1);
                    assert_eq!(sources, k);
                }
                other => panic!("expected cardinality error, got {:?}", other),
            }
        }

        // a count strictly between 1 and K is just as ambiguous
        let ids = sources(&["a.vcf", "b.vcf", "c.vcf"]);
        let occurrences = vec![vec!["true".to_string()], vec!["true".to_string()]];
        assert!(matches!(
            align(&ids, None, &occurrences),
            Err(AlignError::Cardinality { given: 2, sources: 3 })
        ));
    }

    #[test]
    fn test_named_token_routes_to_named_source_only() {
        // the sole occurrence names `foo`: only foo's group receives the
        // filter, the other group stays empty and passes everything
        let alignment = align(
            &sources(&["foo.bam", "bar.bam"]),
            Some(&sources(&["foo", "bar"])),
            &[vec!["foo:is_reverse".to_string()]],
        )
        .unwrap();
        assert_eq!(labels(&alignment.groups[0]), vec!["foo:is_reverse"]);
        assert!(alignment.groups[1].is_empty());
    }

    #[test]
    fn test_named_token_adds_to_broadcast() {
        let alignment = align(
            &sources(&["foo.bam", "bar.bam"]),
            Some(&sources(&["foo", "bar"])),
            &[vec!["is_read1".to_string(), "foo:is_reverse".to_string()]],
        )
        .unwrap();
        assert_eq!(labels(&alignment.groups[0]), vec!["is_read1", "foo:is_reverse"]);
        assert_eq!(labels(&alignment.groups[1]), vec!["is_read1"]);
    }

    #[test]
    fn test_named_token_crosses_positions() {
        // declared under position 0, routed to the source named `b`
        let alignment = align(
            &sources(&["a.vcf", "b.vcf"]),
            Some(&sources(&["a", "b"])),
            &[vec!["b:ref=='A'".to_string()], vec![]],
        )
        .unwrap();
        assert!(alignment.groups[0].is_empty());
        assert_eq!(labels(&alignment.groups[1]), vec!["b:ref=='A'"]);
    }

    #[test]
    fn test_unknown_name_is_fatal() {
        match align(
            &sources(&["a.vcf", "b.vcf"]),
            None,
            &[vec!["nosuch:ref=='A'".to_string()]],
        ) {
            Err(AlignError::UnknownSource { name, .. }) => assert_eq!(name, "nosuch"),
            other => panic!("expected unknown source error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_names_both_apply() {
        let alignment = align(
            &sources(&["a.vcf", "b.vcf"]),
            Some(&sources(&["dup", "dup"])),
            &[vec!["dup:ref=='A'".to_string()]],
        )
        .unwrap();
        assert_eq!(labels(&alignment.groups[0]), vec!["dup:ref=='A'"]);
        assert_eq!(labels(&alignment.groups[1]), vec!["dup:ref=='A'"]);
    }

    #[test]
    fn test_name_override_cardinality() {
        assert!(matches!(
            align(
                &sources(&["a.vcf", "b.vcf"]),
                Some(&sources(&["only"])),
                &[]
            ),
            Err(AlignError::NameCardinality { given: 1, sources: 2 })
        ));
    }

    #[test]
    fn test_malformed_token_is_fatal() {
        assert!(matches!(
            align(&sources(&["a.vcf"]), None, &[vec!["ref ==".to_string()]]),
            Err(AlignError::Parse(_))
        ));
    }

    #[test]
    fn test_derived_names() {
        assert_eq!(
            derive_names(&sources(&["x/bam_0.bam", "x/bam_5.bam"])),
            vec!["0", "5"]
        );
        assert_eq!(derive_names(&sources(&["x/sample.vcf"])), vec!["sample"]);
        // identical identifiers fall back to the file stem
        assert_eq!(
            derive_names(&sources(&["a/f.bam", "a/f.bam"])),
            vec!["f", "f"]
        );
    }
}
