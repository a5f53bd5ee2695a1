use std::fmt;
use std::str::FromStr;

use getset::Getters;
use indexmap::IndexMap;
use multimap::MultiMap;
use strum::EnumString;

use crate::parser;

/// Auxiliary per-record key/value annotations (VCF INFO fields, dataframe
/// columns, caller-supplied bindings).
pub type Metadata = IndexMap<String, Value>;

/// A dynamically typed value as it appears in bindings, metadata and
/// expression results.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// Truthiness: missing is false, numbers are true iff nonzero,
    /// strings and aggregates are true iff non-empty.
    pub fn truthy(&self) -> bool {
        match self {
            Value::Missing => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(v) => !v.is_empty(),
            Value::Map(m) => !m.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Missing => "missing",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Map(_) => "map",
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Int(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Missing)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(values) => {
                let mut first = true;
                for value in values {
                    if !first {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", value)?;
                    first = false;
                }
                Ok(())
            }
            Value::Map(entries) => {
                let mut first = true;
                for (key, value) in entries {
                    if !first {
                        f.write_str(";")?;
                    }
                    write!(f, "{}={}", key, value)?;
                    first = false;
                }
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, EnumString)]
pub enum InfoType {
    Integer,
    Float,
    Flag,
    Character,
    String,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
pub enum InfoNumber {
    Count(usize),
    Alleles,
    AlternateAlleles,
    Genotypes,
    Unknown,
}

/// Parsed VCF header: raw meta lines plus the dictionaries needed to type
/// INFO values and resolve FILTER ids.
#[derive(Debug, Clone, Default, Getters)]
#[getset(get = "pub")]
pub struct VcfHeader {
    pub(crate) meta: MultiMap<String, String>,
    pub(crate) info: IndexMap<String, InfoDef>,
    pub(crate) filters: Vec<FilterDef>,
    pub(crate) contigs: Vec<ContigDef>,
    pub(crate) samples: Vec<String>,
}

#[derive(Debug, Getters, Clone)]
#[getset(get = "pub")]
pub struct InfoDef {
    pub(crate) id: String,
    number: InfoNumber,
    kind: InfoType,
    description: String,
    additional: IndexMap<String, String>,
}

impl<'a> From<Vec<(&'a str, &'a str)>> for InfoDef {
    fn from(data: Vec<(&'a str, &'a str)>) -> Self {
        let mut h: IndexMap<_, _> = data.into_iter().collect();
        let mut def = InfoDef {
            id: h.remove("ID").expect("ID is mandatory").into(),
            number: parser::info_number(h.remove("Number").expect("Number is mandatory"))
                .expect("malformed Number")
                .1,
            kind: InfoType::from_str(h.remove("Type").expect("Type is mandatory"))
                .expect("unknown Type"),
            description: h.remove("Description").unwrap_or("").into(),
            additional: Default::default(),
        };
        def.additional = h.into_iter().map(|(k, v)| (k.into(), v.into())).collect();
        def
    }
}

impl InfoDef {
    /// A single declared value, as opposed to a list.
    pub fn is_scalar(&self) -> bool {
        matches!(self.number, InfoNumber::Count(1)) || self.kind == InfoType::Flag
    }
}

#[derive(Debug, Clone)]
pub struct FilterDef {
    pub(crate) id: String,
    pub(crate) description: String,
}

impl<'a> From<Vec<(&'a str, &'a str)>> for FilterDef {
    fn from(data: Vec<(&'a str, &'a str)>) -> Self {
        let mut h: IndexMap<_, _> = data.into_iter().collect();
        FilterDef {
            id: h.remove("ID").expect("ID is mandatory").into(),
            description: h.remove("Description").unwrap_or("").into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContigDef {
    pub(crate) id: String,
    pub(crate) length: Option<usize>,
}

impl<'a> From<Vec<(&'a str, &'a str)>> for ContigDef {
    fn from(data: Vec<(&'a str, &'a str)>) -> Self {
        let mut h: IndexMap<_, _> = data.into_iter().collect();
        ContigDef {
            id: h.remove("ID").expect("ID is mandatory").into(),
            length: h.remove("length").and_then(|s| s.parse().ok()),
        }
    }
}
