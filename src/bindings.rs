use indexmap::IndexMap;

use crate::record::Record;
use crate::types::{Metadata, Value};

/// The named values visible to an expression while it is evaluated against
/// one record. Rebuilt fresh per record, never shared or mutated across
/// records.
#[derive(Debug, Clone, Default)]
pub struct BindingSet {
    bindings: IndexMap<String, Value>,
}

impl BindingSet {
    pub fn new() -> Self {
        Default::default()
    }

    /// Build the binding set for one record. Insertion order, later entries
    /// shadowing earlier ones on collision:
    ///
    /// 1. the record's own attributes, as top-level names,
    /// 2. derived positional fields (`inclusive_start`, `inclusive_end`,
    ///    `interbase_start`, `interbase_end`),
    /// 3. the attribute map under the record's reserved name and `record`,
    /// 4. the metadata map under `metadata`,
    /// 5. each metadata key as a top-level name,
    /// 6. caller-supplied extra bindings.
    pub fn resolve(record: &dyn Record, metadata: &Metadata, extra: &Metadata) -> Self {
        let mut bindings = IndexMap::new();
        let attributes = record.attributes();
        for (name, value) in &attributes {
            bindings.insert(name.clone(), value.clone());
        }

        bindings.insert(
            "inclusive_start".into(),
            Value::from(record.inclusive_start()),
        );
        bindings.insert("inclusive_end".into(), Value::from(record.inclusive_end()));
        bindings.insert(
            "interbase_start".into(),
            Value::from(record.interbase_start()),
        );
        bindings.insert("interbase_end".into(), Value::from(record.interbase_end()));

        let as_map = Value::Map(attributes);
        bindings.insert(record.reserved_name().into(), as_map.clone());
        bindings.insert("record".into(), as_map);
        bindings.insert("metadata".into(), Value::Map(metadata.clone()));

        for (name, value) in metadata {
            bindings.insert(name.clone(), value.clone());
        }
        for (name, value) in extra {
            bindings.insert(name.clone(), value.clone());
        }
        BindingSet { bindings }
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.bindings.insert(name.to_owned(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.bindings.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::record::Variant;

    fn variant() -> Variant {
        Variant::new("22", 46931060, "A", "C")
    }

    #[test]
    fn test_coordinate_bindings() {
        let v = variant();
        let b = BindingSet::resolve(&v, &Metadata::new(), &Metadata::new());
        assert_eq!(b.get("inclusive_start"), Some(&Value::Int(46931060)));
        assert_eq!(b.get("inclusive_end"), Some(&Value::Int(46931060)));
        assert_eq!(b.get("interbase_start"), Some(&Value::Int(46931059)));
        assert_eq!(b.get("interbase_end"), Some(&Value::Int(46931060)));
    }

    #[test]
    fn test_record_attributes_are_top_level() {
        let v = variant();
        let b = BindingSet::resolve(&v, &Metadata::new(), &Metadata::new());
        assert_eq!(b.get("ref"), Some(&Value::Str("A".into())));
        assert_eq!(b.get("alt"), Some(&Value::Str("C".into())));
        assert_eq!(b.get("contig"), Some(&Value::Str("22".into())));
    }

    #[test]
    fn test_reserved_names() {
        let v = variant();
        let b = BindingSet::resolve(&v, &Metadata::new(), &Metadata::new());
        match (b.get("variant"), b.get("record")) {
            (Some(Value::Map(m)), Some(Value::Map(r))) => {
                assert_eq!(m.get("ref"), Some(&Value::Str("A".into())));
                assert_eq!(m, r);
            }
            other => panic!("expected maps, got {:?}", other),
        }
        assert!(matches!(b.get("metadata"), Some(Value::Map(_))));
    }

    #[test]
    fn test_metadata_keys_flattened_and_shadowing() {
        let v = variant();
        let mut metadata = Metadata::new();
        metadata.insert("depth".into(), Value::Int(12));
        metadata.insert("ref".into(), Value::Str("G".into()));
        let b = BindingSet::resolve(&v, &metadata, &Metadata::new());
        assert_eq!(b.get("depth"), Some(&Value::Int(12)));
        // metadata shadows the record attribute of the same name
        assert_eq!(b.get("ref"), Some(&Value::Str("G".into())));
    }

    #[test]
    fn test_extra_bindings_win() {
        let v = variant();
        let mut metadata = Metadata::new();
        metadata.insert("depth".into(), Value::Int(12));
        let mut extra = Metadata::new();
        extra.insert("depth".into(), Value::Int(99));
        let b = BindingSet::resolve(&v, &metadata, &extra);
        assert_eq!(b.get("depth"), Some(&Value::Int(99)));
    }
}
