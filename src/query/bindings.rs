use std::collections::BTreeMap;

use crate::core::record::Term;

/// Variable name to value assignments for one result row.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingSet(BTreeMap<String, Term>);

impl BindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`BindingSet::insert`].
    pub fn with(mut self, name: impl Into<String>, value: Term) -> Self {
        self.0.insert(name.into(), value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Term> {
        self.0.get(name)
    }

    pub fn has_binding(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Term) -> Option<Term> {
        self.0.insert(name.into(), value)
    }

    /// Binds `name` unless it is already bound to a different value.
    pub fn bind(&mut self, name: &str, value: &Term) -> bool {
        match self.0.get(name) {
            Some(existing) => existing == value,
            None => {
                self.0.insert(name.to_string(), value.clone());
                true
            }
        }
    }

    /// Union of two rows, or `None` when they disagree on a shared variable.
    pub fn merged(&self, other: &BindingSet) -> Option<BindingSet> {
        let mut out = self.clone();
        for (name, value) in &other.0 {
            if !out.bind(name, value) {
                return None;
            }
        }
        Some(out)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Term)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl FromIterator<(String, Term)> for BindingSet {
    fn from_iter<I: IntoIterator<Item = (String, Term)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
