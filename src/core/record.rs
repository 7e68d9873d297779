use std::collections::BTreeSet;
use std::fmt;

/// A value in one position of a record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Term {
    Iri(String),
    Literal(String),
    Integer(i64),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Term::Literal(value.into())
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Term::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Lexical form, used by string conditions.
    pub fn lexical(&self) -> String {
        match self {
            Term::Iri(v) | Term::Literal(v) => v.clone(),
            Term::Integer(v) => v.to_string(),
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(v) => write!(f, "<{v}>"),
            Term::Literal(v) => write!(f, "{v:?}"),
            Term::Integer(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for Term {
    fn from(value: i64) -> Self {
        Term::Integer(value)
    }
}

/// Which of the store's two record streams a record belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    Explicit,
    Inferred,
}

/// One (subject, predicate, object, context) tuple. `context` of `None` is
/// the default, unnamed partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Record {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    pub context: Option<Term>,
}

impl Record {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: None,
        }
    }

    pub fn in_context(mut self, context: Term) -> Self {
        self.context = Some(context);
        self
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {}", self.subject, self.predicate, self.object)?;
        if let Some(ctx) = &self.context {
            write!(f, " {ctx}")?;
        }
        write!(f, ")")
    }
}

pub type RecordSet = BTreeSet<Record>;

/// A point-match pattern. `None` positions are wildcards. An empty
/// `contexts` list matches every context; a `None` entry in it selects the
/// default context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct RecordPattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
    pub contexts: Vec<Option<Term>>,
}

impl RecordPattern {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn subject(mut self, term: Term) -> Self {
        self.subject = Some(term);
        self
    }

    pub fn predicate(mut self, term: Term) -> Self {
        self.predicate = Some(term);
        self
    }

    pub fn object(mut self, term: Term) -> Self {
        self.object = Some(term);
        self
    }

    pub fn in_context(mut self, context: Term) -> Self {
        self.contexts.push(Some(context));
        self
    }

    pub fn in_default_context(mut self) -> Self {
        self.contexts.push(None);
        self
    }

    /// The pattern matching exactly this record.
    pub fn exact(record: &Record) -> Self {
        Self {
            subject: Some(record.subject.clone()),
            predicate: Some(record.predicate.clone()),
            object: Some(record.object.clone()),
            contexts: vec![record.context.clone()],
        }
    }

    pub fn matches(&self, record: &Record) -> bool {
        fn position(want: &Option<Term>, have: &Term) -> bool {
            want.as_ref().map_or(true, |w| w == have)
        }
        position(&self.subject, &record.subject)
            && position(&self.predicate, &record.predicate)
            && position(&self.object, &record.object)
            && (self.contexts.is_empty() || self.contexts.contains(&record.context))
    }

    pub fn filter<'a>(&'a self, records: &'a RecordSet) -> impl Iterator<Item = &'a Record> + 'a {
        records.iter().filter(move |r| self.matches(r))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(s: &str, p: &str, o: &str) -> Record {
        Record::new(Term::iri(s), Term::iri(p), Term::iri(o))
    }

    #[test]
    fn wildcard_pattern_matches_everything() {
        let r = rec("alice", "likes", "cats").in_context(Term::iri("g1"));
        assert!(RecordPattern::any().matches(&r));
    }

    #[test]
    fn context_list_restricts_matches() {
        let named = rec("alice", "likes", "cats").in_context(Term::iri("g1"));
        let default = rec("alice", "likes", "cats");

        let only_default = RecordPattern::any().in_default_context();
        assert!(only_default.matches(&default));
        assert!(!only_default.matches(&named));

        let g1 = RecordPattern::any().in_context(Term::iri("g1"));
        assert!(g1.matches(&named));
        assert!(!g1.matches(&default));
    }

    #[test]
    fn exact_pattern_matches_only_the_record() {
        let r = rec("alice", "likes", "cats");
        let p = RecordPattern::exact(&r);
        assert!(p.matches(&r));
        assert!(!p.matches(&rec("alice", "likes", "dogs")));
        assert!(!p.matches(&r.clone().in_context(Term::iri("g1"))));
    }
}
