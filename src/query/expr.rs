//! Structured query expressions.
//!
//! The tree is a value type: rewrites (see [`crate::query::merge`]) build a
//! new tree instead of editing one in place, so the same recorded read can be
//! validated by several committers without sharing mutable state.

use crate::core::record::{Record, RecordPattern, Term};
use crate::query::bindings::BindingSet;

/// One position of a statement pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Var(String),
    Value(Term),
}

impl Slot {
    pub fn var(name: impl Into<String>) -> Self {
        Slot::Var(name.into())
    }

    pub fn value(term: Term) -> Self {
        Slot::Value(term)
    }

    /// The constant for this slot under `bindings`, if any.
    pub fn resolve(&self, bindings: &BindingSet) -> Option<Term> {
        match self {
            Slot::Value(term) => Some(term.clone()),
            Slot::Var(name) => bindings.get(name).cloned(),
        }
    }

    fn bind(&self, have: &Term, row: &mut BindingSet) -> bool {
        match self {
            Slot::Value(term) => term == have,
            Slot::Var(name) => row.bind(name, have),
        }
    }
}

/// Which partitions a statement pattern ranges over.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PatternContext {
    /// Every record, context not bound.
    Any,
    /// Only records in the default context.
    Default,
    /// Only records in a named context.
    Named(Slot),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatementPattern {
    pub subject: Slot,
    pub predicate: Slot,
    pub object: Slot,
    pub context: PatternContext,
}

impl StatementPattern {
    pub fn new(subject: Slot, predicate: Slot, object: Slot) -> Self {
        Self {
            subject,
            predicate,
            object,
            context: PatternContext::Any,
        }
    }

    pub fn in_named(mut self, context: Slot) -> Self {
        self.context = PatternContext::Named(context);
        self
    }

    pub fn in_default(mut self) -> Self {
        self.context = PatternContext::Default;
        self
    }

    /// Narrowest point-match pattern covering this pattern under `bindings`.
    pub fn to_record_pattern(&self, bindings: &BindingSet) -> RecordPattern {
        let contexts = match &self.context {
            PatternContext::Any => Vec::new(),
            PatternContext::Default => vec![None],
            PatternContext::Named(slot) => match slot.resolve(bindings) {
                Some(term) => vec![Some(term)],
                None => Vec::new(),
            },
        };
        RecordPattern {
            subject: self.subject.resolve(bindings),
            predicate: self.predicate.resolve(bindings),
            object: self.object.resolve(bindings),
            contexts,
        }
    }

    /// Extends `bindings` with the values `record` gives this pattern's
    /// variables, or `None` if the record does not match.
    pub fn bind(&self, record: &Record, bindings: &BindingSet) -> Option<BindingSet> {
        let mut row = bindings.clone();
        if !self.subject.bind(&record.subject, &mut row)
            || !self.predicate.bind(&record.predicate, &mut row)
            || !self.object.bind(&record.object, &mut row)
        {
            return None;
        }
        let context_ok = match (&self.context, &record.context) {
            (PatternContext::Any, _) => true,
            (PatternContext::Default, ctx) => ctx.is_none(),
            (PatternContext::Named(_), None) => false,
            (PatternContext::Named(slot), Some(ctx)) => slot.bind(ctx, &mut row),
        };
        context_ok.then_some(row)
    }
}

/// A constant record set evaluated as if it were the store, with `extra`
/// bindings added to every row it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalRecords {
    pub pattern: StatementPattern,
    pub records: Vec<Record>,
    pub extra: BindingSet,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TupleExpr {
    Pattern(StatementPattern),
    Join(Box<TupleExpr>, Box<TupleExpr>),
    LeftJoin {
        left: Box<TupleExpr>,
        right: Box<TupleExpr>,
        condition: Option<Condition>,
    },
    Union(Box<TupleExpr>, Box<TupleExpr>),
    Filter {
        input: Box<TupleExpr>,
        condition: Condition,
    },
    Records(ExternalRecords),
    /// Matches of `pattern` in the store, except `records`.
    Without {
        pattern: StatementPattern,
        records: Vec<Record>,
    },
}

impl TupleExpr {
    pub fn pattern(subject: Slot, predicate: Slot, object: Slot) -> Self {
        TupleExpr::Pattern(StatementPattern::new(subject, predicate, object))
    }

    pub fn join(left: TupleExpr, right: TupleExpr) -> Self {
        TupleExpr::Join(Box::new(left), Box::new(right))
    }

    pub fn optional(left: TupleExpr, right: TupleExpr) -> Self {
        TupleExpr::LeftJoin {
            left: Box::new(left),
            right: Box::new(right),
            condition: None,
        }
    }

    pub fn optional_where(left: TupleExpr, right: TupleExpr, condition: Condition) -> Self {
        TupleExpr::LeftJoin {
            left: Box::new(left),
            right: Box::new(right),
            condition: Some(condition),
        }
    }

    pub fn union(left: TupleExpr, right: TupleExpr) -> Self {
        TupleExpr::Union(Box::new(left), Box::new(right))
    }

    pub fn filter(input: TupleExpr, condition: Condition) -> Self {
        TupleExpr::Filter {
            input: Box::new(input),
            condition,
        }
    }

    /// The expression a point read of `pattern` is traced as: one statement
    /// pattern per listed context, unioned.
    pub fn from_record_pattern(pattern: &RecordPattern) -> Self {
        let slot = |term: &Option<Term>, var: &str| match term {
            Some(t) => Slot::Value(t.clone()),
            None => Slot::var(var),
        };
        let base = StatementPattern::new(
            slot(&pattern.subject, "subj"),
            slot(&pattern.predicate, "pred"),
            slot(&pattern.object, "obj"),
        );
        let mut arms = pattern.contexts.iter().map(|ctx| {
            let sp = match ctx {
                Some(term) => base.clone().in_named(Slot::Value(term.clone())),
                None => base.clone().in_default(),
            };
            TupleExpr::Pattern(sp)
        });
        match arms.next() {
            None => TupleExpr::Pattern(base.clone()),
            Some(first) => arms.fold(first, TupleExpr::union),
        }
    }

    pub fn children(&self) -> Vec<&TupleExpr> {
        match self {
            TupleExpr::Join(l, r) | TupleExpr::Union(l, r) => vec![l.as_ref(), r.as_ref()],
            TupleExpr::LeftJoin { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            TupleExpr::Filter { input, .. } => vec![input.as_ref()],
            TupleExpr::Pattern(_) | TupleExpr::Records(_) | TupleExpr::Without { .. } => Vec::new(),
        }
    }

    pub fn contains_left_join(&self) -> bool {
        matches!(self, TupleExpr::LeftJoin { .. })
            || self.children().into_iter().any(TupleExpr::contains_left_join)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Operand {
    Var(String),
    Value(Term),
}

impl Operand {
    fn value<'a>(&'a self, row: &'a BindingSet) -> Option<&'a Term> {
        match self {
            Operand::Var(name) => row.get(name),
            Operand::Value(term) => Some(term),
        }
    }
}

/// Filter conditions. Evaluation errors (unbound operands, incomparable
/// values) make the condition false, and stay false under `Not`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Condition {
    Bound(String),
    Not(Box<Condition>),
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Compare {
        op: CompareOp,
        left: Operand,
        right: Operand,
    },
    Contains {
        var: String,
        needle: String,
        case_insensitive: bool,
    },
}

impl Condition {
    pub fn compare(op: CompareOp, left: Operand, right: Operand) -> Self {
        Condition::Compare { op, left, right }
    }

    pub fn not(inner: Condition) -> Self {
        Condition::Not(Box::new(inner))
    }

    pub fn and(left: Condition, right: Condition) -> Self {
        Condition::And(Box::new(left), Box::new(right))
    }

    pub fn or(left: Condition, right: Condition) -> Self {
        Condition::Or(Box::new(left), Box::new(right))
    }

    pub fn holds(&self, row: &BindingSet) -> bool {
        self.eval(row) == Some(true)
    }

    fn eval(&self, row: &BindingSet) -> Option<bool> {
        match self {
            Condition::Bound(name) => Some(row.has_binding(name)),
            Condition::Not(inner) => inner.eval(row).map(|v| !v),
            Condition::And(l, r) => match (l.eval(row), r.eval(row)) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            Condition::Or(l, r) => match (l.eval(row), r.eval(row)) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            Condition::Compare { op, left, right } => {
                let (l, r) = (left.value(row)?, right.value(row)?);
                let ordered = |l: &Term, r: &Term| Some(l.as_integer()?.cmp(&r.as_integer()?));
                match op {
                    CompareOp::Eq => Some(l == r),
                    CompareOp::Ne => Some(l != r),
                    CompareOp::Lt => ordered(l, r).map(|o| o.is_lt()),
                    CompareOp::Le => ordered(l, r).map(|o| o.is_le()),
                    CompareOp::Gt => ordered(l, r).map(|o| o.is_gt()),
                    CompareOp::Ge => ordered(l, r).map(|o| o.is_ge()),
                }
            }
            Condition::Contains {
                var,
                needle,
                case_insensitive,
            } => {
                let haystack = row.get(var)?.lexical();
                Some(if *case_insensitive {
                    haystack.to_lowercase().contains(&needle.to_lowercase())
                } else {
                    haystack.contains(needle.as_str())
                })
            }
        }
    }
}
