//! Hard logical relationships between labels.
//!
//! Two constraint kinds are supported, each with a one-line text form:
//!
//! - mutual exclusion, `!l1,l2,...,lk` (k >= 2): at most one of the labels
//!   holds for an instance;
//! - subsumption, `parent -> c1,c2,...,ck`: any child holding implies that the
//!   parent holds.
//!
//! Both kinds hold their labels as sets, so the order labels are written in
//! does not matter and serialization lists them sorted. A constraint file holds
//! one constraint per line; parsing the serialized form gives back the same
//! constraint.

mod io;
mod set;

pub use io::{from_constraints_str, load_constraints, save_constraints, to_constraints_string};
pub use set::ConstraintSet;

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::data::Label;
use crate::error::LabelFuseError;

const MUTUAL_EXCLUSION_PREFIX: char = '!';
const SUBSUMPTION_SEPARATOR: &str = " -> ";

/// A single constraint.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Constraint {
    /// At most one of `labels` may hold for an instance.
    MutualExclusion { labels: BTreeSet<Label> },
    /// Any of `children` holding implies `parent` holds.
    Subsumption { parent: Label, children: BTreeSet<Label> },
}

impl Constraint {
    pub fn mutual_exclusion<I, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        Constraint::MutualExclusion {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn subsumption<I, L>(parent: impl Into<Label>, children: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Label>,
    {
        Constraint::Subsumption {
            parent: parent.into(),
            children: children.into_iter().map(Into::into).collect(),
        }
    }

    /// Parses one constraint from its text form.
    pub fn parse(input: &str) -> Result<Self, LabelFuseError> {
        let syntax_error = |message: &str| LabelFuseError::InvalidConstraintSyntax {
            location: format!("'{}'", input),
            message: message.to_string(),
        };

        if input.is_empty() {
            return Err(syntax_error("empty constraint"));
        }

        if let Some(rest) = input.strip_prefix(MUTUAL_EXCLUSION_PREFIX) {
            let labels = parse_label_list(rest).map_err(|m| syntax_error(m.as_str()))?;
            if labels.len() < 2 {
                return Err(syntax_error(
                    "mutual exclusion needs at least two labels",
                ));
            }
            return Ok(Constraint::MutualExclusion { labels });
        }

        let (parent, children) = input
            .split_once(SUBSUMPTION_SEPARATOR)
            .ok_or_else(|| syntax_error("missing ' -> ' separator"))?;
        if children.contains(SUBSUMPTION_SEPARATOR) {
            return Err(syntax_error("more than one ' -> ' separator"));
        }
        let parent = parse_label(parent).map_err(|m| syntax_error(m.as_str()))?;
        let children = parse_label_list(children).map_err(|m| syntax_error(m.as_str()))?;
        Ok(Constraint::Subsumption { parent, children })
    }

    /// Every label the constraint mentions.
    pub fn labels(&self) -> Box<dyn Iterator<Item = &Label> + '_> {
        match self {
            Constraint::MutualExclusion { labels } => Box::new(labels.iter()),
            Constraint::Subsumption { parent, children } => {
                Box::new(std::iter::once(parent).chain(children.iter()))
            }
        }
    }

    /// Whether an assignment of truth values violates this constraint.
    pub fn is_violated_by(&self, holds: impl Fn(&Label) -> bool) -> bool {
        match self {
            Constraint::MutualExclusion { labels } => {
                labels.iter().filter(|label| holds(*label)).count() > 1
            }
            Constraint::Subsumption { parent, children } => {
                !holds(parent) && children.iter().any(|child| holds(child))
            }
        }
    }
}

fn parse_label(raw: &str) -> Result<Label, String> {
    if raw.is_empty() {
        return Err("empty label".to_string());
    }
    if raw.trim() != raw {
        return Err(format!("label '{}' has surrounding whitespace", raw));
    }
    Ok(Label::new(raw))
}

fn parse_label_list(raw: &str) -> Result<BTreeSet<Label>, String> {
    if raw.is_empty() {
        return Err("empty label list".to_string());
    }
    let mut labels = BTreeSet::new();
    for raw_label in raw.split(',') {
        let label = parse_label(raw_label)?;
        if labels.contains(&label) {
            return Err(format!("label '{}' is listed twice", label));
        }
        labels.insert(label);
    }
    Ok(labels)
}

impl FromStr for Constraint {
    type Err = LabelFuseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Constraint::parse(s)
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |labels: &BTreeSet<Label>| {
            labels
                .iter()
                .map(Label::name)
                .collect::<Vec<_>>()
                .join(",")
        };
        match self {
            Constraint::MutualExclusion { labels } => {
                write!(f, "{}{}", MUTUAL_EXCLUSION_PREFIX, join(labels))
            }
            Constraint::Subsumption { parent, children } => {
                write!(f, "{}{}{}", parent, SUBSUMPTION_SEPARATOR, join(children))
            }
        }
    }
}
