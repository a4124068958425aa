//! Unordered collections of constraints and the queries integrators run on them.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use super::Constraint;
use crate::data::{Label, ObservedInstance};
use crate::error::LabelFuseError;

/// The constraints of one run. Duplicates collapse.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstraintSet {
    constraints: BTreeSet<Constraint>,
}

impl ConstraintSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a constraint, returning false if it was already present.
    pub fn insert(&mut self, constraint: Constraint) -> bool {
        self.constraints.insert(constraint)
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter()
    }

    /// Every label mentioned by any constraint.
    pub fn labels(&self) -> BTreeSet<Label> {
        self.constraints
            .iter()
            .flat_map(|c| c.labels().cloned().collect::<Vec<_>>())
            .collect()
    }

    /// Direct parents of each label, from subsumption constraints.
    fn parents(&self) -> BTreeMap<&Label, BTreeSet<&Label>> {
        let mut parents: BTreeMap<&Label, BTreeSet<&Label>> = BTreeMap::new();
        for constraint in &self.constraints {
            if let Constraint::Subsumption { parent, children } = constraint {
                for child in children {
                    if child != parent {
                        parents.entry(child).or_default().insert(parent);
                    }
                }
            }
        }
        parents
    }

    /// All labels implied by `label` through subsumption, excluding `label`
    /// itself unless it sits on a cycle.
    pub fn ancestors(&self, label: &Label) -> BTreeSet<Label> {
        let parents = self.parents();
        let mut seen: BTreeSet<Label> = BTreeSet::new();
        let mut queue: VecDeque<&Label> = VecDeque::new();
        queue.push_back(label);
        while let Some(current) = queue.pop_front() {
            if let Some(direct) = parents.get(current) {
                for parent in direct {
                    if seen.insert((*parent).clone()) {
                        queue.push_back(*parent);
                    }
                }
            }
        }
        seen
    }

    /// The top of the subsumption hierarchy containing `label`.
    ///
    /// With several roots the smallest one is returned; a label outside any
    /// hierarchy is its own root.
    pub fn hierarchy_root(&self, label: &Label) -> Label {
        let parents = self.parents();
        let mut closure = self.ancestors(label);
        closure.insert(label.clone());
        closure
            .iter()
            .find(|candidate| !parents.contains_key(candidate))
            .or_else(|| closure.iter().next())
            .cloned()
            .unwrap_or_else(|| label.clone())
    }

    /// Groups of labels linked, directly or transitively, by any constraint.
    ///
    /// Each group is sorted and the groups are sorted by their first label.
    pub fn components(&self) -> Vec<Vec<Label>> {
        let labels: Vec<Label> = self.labels().into_iter().collect();
        let index: BTreeMap<&Label, usize> =
            labels.iter().enumerate().map(|(i, l)| (l, i)).collect();
        let mut root: Vec<usize> = (0..labels.len()).collect();

        fn find(root: &mut [usize], mut i: usize) -> usize {
            while root[i] != i {
                root[i] = root[root[i]];
                i = root[i];
            }
            i
        }

        for constraint in &self.constraints {
            let mut members = constraint.labels().map(|l| index[l]);
            if let Some(first) = members.next() {
                for other in members {
                    let a = find(&mut root, first);
                    let b = find(&mut root, other);
                    if a != b {
                        root[a.max(b)] = a.min(b);
                    }
                }
            }
        }

        let mut groups: BTreeMap<usize, Vec<Label>> = BTreeMap::new();
        for i in 0..labels.len() {
            let r = find(&mut root, i);
            groups.entry(r).or_default().push(labels[i].clone());
        }
        groups.into_values().collect()
    }

    /// Number of constraints violated by an assignment.
    pub fn violations(&self, holds: impl Fn(&Label) -> bool) -> usize {
        self.constraints
            .iter()
            .filter(|c| c.is_violated_by(&holds))
            .count()
    }

    /// Checks that every label can hold in some feasible assignment.
    ///
    /// A label that implies (itself or through subsumption) two labels of one
    /// mutual exclusion can never hold, e.g. `!animal,dog` next to
    /// `animal -> dog`.
    pub fn validate(&self) -> Result<(), LabelFuseError> {
        for label in self.labels() {
            let mut implied = self.ancestors(&label);
            implied.insert(label.clone());
            if let Some((constraint, a, b)) = self.excluded_pair(&implied) {
                return Err(LabelFuseError::UnsatisfiableConstraintSet(format!(
                    "label '{}' can never hold: it implies '{}' and '{}', which are mutually exclusive ('{}')",
                    label, a, b, constraint
                )));
            }
        }
        Ok(())
    }

    /// Checks that the observed labels of each instance satisfy the constraints.
    pub fn validate_observations(
        &self,
        observed: &[ObservedInstance],
    ) -> Result<(), LabelFuseError> {
        let mut by_instance: BTreeMap<i64, (BTreeSet<Label>, BTreeSet<Label>)> = BTreeMap::new();
        for instance in observed {
            let entry = by_instance.entry(instance.id).or_default();
            if instance.value {
                entry.0.insert(instance.label.clone());
            } else {
                entry.1.insert(instance.label.clone());
            }
        }

        for (id, (positive, negative)) in by_instance {
            let mut implied = BTreeSet::new();
            for label in &positive {
                let ancestors = self.ancestors(label);
                if let Some(conflict) = ancestors.iter().find(|a| negative.contains(*a)) {
                    return Err(LabelFuseError::UnsatisfiableConstraintSet(format!(
                        "instance {}: '{}' is observed true but implies '{}', which is observed false",
                        id, label, conflict
                    )));
                }
                implied.insert(label.clone());
                implied.extend(ancestors);
            }
            if let Some((constraint, a, b)) = self.excluded_pair(&implied) {
                return Err(LabelFuseError::UnsatisfiableConstraintSet(format!(
                    "instance {}: observed labels imply both '{}' and '{}' ('{}')",
                    id, a, b, constraint
                )));
            }
        }
        Ok(())
    }

    /// Finds a mutual exclusion with two listed labels both in `holding`.
    fn excluded_pair(&self, holding: &BTreeSet<Label>) -> Option<(&Constraint, Label, Label)> {
        self.constraints.iter().find_map(|constraint| match constraint {
            Constraint::MutualExclusion { labels } => {
                let mut hits = labels.iter().filter(|l| holding.contains(*l));
                match (hits.next(), hits.next()) {
                    (Some(a), Some(b)) => Some((constraint, a.clone(), b.clone())),
                    _ => None,
                }
            }
            Constraint::Subsumption { .. } => None,
        })
    }
}

impl FromIterator<Constraint> for ConstraintSet {
    fn from_iter<T: IntoIterator<Item = Constraint>>(iter: T) -> Self {
        Self {
            constraints: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a ConstraintSet {
    type Item = &'a Constraint;
    type IntoIter = std::collections::btree_set::Iter<'a, Constraint>;

    fn into_iter(self) -> Self::IntoIter {
        self.constraints.iter()
    }
}
