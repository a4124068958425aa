use labelfuse::constraint::{from_constraints_str, to_constraints_string, Constraint};
use proptest::prelude::*;

mod proptest_helpers;

proptest! {
    #![proptest_config(proptest_helpers::proptest_config())]

    #[test]
    fn parse_serialize_parse_is_stable(constraint in proptest_helpers::arb_constraint()) {
        let text = constraint.to_string();
        let parsed = Constraint::parse(&text).expect("parse serialized constraint");
        prop_assert_eq!(&parsed, &constraint);
        let reparsed = Constraint::parse(&parsed.to_string()).expect("parse twice");
        prop_assert_eq!(reparsed, parsed);
    }

    #[test]
    fn written_label_order_is_irrelevant(constraint in proptest_helpers::arb_constraint()) {
        let reversed = match &constraint {
            Constraint::MutualExclusion { labels } => format!(
                "!{}",
                labels.iter().rev().map(|l| l.name()).collect::<Vec<_>>().join(",")
            ),
            Constraint::Subsumption { parent, children } => format!(
                "{} -> {}",
                parent,
                children.iter().rev().map(|l| l.name()).collect::<Vec<_>>().join(",")
            ),
        };
        let parsed = Constraint::parse(&reversed).expect("parse reversed constraint");
        prop_assert_eq!(parsed.to_string(), constraint.to_string());
        prop_assert_eq!(parsed, constraint);
    }

    #[test]
    fn constraint_file_roundtrip(set in proptest_helpers::arb_constraint_set(8)) {
        let text = to_constraints_string(&set);
        let restored = from_constraints_str(&text).expect("parse constraint file");
        prop_assert_eq!(restored, set);
    }

    #[test]
    fn hierarchy_root_is_the_label_or_an_ancestor(set in proptest_helpers::arb_constraint_set(8)) {
        for label in set.labels() {
            let root = set.hierarchy_root(&label);
            prop_assert!(root == label || set.ancestors(&label).contains(&root));
        }
    }

    #[test]
    fn components_partition_the_labels(set in proptest_helpers::arb_constraint_set(8)) {
        let mut seen: Vec<_> = set.components().into_iter().flatten().collect();
        let count = seen.len();
        seen.sort();
        seen.dedup();
        prop_assert_eq!(seen.len(), count);
        prop_assert_eq!(seen, set.labels().into_iter().collect::<Vec<_>>());
    }
}
