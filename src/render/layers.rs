//! Layered value merge.
//!
//! Effective values are computed as
//! `schema-defaults ◁ type-embedded ◁ component-parameters ◁ env-overrides`
//! where the right-hand side wins at every scalar leaf and lists are
//! replaced wholesale, never concatenated. (List concatenation is only
//! available explicitly, inside templates, through `oc_merge`-adjacent
//! expression operators.)

use crate::domain::raw::RawDoc;

/// Merge value layers left to right, right-hand wins.
pub fn merge_layers(layers: &[&RawDoc]) -> RawDoc {
    let mut acc = RawDoc::empty_map();
    for layer in layers {
        if layer.is_null() {
            continue;
        }
        acc = acc.merged(layer);
    }
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> RawDoc {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_precedence_right_wins() {
        let defaults = doc("replicas: 1\nlog:\n  level: info\n");
        let embedded = doc("log:\n  level: warn\n");
        let parameters = doc("replicas: 3\n");
        let overrides = doc("log:\n  level: debug\n");

        let effective = merge_layers(&[&defaults, &embedded, &parameters, &overrides]);
        assert_eq!(effective.lookup("replicas"), Some(&RawDoc::Int(3)));
        assert_eq!(
            effective.lookup("log.level"),
            Some(&RawDoc::String("debug".into()))
        );
    }

    #[test]
    fn test_lists_replace_not_concatenate() {
        let left = doc("args: [a, b]\n");
        let right = doc("args: [c]\n");
        let effective = merge_layers(&[&left, &right]);
        assert_eq!(
            effective.lookup("args"),
            Some(&RawDoc::List(vec![RawDoc::String("c".into())]))
        );
    }

    #[test]
    fn test_null_layers_skipped() {
        let params = doc("x: 1\n");
        let effective = merge_layers(&[&RawDoc::Null, &params, &RawDoc::Null]);
        assert_eq!(effective.lookup("x"), Some(&RawDoc::Int(1)));
    }
}
