use std::collections::BTreeSet;

use modelforge_conventions::build_model;
use modelforge_metadata::{HostCatalog, HostMember, HostType, ModelOptions};
use proptest::prelude::*;

/// Member names that never look like a key of `Thing`.
fn plain_names() -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set("[A-Z][a-z]{2,7}", 0..6).prop_map(|names| {
        names
            .into_iter()
            .filter(|n| !n.eq_ignore_ascii_case("thingid"))
            .collect()
    })
}

fn thing(members: &[String]) -> HostType {
    members
        .iter()
        .fold(HostType::new("Thing"), |ty, name| {
            ty.with_member(HostMember::scalar(name.as_str(), "int"))
        })
}

fn discovered_key(members: &[String]) -> Option<Vec<String>> {
    let model = build_model(
        HostCatalog::new(vec![thing(members)]),
        &[],
        ModelOptions::default(),
    );
    model.snapshot().entity_type("Thing")?.primary_key.clone()
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 128,
        failure_persistence: None,
        ..ProptestConfig::default()
    })]

    #[test]
    fn key_follows_naming_precedence(
        names in plain_names(),
        with_id in any::<bool>(),
        with_type_id in any::<bool>(),
    ) {
        let mut members: Vec<String> = names.into_iter().collect();
        if with_type_id {
            members.push("ThingId".to_string());
        }
        if with_id {
            members.push("Id".to_string());
        }

        let expected = if with_id {
            Some(vec!["Id".to_string()])
        } else if with_type_id {
            Some(vec!["ThingId".to_string()])
        } else {
            None
        };
        prop_assert_eq!(discovered_key(&members), expected);
    }

    #[test]
    fn member_order_does_not_change_the_key(
        names in plain_names(),
        with_id in any::<bool>(),
    ) {
        let mut members: Vec<String> = names.into_iter().collect();
        members.push("ThingId".to_string());
        if with_id {
            members.insert(0, "Id".to_string());
        }
        let mut reversed = members.clone();
        reversed.reverse();

        prop_assert_eq!(discovered_key(&members), discovered_key(&reversed));
    }
}
