use std::collections::HashSet;

use proptest::prelude::*;
use sweep_campaign::{reconcile, ParameterSpace, ParameterValue, RunKey};

fn space(lengths: &[usize]) -> ParameterSpace {
    ParameterSpace::new(lengths.iter().enumerate().map(|(idx, len)| {
        (
            format!("p{idx}"),
            (0..*len as i64).map(ParameterValue::Int).collect::<Vec<_>>(),
        )
    }))
    .expect("space")
}

#[test]
fn missing_follows_enumeration_with_repetitions_innermost() {
    let space = ParameterSpace::new(vec![
        (
            "speed",
            vec![ParameterValue::Float(2.0), ParameterValue::Float(5.0)],
        ),
        ("nodes", vec![ParameterValue::Int(250)]),
    ])
    .expect("space");
    let plan = reconcile(&space, 2, &HashSet::new()).expect("reconcile");
    assert_eq!(plan.total, 4);
    assert_eq!(plan.to_run(), 4);
    let order: Vec<(Option<ParameterValue>, u32)> = plan
        .missing
        .iter()
        .map(|job| (job.combination.get("speed").cloned(), job.repetition))
        .collect();
    assert_eq!(
        order,
        vec![
            (Some(ParameterValue::Float(2.0)), 0),
            (Some(ParameterValue::Float(2.0)), 1),
            (Some(ParameterValue::Float(5.0)), 0),
            (Some(ParameterValue::Float(5.0)), 1),
        ]
    );
}

#[test]
fn completed_keys_outside_the_space_are_ignored() {
    let space = space(&[2]);
    let stray = RunKey {
        fingerprint: "0".repeat(64),
        repetition: 0,
    };
    let completed: HashSet<RunKey> = [stray].into_iter().collect();
    let plan = reconcile(&space, 3, &completed).expect("reconcile");
    assert_eq!(plan.to_run(), 6);
    assert_eq!(plan.completed, 0);
}

proptest! {
    #[test]
    fn reconciliation_is_a_set_difference(
        lengths in prop::collection::vec(1usize..4, 1..4),
        repetitions in 1u32..4,
        mask in prop::collection::vec(any::<bool>(), 64),
    ) {
        let space = space(&lengths);
        let required = reconcile(&space, repetitions, &HashSet::new()).expect("required");
        let completed: HashSet<RunKey> = required
            .missing
            .iter()
            .enumerate()
            .filter(|(idx, _)| mask[idx % mask.len()])
            .map(|(_, job)| job.key.clone())
            .collect();
        let plan = reconcile(&space, repetitions, &completed).expect("plan");

        prop_assert_eq!(plan.total, required.total);
        prop_assert_eq!(plan.to_run() + completed.len(), plan.total);
        prop_assert_eq!(plan.completed, completed.len());
        prop_assert!(plan.missing.iter().all(|job| !completed.contains(&job.key)));

        let again = reconcile(&space, repetitions, &completed).expect("again");
        prop_assert_eq!(again, plan);
    }
}
