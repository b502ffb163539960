use proptest::prelude::*;
use sweep_campaign::{ParameterCombination, ParameterSpace, ParameterValue};

fn ints(values: &[i64]) -> Vec<ParameterValue> {
    values.iter().copied().map(ParameterValue::Int).collect()
}

fn floats(values: &[f64]) -> Vec<ParameterValue> {
    values.iter().copied().map(ParameterValue::Float).collect()
}

fn clustering_space() -> ParameterSpace {
    ParameterSpace::new(vec![
        ("runTime", ints(&[600])),
        ("totalNodes", ints(&[250, 500, 750, 1000])),
        ("hops", ints(&[1])),
        ("areaWidth", ints(&[2000])),
        ("areaLength", ints(&[2000])),
        ("travellerVelocity", floats(&[2.0, 5.0, 10.0, 15.0, 18.0])),
    ])
    .expect("space")
}

#[test]
fn swept_and_fixed_axes_multiply() {
    let space = clustering_space();
    assert_eq!(space.len(), 20);
    assert_eq!(space.iter().count(), 20);
    for combination in &space {
        assert_eq!(combination.len(), 6);
        space.validate(&combination).expect("valid combination");
    }
}

#[test]
fn enumeration_is_restartable_and_deterministic() {
    let space = clustering_space();
    let first: Vec<_> = space.iter().collect();
    let second = space.to_vec();
    assert_eq!(first, second);
    let fingerprints: Vec<String> = first
        .iter()
        .map(|c| c.fingerprint().expect("fingerprint"))
        .collect();
    let mut unique = fingerprints.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), fingerprints.len());
}

#[test]
fn first_declared_parameter_is_outermost() {
    let space = clustering_space();
    let combos = space.to_vec();
    assert_eq!(combos[0].get("totalNodes"), Some(&ParameterValue::Int(250)));
    assert_eq!(
        combos[0].get("travellerVelocity"),
        Some(&ParameterValue::Float(2.0))
    );
    assert_eq!(
        combos[1].get("travellerVelocity"),
        Some(&ParameterValue::Float(5.0))
    );
    assert_eq!(combos[5].get("totalNodes"), Some(&ParameterValue::Int(500)));
}

#[test]
fn empty_configurations_are_rejected() {
    let none: Vec<(&str, Vec<ParameterValue>)> = Vec::new();
    let err = ParameterSpace::new(none).expect_err("empty space");
    assert_eq!(err.info().code, "space-empty");

    let err = ParameterSpace::new(vec![("a", ints(&[1])), ("b", Vec::new())])
        .expect_err("empty list");
    assert_eq!(err.info().code, "space-empty-values");
    assert_eq!(err.info().context.get("parameter").map(String::as_str), Some("b"));
    assert!(err.is_fatal());
}

#[test]
fn validate_rejects_foreign_combinations() {
    let space = ParameterSpace::new(vec![("a", ints(&[1, 2])), ("b", ints(&[3]))]).expect("space");
    let unknown: ParameterCombination = vec![
        ("a".to_string(), ParameterValue::Int(1)),
        ("b".to_string(), ParameterValue::Int(3)),
        ("c".to_string(), ParameterValue::Int(0)),
    ]
    .into_iter()
    .collect();
    assert_eq!(
        space.validate(&unknown).unwrap_err().info().code,
        "combination-unknown-key"
    );
    let missing: ParameterCombination = vec![("a".to_string(), ParameterValue::Int(1))]
        .into_iter()
        .collect();
    assert_eq!(
        space.validate(&missing).unwrap_err().info().code,
        "combination-missing-key"
    );
    let foreign: ParameterCombination = vec![
        ("a".to_string(), ParameterValue::Int(9)),
        ("b".to_string(), ParameterValue::Int(3)),
    ]
    .into_iter()
    .collect();
    assert_eq!(
        space.validate(&foreign).unwrap_err().info().code,
        "combination-foreign-value"
    );
}

proptest! {
    #[test]
    fn cardinality_is_product_of_list_lengths(lengths in prop::collection::vec(1usize..5, 1..5)) {
        let params: Vec<(String, Vec<ParameterValue>)> = lengths
            .iter()
            .enumerate()
            .map(|(idx, len)| {
                let values = (0..*len as i64).map(ParameterValue::Int).collect();
                (format!("p{idx}"), values)
            })
            .collect();
        let space = ParameterSpace::new(params).expect("space");
        let expected: usize = lengths.iter().product();
        prop_assert_eq!(space.len(), expected);
        prop_assert_eq!(space.iter().count(), expected);
        prop_assert_eq!(space.iter().collect::<Vec<_>>(), space.to_vec());
    }
}
