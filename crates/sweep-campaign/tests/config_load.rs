use sweep_campaign::{
    load_config, CampaignConfig, CampaignManager, ParameterValue, StoreKind, SweepError,
};

const CLUSTERING: &str = r#"
name: ecs_clustering_v1
repetitions: 30
parameters:
  runTime: 600
  totalNodes: [250, 500, 750, 1000]
  hops: [1]
  areaWidth: 2000
  areaLength: 2000
  travellerVelocity: [2.0, 5.0, 10.0, 15.0, 18.0]
"#;

#[test]
fn yaml_config_keeps_declaration_order_and_promotes_scalars() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("campaign.yaml");
    std::fs::write(&path, CLUSTERING).expect("write");
    let config = load_config(&path).expect("load");
    assert_eq!(config.repetitions, 30);
    assert_eq!(config.storage, StoreKind::Jsonl);

    let space = config.space().expect("space");
    assert_eq!(
        space.schema(),
        vec![
            "runTime",
            "totalNodes",
            "hops",
            "areaWidth",
            "areaLength",
            "travellerVelocity"
        ]
    );
    assert_eq!(space.len(), 20);
    assert_eq!(
        space.parameters()[0].values,
        vec![ParameterValue::Int(600)]
    );
    assert_eq!(
        space.parameters()[5].values[0],
        ParameterValue::Float(2.0)
    );
}

#[test]
fn config_roundtrips_through_yaml() {
    let config: CampaignConfig = serde_yaml::from_str(CLUSTERING).expect("parse");
    let text = config.to_yaml_string().expect("serialize");
    let back: CampaignConfig = serde_yaml::from_str(&text).expect("reparse");
    assert_eq!(config, back);
}

#[test]
fn open_from_config_reports_full_sweep() {
    let config: CampaignConfig = serde_yaml::from_str(CLUSTERING).expect("parse");
    let root = tempfile::tempdir().expect("tmp dir");
    let manager = CampaignManager::new(root.path());
    let campaign = manager.open_from_config(&config).expect("open");
    assert_eq!(manager.missing_count(&campaign).expect("count"), (600, 600));
    assert!(root.path().join("ecs_clustering_v1/campaign.json").exists());
}

#[test]
fn missing_config_file_is_a_configuration_error() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let err = load_config(dir.path().join("absent.yaml")).expect_err("missing");
    assert!(matches!(err, SweepError::Configuration(_)));
    assert_eq!(err.info().code, "config-read");
}

#[test]
fn malformed_yaml_reports_where_it_broke() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("broken.yaml");
    std::fs::write(&path, "name: broken\nparameters:\n  nodes: [1, 2\n").expect("write");
    let err = load_config(&path).expect_err("malformed");
    assert!(matches!(err, SweepError::Configuration(_)));
    assert_eq!(err.info().code, "config-parse");
    assert!(err.info().context.contains_key("path"));
    assert!(err.info().context.contains_key("line"));
}
