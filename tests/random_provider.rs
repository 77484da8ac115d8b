use hemmer_provider_xyz::testing::{
    assert_plan_changes_attribute, assert_plan_creates, assert_plan_no_changes,
    assert_plan_replaces, ProviderTester,
};
use hemmer_provider_xyz::{provider, InferredProvider, ProviderError};
use serde_json::json;

const RANDOM: &str = "xyz_random";

fn tester() -> ProviderTester<InferredProvider> {
    ProviderTester::new(provider())
}

fn is_alphanumeric(s: &str) -> bool {
    s.chars().all(|c| c.is_ascii_alphanumeric())
}

#[test]
fn test_schema_exposes_random() {
    let schema = tester().schema();
    let random = schema.resources.get(RANDOM).expect("xyz_random registered");

    let length = random.attribute("length").unwrap();
    assert!(length.flags.required);
    assert!(length.force_new);

    let result = random.attribute("result").unwrap();
    assert!(result.flags.computed);
}

#[test]
fn test_configure_accepts_empty_config() {
    let tester = tester();
    tokio_test::block_on(async {
        tester.configure(json!({})).await.unwrap();
        tester.configure(serde_json::Value::Null).await.unwrap();
    });
}

#[tokio::test]
async fn test_create_generates_string_of_requested_length() {
    let tester = tester();
    for length in [0u64, 1, 10, 64, 1000] {
        let created = tester
            .lifecycle_create(RANDOM, "r", json!({ "length": length }))
            .await
            .unwrap();

        assert_eq!(created.id, "r");
        assert_eq!(created.state["length"], length);
        let result = created.state["result"].as_str().unwrap();
        assert_eq!(result.len() as u64, length);
        assert!(is_alphanumeric(result), "unexpected character in {:?}", result);
    }
}

#[tokio::test]
async fn test_preview_has_no_result() {
    let plan = tester()
        .plan_create(RANDOM, "r", json!({"length": 12}))
        .await
        .unwrap();

    assert_plan_creates(&plan);
    assert_eq!(plan.planned_state, json!({"length": 12}));
}

#[tokio::test]
async fn test_unchanged_length_plans_no_changes() {
    let tester = tester();
    let created = tester
        .lifecycle_create(RANDOM, "r", json!({"length": 5}))
        .await
        .unwrap();

    let plan = tester
        .plan_update(RANDOM, "r", created.state.clone(), json!({"length": 5}))
        .await
        .unwrap();
    assert_plan_no_changes(&plan);
    assert_eq!(plan.planned_state, created.state);
}

#[tokio::test]
async fn test_changed_length_replaces() {
    let tester = tester();
    let created = tester
        .lifecycle_create(RANDOM, "r", json!({"length": 5}))
        .await
        .unwrap();

    let plan = tester
        .plan_update(RANDOM, "r", created.state.clone(), json!({"length": 7}))
        .await
        .unwrap();
    assert_plan_replaces(&plan);
    assert_plan_changes_attribute(&plan, "length");

    let replaced = tester
        .lifecycle_change(RANDOM, "r", created, json!({"length": 7}))
        .await
        .unwrap();
    assert_eq!(replaced.state["result"].as_str().unwrap().len(), 7);
}

#[tokio::test]
async fn test_delete() {
    let tester = tester();
    let created = tester
        .lifecycle_create(RANDOM, "r", json!({"length": 3}))
        .await
        .unwrap();

    let plan = tester
        .plan_delete(RANDOM, "r", created.state.clone())
        .await
        .unwrap();
    assert_plan_no_changes(&plan);

    tester.lifecycle_delete(RANDOM, "r", created).await.unwrap();
}

#[tokio::test]
async fn test_unknown_resource_type() {
    let err = tester()
        .plan_create("xyz_other", "r", json!({"length": 3}))
        .await
        .unwrap_err();
    assert!(matches!(err, ProviderError::UnknownResource(_)));
}

#[tokio::test]
async fn test_invalid_length_is_rejected() {
    let tester = tester();
    for config in [json!({"length": -1}), json!({"length": "ten"}), json!({})] {
        let err = tester.plan_create(RANDOM, "r", config).await.unwrap_err();
        assert!(matches!(err, ProviderError::Serialization(_)));
    }
}
