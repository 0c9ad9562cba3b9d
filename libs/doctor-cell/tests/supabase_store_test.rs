use assert_matches::assert_matches;
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{RuleKind, ScheduleError};
use doctor_cell::services::store::{ScheduleRuleStore, SupabaseScheduleRuleStore};
use shared_utils::test_utils::{time, MockSupabaseResponses, TestConfig};

#[tokio::test]
async fn test_active_rules_are_fetched_by_doctor() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();

    let doctor_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_rules"))
        .and(query_param("doctor_id", format!("eq.{}", doctor_id)))
        .and(query_param("is_active", "eq.true"))
        .and(header("apikey", "test-service-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::weekly_rule_response(rule_id, doctor_id, 1)
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleRuleStore::new(&config);
    let rules = store.active_rules_for(doctor_id).await.unwrap();

    assert_eq!(rules.len(), 1);
    assert_eq!(rules[0].id, rule_id);
    assert_eq!(rules[0].kind, RuleKind::WeeklyRecurring { day_of_week: 1 });
    assert_eq!(rules[0].time_slots[0].start_time, time(9, 0));
    assert_eq!(rules[0].time_slots[0].label.as_deref(), Some("Consultas"));
}

#[tokio::test]
async fn test_exception_row_decodes_date_range() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();

    let doctor_id = Uuid::new_v4();
    let rule_id = Uuid::new_v4();
    let mut row = MockSupabaseResponses::weekly_rule_response(rule_id, doctor_id, 1);
    row["type"] = json!("exception");
    row["start_date"] = json!("2025-03-01");
    row["end_date"] = json!("2025-03-09");
    row["day_of_week"] = json!(null);
    row["is_available"] = json!(false);

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_rules"))
        .and(query_param("id", format!("eq.{}", rule_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([row])))
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleRuleStore::new(&config);
    let rule = store.get(rule_id).await.unwrap().expect("rule exists");

    assert_matches!(rule.kind, RuleKind::Exception { end_date: Some(_), .. });
    assert!(!rule.is_available);
}

#[tokio::test]
async fn test_backend_failure_surfaces_as_database_error() {
    let mock_server = MockServer::start().await;
    let config = TestConfig::with_url(&mock_server.uri()).to_app_config();

    Mock::given(method("GET"))
        .and(path("/rest/v1/schedule_rules"))
        .respond_with(ResponseTemplate::new(500).set_body_json(
            MockSupabaseResponses::error_response("boom", "XX000"),
        ))
        .mount(&mock_server)
        .await;

    let store = SupabaseScheduleRuleStore::new(&config);
    let result = store.active_rules_for(Uuid::new_v4()).await;

    assert_matches!(result, Err(ScheduleError::Database(_)));
}
