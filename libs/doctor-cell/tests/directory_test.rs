use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{ConsultationType, DoctorError, TimeOfDay};
use doctor_cell::services::{DoctorDirectory, SupabaseDoctorDirectory};
use shared_utils::test_utils::{hex_id, MockSupabaseResponses, TestConfig};

async fn directory_for(server: &MockServer) -> SupabaseDoctorDirectory {
    SupabaseDoctorDirectory::new(&TestConfig::with_supabase(&server.uri()).to_app_config())
}

#[tokio::test]
async fn test_reads_profile_from_doctors_table() {
    let mock_server = MockServer::start().await;
    let doctor_id = hex_id();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", doctor_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_profile_row(&doctor_id, "09:00", "10:00", 15)
        ])))
        .mount(&mock_server)
        .await;

    let profile = directory_for(&mock_server).await
        .availability_profile(&doctor_id)
        .await
        .unwrap();

    assert_eq!(profile.doctor_id, doctor_id);
    assert_eq!(profile.slot_duration_minutes, 15);
    assert_eq!(profile.fee_for(ConsultationType::Video), 500.0);
    assert_eq!(profile.fee_for(ConsultationType::InPerson), 0.0);

    let grid: Vec<String> = profile.daily_grid().iter().map(TimeOfDay::to_string).collect();
    assert_eq!(grid, vec!["09:00", "09:15", "09:30", "09:45"]);
}

#[tokio::test]
async fn test_unknown_doctor_is_not_found() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let result = directory_for(&mock_server).await
        .availability_profile(&hex_id())
        .await;

    assert_matches!(result, Err(DoctorError::NotFound));
}

#[tokio::test]
async fn test_missing_hours_and_duration_fall_back() {
    let mock_server = MockServer::start().await;
    let doctor_id = hex_id();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": doctor_id,
            "availability_from": "9am",
            "availability_to": null,
            "slot_duration_minutes": null,
            "consultation_fee": { "chat": 150.0, "carrier-pigeon": 10.0 }
        }])))
        .mount(&mock_server)
        .await;

    let profile = directory_for(&mock_server).await
        .availability_profile(&doctor_id)
        .await
        .unwrap();

    assert!(profile.window.is_none());
    assert!(profile.daily_grid().is_empty());
    assert_eq!(profile.slot_duration_minutes, 15);
    assert_eq!(profile.fee_for(ConsultationType::Chat), 150.0);
}

#[tokio::test]
async fn test_out_of_range_duration_is_rejected() {
    let mock_server = MockServer::start().await;
    let doctor_id = hex_id();

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_profile_row(&doctor_id, "09:00", "17:00", 2)
        ])))
        .mount(&mock_server)
        .await;

    let result = directory_for(&mock_server).await
        .availability_profile(&doctor_id)
        .await;

    assert_matches!(result, Err(DoctorError::InvalidProfile(_)));
}

#[tokio::test]
async fn test_directory_outage_is_reported() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(503).set_body_json(
            MockSupabaseResponses::error_response("upstream down", "PGRST000"),
        ))
        .mount(&mock_server)
        .await;

    let result = directory_for(&mock_server).await
        .availability_profile(&hex_id())
        .await;

    assert_matches!(result, Err(DoctorError::Directory(_)));
}
