use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{AppointmentError, LedgerHeader, Reservation, SlotClaim};
use appointment_cell::services::{BookingEngine, LedgerStore, SupabaseBookingStore};
use doctor_cell::models::{ConsultationType, TimeOfDay};
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

const DOCTOR: &str = "65f1c0a2b3d4e5f601234568";
const PATIENT: &str = "65f1c0a2b3d4e5f601234501";
const DATE: &str = "2030-01-15";

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 15).unwrap()
}

fn t(text: &str) -> TimeOfDay {
    TimeOfDay::parse(text).unwrap()
}

fn store_for(server: &MockServer) -> SupabaseBookingStore {
    let config = TestConfig::with_supabase(&server.uri()).to_app_config();
    SupabaseBookingStore::new(Arc::new(SupabaseClient::new(&config)))
}

fn header_row(id: Uuid) -> Value {
    json!({
        "id": id,
        "doctor_id": DOCTOR,
        "date": DATE,
        "availability_from": "09:00",
        "availability_to": "09:45",
        "slot_duration_minutes": 15,
        "consultation_fee": { "chat": 200.0, "voice": 300.0, "video": 500.0 },
        "created_at": "2030-01-01T00:00:00Z"
    })
}

fn slot_row(id: Uuid, time: &str, booking_ref: Option<Uuid>) -> Value {
    let booked = booking_ref.is_some();
    json!({
        "id": id,
        "doctor_id": DOCTOR,
        "date": DATE,
        "time_of_day": time,
        "status": if booked { "booked" } else { "free" },
        "booking_ref": booking_ref,
        "booked_at": if booked { json!("2030-01-01T08:00:00Z") } else { Value::Null },
        "consultation_type": if booked { json!("chat") } else { Value::Null },
        "fee": if booked { json!(200.0) } else { Value::Null }
    })
}

fn appointment_row(id: Uuid, slot_id: Uuid) -> Value {
    json!({
        "id": id,
        "patient_id": PATIENT,
        "doctor_id": DOCTOR,
        "consultation_type": "chat",
        "date": DATE,
        "start_time": "09:15",
        "end_time": "09:30",
        "scheduled_at": "2030-01-15T09:15:00",
        "slot_id": slot_id,
        "fee": 200.0,
        "status": "booked",
        "payment_status": "paid",
        "notes": null,
        "cancelled_at": null,
        "cancel_reason": null,
        "cancelled_by": null,
        "rescheduled_by": null,
        "completed_at": null,
        "created_at": "2030-01-01T08:00:00Z",
        "updated_at": "2030-01-01T08:00:00Z"
    })
}

fn claim() -> SlotClaim {
    SlotClaim {
        booking_ref: Uuid::new_v4(),
        consultation_type: ConsultationType::Chat,
        fee: 200.0,
        booked_at: Utc::now(),
    }
}

/// Doctor profile, an existing ledger header and three free slot rows.
async fn mount_materialized_day(server: &MockServer, slot_ids: &[Uuid; 3]) {
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", format!("eq.{}", DOCTOR)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::doctor_profile_row(DOCTOR, "09:00", "09:45", 15)
        ])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_ledgers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([header_row(Uuid::new_v4())])))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("order", "time_of_day.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(slot_ids[0], "09:00", None),
            slot_row(slot_ids[1], "09:15", None),
            slot_row(slot_ids[2], "09:30", None),
        ])))
        .mount(server)
        .await;
}

fn reservation() -> Reservation {
    Reservation {
        patient_id: PATIENT.to_string(),
        doctor_id: DOCTOR.to_string(),
        date: date(),
        time: t("09:15"),
        consultation_type: ConsultationType::Chat,
        notes: None,
    }
}

#[tokio::test]
async fn test_claim_is_a_conditional_patch() {
    let mock_server = MockServer::start().await;
    let slot_id = Uuid::new_v4();
    let claim = claim();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("doctor_id", format!("eq.{}", DOCTOR)))
        .and(query_param("date", format!("eq.{}", DATE)))
        .and(query_param("time_of_day", "eq.09:15"))
        .and(query_param("status", "eq.free"))
        .and(body_partial_json(json!({ "status": "booked", "booking_ref": claim.booking_ref })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(slot_id, "09:15", Some(claim.booking_ref))
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let slot = store_for(&mock_server)
        .claim_slot(DOCTOR, date(), t("09:15"), &claim)
        .await
        .unwrap()
        .expect("claim should win");

    assert_eq!(slot.id, slot_id);
    assert_eq!(slot.booking_ref, Some(claim.booking_ref));
}

#[tokio::test]
async fn test_lost_claim_returns_none() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("status", "eq.free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let slot = store_for(&mock_server)
        .claim_slot(DOCTOR, date(), t("09:15"), &claim())
        .await
        .unwrap();

    assert!(slot.is_none());
}

#[tokio::test]
async fn test_release_is_guarded_by_booking_ref() {
    let mock_server = MockServer::start().await;
    let (slot_id, booking_ref) = (Uuid::new_v4(), Uuid::new_v4());

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("id", format!("eq.{}", slot_id)))
        .and(query_param("booking_ref", format!("eq.{}", booking_ref)))
        .and(query_param("status", "eq.booked"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([slot_row(slot_id, "09:15", None)])))
        .mount(&mock_server)
        .await;

    // Any other holder matches no row
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    let store = store_for(&mock_server);
    assert!(store.release_slot(slot_id, booking_ref).await.unwrap());
    assert!(!store.release_slot(slot_id, Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_ledger_insert_reads_back_existing() {
    let mock_server = MockServer::start().await;
    let existing_id = Uuid::new_v4();

    Mock::given(method("POST"))
        .and(path("/rest/v1/booking_ledgers"))
        .and(query_param("on_conflict", "doctor_id,date"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(1)
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/booking_ledgers"))
        .and(query_param("doctor_id", format!("eq.{}", DOCTOR)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([header_row(existing_id)])))
        .mount(&mock_server)
        .await;

    let profile = doctor_cell::models::DoctorAvailabilityProfile::new(DOCTOR, None, 30);
    let candidate = LedgerHeader::from_profile(&profile, date());

    let stored = store_for(&mock_server).insert_ledger(candidate).await.unwrap();

    assert_eq!(stored.id, existing_id);
    assert_eq!(stored.slot_duration_minutes, 15);
    assert_eq!(stored.grid().len(), 3);
}

#[tokio::test]
async fn test_engine_books_through_postgrest() {
    let mock_server = MockServer::start().await;
    let slot_ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    mount_materialized_day(&mock_server, &slot_ids).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("time_of_day", "eq.09:15"))
        .and(query_param("status", "eq.free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(slot_ids[1], "09:15", Some(Uuid::new_v4()))
        ])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let stored_id = Uuid::new_v4();
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "patient_id": PATIENT, "status": "booked", "payment_status": "paid" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([appointment_row(stored_id, slot_ids[1])])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = BookingEngine::from_config(&TestConfig::with_supabase(&mock_server.uri()).to_app_config());
    let appointment = engine.reserve_and_confirm(reservation()).await.unwrap();

    assert_eq!(appointment.id, stored_id);
    assert_eq!(appointment.slot_id, slot_ids[1]);
    assert_eq!(appointment.fee, 200.0);
}

#[tokio::test]
async fn test_engine_reports_lost_race_from_postgrest() {
    let mock_server = MockServer::start().await;
    let slot_ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    mount_materialized_day(&mock_server, &slot_ids).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("status", "eq.free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&mock_server)
        .await;

    let engine = BookingEngine::from_config(&TestConfig::with_supabase(&mock_server.uri()).to_app_config());
    let result = engine.reserve_and_confirm(reservation()).await;

    assert_matches!(result, Err(AppointmentError::SlotUnavailable { .. }));
}

#[tokio::test]
async fn test_engine_releases_claim_when_appointment_insert_fails() {
    let mock_server = MockServer::start().await;
    let slot_ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    mount_materialized_day(&mock_server, &slot_ids).await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("status", "eq.free"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            slot_row(slot_ids[1], "09:15", Some(Uuid::new_v4()))
        ])))
        .mount(&mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(400).set_body_json(
            MockSupabaseResponses::error_response("violates check constraint", "23514"),
        ))
        .mount(&mock_server)
        .await;

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&mock_server)
        .await;

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("id", format!("eq.{}", slot_ids[1])))
        .and(query_param("status", "eq.booked"))
        .and(body_partial_json(json!({ "status": "free", "booking_ref": null })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([slot_row(slot_ids[1], "09:15", None)])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = BookingEngine::from_config(&TestConfig::with_supabase(&mock_server.uri()).to_app_config());
    let result = engine.reserve_and_confirm(reservation()).await;

    assert_matches!(result, Err(AppointmentError::Storage(_)));
}

#[tokio::test]
async fn test_engine_books_in_person_through_postgrest() {
    let mock_server = MockServer::start().await;
    let slot_ids = [Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4()];
    mount_materialized_day(&mock_server, &slot_ids).await;

    let mut held = slot_row(slot_ids[1], "09:15", Some(Uuid::new_v4()));
    held["consultation_type"] = json!("in-person");
    held["fee"] = json!(0.0);
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/ledger_slots"))
        .and(query_param("status", "eq.free"))
        .and(body_partial_json(json!({ "consultation_type": "in-person", "fee": 0.0 })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([held])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let stored_id = Uuid::new_v4();
    let mut row = appointment_row(stored_id, slot_ids[1]);
    row["consultation_type"] = json!("in-person");
    row["fee"] = json!(0.0);
    row["payment_status"] = json!("waived");
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(body_partial_json(json!({ "consultation_type": "in-person", "payment_status": "waived" })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([row])))
        .expect(1)
        .mount(&mock_server)
        .await;

    let engine = BookingEngine::from_config(&TestConfig::with_supabase(&mock_server.uri()).to_app_config());
    let appointment = engine
        .reserve_and_confirm(Reservation { consultation_type: ConsultationType::InPerson, ..reservation() })
        .await
        .unwrap();

    assert_eq!(appointment.consultation_type, ConsultationType::InPerson);
    assert_eq!(appointment.fee, 0.0);
}
