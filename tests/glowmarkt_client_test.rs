use chrono::{DateTime, NaiveTime, Utc};
use glowmarkt_bridge::glowmarkt::{
    DailyWindow, GlowClient, Resource, SupplyType, Unit, UsageOutcome,
};
use glowmarkt_bridge::error::GlowError;
use mockito::{Matcher, Server};
use serde_json::json;
use std::time::Duration;

fn client(url: &str) -> GlowClient {
    GlowClient::new(url, "app-id", Duration::from_secs(2)).unwrap()
}

fn resource(id: &str, classifier: &str) -> Resource {
    Resource {
        id: id.into(),
        name: classifier.into(),
        classifier: classifier.into(),
        base_unit: None,
        supply: SupplyType::from_classifier(classifier),
    }
}

fn summer_window() -> DailyWindow {
    let now: DateTime<Utc> = DateTime::parse_from_rfc3339("2024-07-15T11:20:42Z")
        .unwrap()
        .with_timezone(&Utc);
    DailyWindow::for_instant(
        now,
        chrono_tz::Europe::London,
        NaiveTime::from_hms_opt(1, 5, 0).unwrap(),
    )
}

#[tokio::test]
async fn authenticate_success_returns_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/auth")
        .match_header("applicationId", "app-id")
        .match_body(Matcher::Json(json!({"username": "u@x", "password": "pw"})))
        .with_status(200)
        .with_body(json!({"valid": true, "token": "T", "exp": 1_900_000_000}).to_string())
        .create_async()
        .await;

    let cred = client(&server.url()).authenticate("u@x", "pw").await.unwrap();
    assert_eq!(cred.token.as_deref(), Some("T"));
    assert_eq!(cred.expiry.unwrap().timestamp(), 1_900_000_000);
    assert_eq!(cred.application_id, "app-id");
    mock.assert_async().await;
}

#[tokio::test]
async fn authenticate_invalid_credentials() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/auth")
        .with_status(200)
        .with_body(r#"{"valid": false}"#)
        .create_async()
        .await;

    let err = client(&server.url()).authenticate("u", "bad").await.unwrap_err();
    assert!(matches!(err, GlowError::InvalidAuth { .. }));
}

#[tokio::test]
async fn authenticate_timeout_is_cannot_connect() {
    // Accepts connections but never answers
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let c = GlowClient::new(&url, "app-id", Duration::from_millis(200)).unwrap();

    let err = c.authenticate("u", "p").await.unwrap_err();
    assert!(matches!(err, GlowError::CannotConnect { .. }));
    drop(listener);
}

#[tokio::test]
async fn list_resources_maps_descriptors_and_refusals() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/resource")
        .match_header("token", "good")
        .match_header("applicationId", "app-id")
        .with_status(200)
        .with_body(
            json!([
                {"resourceId": "e1", "name": "electricity consumption",
                 "classifier": "electricity.consumption", "baseUnit": "kWh",
                 "dataSourceResourceTypeInfo": {"type": "ELEC"}},
                {"resourceId": "g2", "name": "gas cost",
                 "classifier": "gas.consumption.cost", "baseUnit": "pence",
                 "dataSourceResourceTypeInfo": {"type": "GAS"}}
            ])
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/resource")
        .match_header("token", "bad")
        .with_status(404)
        .create_async()
        .await;

    let c = client(&server.url());
    let resources = c.list_resources("good").await.unwrap();
    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0].supply, SupplyType::Electricity);
    assert!(resources[1].is_cost());

    assert!(c.list_resources("bad").await.unwrap_err().is_auth());
}

#[tokio::test]
async fn get_usage_catches_up_then_sums_readings() {
    let mut server = Server::new_async().await;
    let catchup = server
        .mock("GET", "/resource/e1/catchup")
        .match_header("token", "T")
        .with_status(200)
        .with_body("{}")
        .expect(1)
        .create_async()
        .await;
    let readings = server
        .mock("GET", "/resource/e1/readings")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("from".into(), "2024-07-15T00:00:00".into()),
            Matcher::UrlEncoded("to".into(), "2024-07-15T12:20:00".into()),
            Matcher::UrlEncoded("period".into(), "P1D".into()),
            Matcher::UrlEncoded("offset".into(), "-60".into()),
            Matcher::UrlEncoded("function".into(), "sum".into()),
            Matcher::UrlEncoded("nulls".into(), "1".into()),
        ]))
        .with_status(200)
        .with_body(json!({"data": [[1721001600, 3.25], [1721005200, null], [1721008800, 1.5]], "units": "kWh"}).to_string())
        .expect(1)
        .create_async()
        .await;

    let outcome = client(&server.url())
        .get_usage("T", &resource("e1", "electricity.consumption"), &summer_window())
        .await
        .unwrap();

    match outcome {
        UsageOutcome::Reading(r) => {
            assert!((r.value - 4.75).abs() < 1e-9);
            assert_eq!(r.unit, Unit::KilowattHours);
        }
        UsageOutcome::NoDataYet => panic!("expected a reading"),
    }
    catchup.assert_async().await;
    readings.assert_async().await;
}

#[tokio::test]
async fn future_window_is_no_data_yet() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/resource/e1/catchup")
        .with_status(200)
        .create_async()
        .await;
    server
        .mock("GET", "/resource/e1/readings")
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error": "incorrect elements -from in the future"}"#)
        .create_async()
        .await;

    let outcome = client(&server.url())
        .get_usage("T", &resource("e1", "electricity.consumption"), &summer_window())
        .await
        .unwrap();
    assert_eq!(outcome, UsageOutcome::NoDataYet);
}

#[tokio::test]
async fn catchup_auth_failure_skips_readings() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/resource/e1/catchup")
        .with_status(401)
        .create_async()
        .await;
    let readings = server
        .mock("GET", "/resource/e1/readings")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = client(&server.url())
        .get_usage("T", &resource("e1", "electricity.consumption"), &summer_window())
        .await
        .unwrap_err();
    assert!(err.is_auth());
    readings.assert_async().await;
}

#[tokio::test]
async fn catchup_server_error_still_reads() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/resource/c1/catchup")
        .with_status(500)
        .create_async()
        .await;
    server
        .mock("GET", "/resource/c1/readings")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"data": [[1721001600, 123.0]]}"#)
        .create_async()
        .await;

    let outcome = client(&server.url())
        .get_usage("T", &resource("c1", "electricity.consumption.cost"), &summer_window())
        .await
        .unwrap();
    let UsageOutcome::Reading(r) = outcome else {
        panic!("expected a reading");
    };
    // falls back to pence for cost resources
    assert_eq!(r.unit, Unit::Pence);
}

#[tokio::test]
async fn tariff_present_and_absent() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/resource/e1/tariff")
        .with_status(200)
        .with_body(
            json!({"data": [{"name": "Flex", "from": "2024-04-01",
                "currentRates": {"rate": "24.50", "standingCharge": 60.1}}]})
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("GET", "/resource/g1/tariff")
        .with_status(200)
        .with_body(r#"{"data": []}"#)
        .create_async()
        .await;

    let c = client(&server.url());
    let plan = c
        .get_tariff("T", &resource("e1", "electricity.consumption"))
        .await
        .unwrap()
        .unwrap();
    assert!((plan.rate - 24.5).abs() < 1e-9);
    assert!((plan.standing_charge - 60.1).abs() < 1e-9);
    assert_eq!(plan.valid_from.as_deref(), Some("2024-04-01"));

    assert!(c.get_tariff("T", &resource("g1", "gas.consumption")).await.unwrap().is_none());
}

#[tokio::test]
async fn finds_cad_hardware_id() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/device")
        .with_status(200)
        .with_body(
            json!([
                {"deviceTypeId": "something-else", "hardwareId": "nope"},
                {"deviceTypeId": "1027b6e8-9bfd-4dcb-8068-c73f6413cfaf", "hardwareId": "AABBCCDDEEFF"}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let id = client(&server.url()).find_cad_hardware_id("T").await.unwrap();
    assert_eq!(id.as_deref(), Some("AABBCCDDEEFF"));
}

#[tokio::test]
async fn current_usage_reads_latest_point() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/resource/e1/current")
        .with_status(200)
        .with_body(r#"{"data": [[1721040000, 512.0]], "units": "W"}"#)
        .create_async()
        .await;

    let current = client(&server.url())
        .current_usage("T", &resource("e1", "electricity.consumption"))
        .await
        .unwrap()
        .unwrap();
    assert!((current.value - 512.0).abs() < 1e-9);
    assert_eq!(current.units.as_deref(), Some("W"));
    assert_eq!(current.timestamp.timestamp(), 1_721_040_000);
}
