//! Integration tests driving the poller and metrics endpoint against the
//! stub PDU server.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tower::ServiceExt;

use pdusight_client::{Auth, PduClient, RpcClient};
use pdusight_exporter::http::create_router;
use pdusight_exporter::{DeviceCollector, DevicePoller, LabelPolicy, Registry};
use pdusight_stub::{StubConfig, StubState};

fn stub_config() -> StubConfig {
    StubConfig {
        inlets: 1,
        outlets: 2,
        ..StubConfig::default()
    }
}

fn pdu_client(base_url: &str) -> PduClient {
    let rpc = RpcClient::new(
        Duration::from_secs(5),
        Auth {
            username: "admin".to_string(),
            password: "pdupass".to_string(),
        },
    )
    .unwrap();
    PduClient::new(rpc, base_url.parse().unwrap())
}

fn poller(
    base_url: &str,
    collector: Arc<DeviceCollector>,
    poll_snmp: bool,
) -> Arc<DevicePoller> {
    Arc::new(DevicePoller::new(
        "east-1",
        pdu_client(base_url),
        collector,
        Duration::from_secs(10),
        poll_snmp,
    ))
}

#[tokio::test]
async fn test_full_poll_cycle_and_scrape() {
    let stub = StubState::new(stub_config());
    let base_url = pdusight_stub::spawn(stub).await.unwrap();

    let collector = Arc::new(DeviceCollector::new("east-1", LabelPolicy::default()));
    let poller = poller(&base_url, collector.clone(), false);

    let catalog = poller.discover().await.unwrap();
    // 1 inlet x 15 populated sensors, 2 outlets x 12, 1 OCP x 2.
    assert_eq!(catalog.len(), 15 + 2 * 12 + 2);

    poller.publish_readings(&catalog).await.unwrap();

    let mut registry = Registry::new("pdu");
    registry.register(collector);
    let router = create_router(Arc::new(registry), "/metrics");

    let response = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = String::from_utf8(bytes.to_vec()).unwrap();

    assert!(body.contains("pdu_device_active{pdu_name=\"Fake Name\"} 1"));
    assert!(body.contains("# TYPE pdu_inlet_voltage gauge"));
    assert!(body.contains("pdu_outlet_active_power{"));
    assert!(body.contains("pdu_ocp_trip{"));
    assert!(body.contains("label=\"I0\""));
    assert!(body.contains("label=\"O1\""));
    assert!(body.contains("pdu_serial_number=\"FAKESERIALNUMBER\""));

    // Every reading series carries its own capture timestamp:
    // `name{labels} value timestamp_ms`.
    let reading_lines: Vec<&str> = body
        .lines()
        .filter(|l| l.starts_with("pdu_inlet_voltage{"))
        .collect();
    assert!(!reading_lines.is_empty());
    for line in reading_lines {
        let (_, suffix) = line.rsplit_once("} ").unwrap();
        let mut tokens = suffix.split_whitespace();
        let _value = tokens.next().unwrap();
        let timestamp: i64 = tokens.next().unwrap().parse().unwrap();
        assert!(timestamp > 1_000_000_000_000, "line: {line}");
    }
}

#[tokio::test]
async fn test_unavailable_readings_never_published() {
    let stub = StubState::new(stub_config());
    stub.set_unavailable("activePower", true);
    let base_url = pdusight_stub::spawn(stub).await.unwrap();

    let collector = Arc::new(DeviceCollector::new("east-1", LabelPolicy::default()));
    let poller = poller(&base_url, collector.clone(), false);

    let catalog = poller.discover().await.unwrap();
    // The sensor is still discovered; only its readings are withheld.
    assert!(catalog.iter().any(|e| e.sensor == "activePower"));

    poller.publish_readings(&catalog).await.unwrap();

    let samples = collector.collect("pdu");
    assert!(!samples.iter().any(|s| s.name.ends_with("_active_power")));
    assert!(samples.iter().any(|s| s.name == "pdu_inlet_voltage"));
}

#[tokio::test]
async fn test_catalog_change_between_discoveries_is_absorbed() {
    let stub = StubState::new(stub_config());
    let base_url = pdusight_stub::spawn(stub.clone()).await.unwrap();

    let collector = Arc::new(DeviceCollector::new("east-1", LabelPolicy::default()));
    let poller = poller(&base_url, collector.clone(), false);

    let catalog = poller.discover().await.unwrap();
    poller.publish_readings(&catalog).await.unwrap();
    assert!(
        collector
            .collect("pdu")
            .iter()
            .any(|s| s.labels.contains(&("label".to_string(), "O1".to_string())))
    );

    // The device grows an outlet and loses nothing else; the next
    // discovery/reading pair must absorb the change without error.
    stub.set_outlets(3);
    let catalog = poller.discover().await.unwrap();
    poller.publish_readings(&catalog).await.unwrap();
    assert!(
        collector
            .collect("pdu")
            .iter()
            .any(|s| s.labels.contains(&("label".to_string(), "O2".to_string())))
    );

    // And shrinking below the original count drops series without error.
    stub.set_outlets(1);
    let catalog = poller.discover().await.unwrap();
    poller.publish_readings(&catalog).await.unwrap();
    let samples = collector.collect("pdu");
    assert!(
        !samples
            .iter()
            .any(|s| s.labels.contains(&("label".to_string(), "O1".to_string())))
    );
    assert!(
        samples
            .iter()
            .any(|s| s.labels.contains(&("label".to_string(), "O0".to_string())))
    );
}

#[tokio::test]
async fn test_outage_keeps_previous_snapshot() {
    let stub = StubState::new(stub_config());
    let base_url = pdusight_stub::spawn(stub).await.unwrap();

    let collector = Arc::new(DeviceCollector::new("east-1", LabelPolicy::default()));
    let healthy = poller(&base_url, collector.clone(), false);

    let catalog = healthy.discover().await.unwrap();
    healthy.publish_readings(&catalog).await.unwrap();
    let before = collector.collect("pdu");
    assert!(before.len() > 1);

    // Reserve a port and close it again so the address refuses connections.
    let dead_addr = {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };
    let down_url = format!("http://{dead_addr}");
    assert!(pdu_client(&down_url).connection_check().await.is_err());

    let down = poller(&down_url, collector.clone(), false);
    assert!(down.publish_readings(&catalog).await.is_err());

    // Nothing was published, so scrapes keep serving the prior snapshot.
    assert_eq!(collector.collect("pdu"), before);
}

#[tokio::test]
async fn test_snmp_labels_flow_when_enabled() {
    let stub = StubState::new(stub_config());
    let base_url = pdusight_stub::spawn(stub).await.unwrap();

    let policy = LabelPolicy {
        snmp_sys_name: true,
        snmp_sys_contact: true,
        ..LabelPolicy::default()
    };
    let collector = Arc::new(DeviceCollector::new("east-1", policy));
    let poller = poller(&base_url, collector.clone(), true);

    let catalog = poller.discover().await.unwrap();
    poller.publish_readings(&catalog).await.unwrap();

    let samples = collector.collect("pdu");
    let reading = samples
        .iter()
        .find(|s| s.name == "pdu_inlet_voltage")
        .unwrap();
    assert!(
        reading
            .labels
            .contains(&("snmp_sys_name".to_string(), "SysName".to_string()))
    );
    assert!(
        reading
            .labels
            .contains(&("snmp_sys_contact".to_string(), "SysContact".to_string()))
    );
    assert!(!reading.labels.iter().any(|(k, _)| k == "snmp_sys_location"));
}

#[tokio::test]
async fn test_wrong_credentials_fail_discovery() {
    let stub = StubState::new(stub_config());
    let base_url = pdusight_stub::spawn(stub).await.unwrap();

    let rpc = RpcClient::new(
        Duration::from_secs(5),
        Auth {
            username: "admin".to_string(),
            password: "wrong".to_string(),
        },
    )
    .unwrap();
    let collector = Arc::new(DeviceCollector::new("east-1", LabelPolicy::default()));
    let poller = Arc::new(DevicePoller::new(
        "east-1",
        PduClient::new(rpc, base_url.parse().unwrap()),
        collector.clone(),
        Duration::from_secs(10),
        false,
    ));

    assert!(poller.discover().await.is_err());
    // The device stays registered and inactive.
    assert_eq!(collector.collect("pdu")[0].value, 0.0);
}
