//! Fake PDU JSON-RPC server for development and integration testing.
//!
//! Serves the same management surface a real PDU exposes: the PDU model
//! entry, inlet/outlet/overcurrent-protector resources with nullable sensor
//! maps, randomised sensor readings, the SNMP configuration endpoint and the
//! vendor `performBulk` method (dispatched against the stub's own handlers
//! rather than over loopback HTTP).

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use base64::Engine;
use parking_lot::RwLock;
use serde::Deserialize;
use serde_json::{Value, json};

use pdusight_client::pdu::{
    InletMetadata, InletSettings, OcpMetadata, OcpSettings, OutletMetadata, OutletSettings,
    OutletState, PduMetadata, PduNameplate, PduSettings, Reading, Resource, SnmpInfo,
};

const NUMERIC_SENSOR: &str = "sensors.NumericSensor_4_0_2";
const STATE_SENSOR: &str = "sensors.StateSensor_4_0_2";
const RESIDUAL_SENSOR: &str = "ResidualCurrentStateSensor_2_0_2";
const TRIP_SENSOR: &str = "pdumodel.OverCurrentProtectorTripSensor_1_0_5";

/// Sensor slots per inlet; `None` marks a slot the fake hardware does not
/// populate, reported as null on the wire.
const INLET_SENSORS: &[(&str, Option<&str>)] = &[
    ("voltage", Some(NUMERIC_SENSOR)),
    ("current", Some(NUMERIC_SENSOR)),
    ("peakCurrent", Some(NUMERIC_SENSOR)),
    ("residualCurrent", Some(NUMERIC_SENSOR)),
    ("residualDCCurrent", None),
    ("activePower", Some(NUMERIC_SENSOR)),
    ("reactivePower", Some(NUMERIC_SENSOR)),
    ("apparentPower", Some(NUMERIC_SENSOR)),
    ("powerFactor", Some(NUMERIC_SENSOR)),
    ("displacementPowerFactor", None),
    ("activeEnergy", Some(NUMERIC_SENSOR)),
    ("apparentEnergy", Some(NUMERIC_SENSOR)),
    ("unbalancedCurrent", Some(NUMERIC_SENSOR)),
    ("lineFrequency", Some(NUMERIC_SENSOR)),
    ("phaseAngle", None),
    ("powerQuality", Some(STATE_SENSOR)),
    ("surgeProtectorStatus", Some(STATE_SENSOR)),
    ("residualCurrentStatus", Some(RESIDUAL_SENSOR)),
];

const OUTLET_SENSORS: &[(&str, Option<&str>)] = &[
    ("voltage", Some(NUMERIC_SENSOR)),
    ("current", Some(NUMERIC_SENSOR)),
    ("peakCurrent", Some(NUMERIC_SENSOR)),
    ("maximumCurrent", Some(NUMERIC_SENSOR)),
    ("unbalancedCurrent", Some(NUMERIC_SENSOR)),
    ("activePower", Some(NUMERIC_SENSOR)),
    ("reactivePower", Some(NUMERIC_SENSOR)),
    ("apparentPower", Some(NUMERIC_SENSOR)),
    ("powerFactor", Some(NUMERIC_SENSOR)),
    ("displacementPowerFactor", None),
    ("activeEnergy", Some(NUMERIC_SENSOR)),
    ("apparentEnergy", Some(NUMERIC_SENSOR)),
    ("phaseAngle", None),
    ("lineFrequency", None),
    ("outletState", Some(STATE_SENSOR)),
];

const OCP_SENSORS: &[(&str, Option<&str>)] = &[
    ("trip", Some(TRIP_SENSOR)),
    ("voltage", None),
    ("current", Some(NUMERIC_SENSOR)),
];

/// Configuration of the fake device.
#[derive(Debug, Clone)]
pub struct StubConfig {
    pub username: String,
    pub password: String,
    pub pdu_name: String,
    pub pdu_serial: String,
    pub inlets: u32,
    pub outlets: u32,
}

impl Default for StubConfig {
    fn default() -> Self {
        Self {
            username: "admin".to_string(),
            password: "pdupass".to_string(),
            pdu_name: "Fake Name".to_string(),
            pdu_serial: "FAKESERIALNUMBER".to_string(),
            inlets: 2,
            outlets: 8,
        }
    }
}

/// Mutable device state. Tests tweak the topology and sensor availability
/// between polling cycles to simulate hardware changes.
pub struct StubState {
    config: StubConfig,
    inlets: RwLock<u32>,
    outlets: RwLock<u32>,
    unavailable: RwLock<HashSet<String>>,
}

pub type SharedStub = Arc<StubState>;

impl StubState {
    pub fn new(config: StubConfig) -> SharedStub {
        Arc::new(Self {
            inlets: RwLock::new(config.inlets),
            outlets: RwLock::new(config.outlets),
            unavailable: RwLock::new(HashSet::new()),
            config,
        })
    }

    /// Change the number of outlets the device reports on the next
    /// discovery.
    pub fn set_outlets(&self, outlets: u32) {
        *self.outlets.write() = outlets;
    }

    pub fn set_inlets(&self, inlets: u32) {
        *self.inlets.write() = inlets;
    }

    /// Mark a sensor name as unavailable; its readings keep flowing but
    /// carry `Available: false`.
    pub fn set_unavailable(&self, sensor: &str, unavailable: bool) {
        if unavailable {
            self.unavailable.write().insert(sensor.to_string());
        } else {
            self.unavailable.write().remove(sensor);
        }
    }

    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(value) = headers.get("authorization") else {
            return false;
        };
        let Ok(value) = value.to_str() else {
            return false;
        };
        let Some(encoded) = value.strip_prefix("Basic ") else {
            return false;
        };
        let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(encoded) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        credentials == format!("{}:{}", self.config.username, self.config.password)
    }

    // ── RPC dispatch ────────────────────────────────────────────────

    fn pdu_rpc(&self, request: &RpcRequest) -> Value {
        match request.method.as_str() {
            "getMetaData" => rpc_result(&PduMetadata {
                nameplate: PduNameplate {
                    manufacturer: "Fake Manufacturer".to_string(),
                    model: "Fake Model".to_string(),
                    part_number: "Fake Part Number".to_string(),
                    serial_number: self.config.pdu_serial.clone(),
                },
                ctrl_board_serial: "FAKECTRLBOARDSERIAL".to_string(),
                mac_address: "FAKEMACADDRESS".to_string(),
                has_metered_outlets: true,
                has_switchable_outlets: true,
                ..Default::default()
            }),
            "getSettings" => rpc_result(&PduSettings {
                name: self.config.pdu_name.clone(),
            }),
            "getInlets" => {
                let inlets: Vec<Resource> = (0..*self.inlets.read())
                    .map(|i| Resource {
                        rid: format!("/model/inlet/{i}"),
                        kind: "Inlet_2_0_3".to_string(),
                    })
                    .collect();
                rpc_result(&inlets)
            }
            "getOutlets" => {
                let outlets: Vec<Resource> = (0..*self.outlets.read())
                    .map(|i| Resource {
                        rid: format!("/model/outlet/{i}"),
                        kind: "Outlet_2_1_4".to_string(),
                    })
                    .collect();
                rpc_result(&outlets)
            }
            "getOverCurrentProtectors" => rpc_result(&[Resource {
                rid: "/tfwopaque/ocp/0".to_string(),
                kind: "OverCurrentProtector_3_0_2".to_string(),
            }]),
            method => method_not_found(method),
        }
    }

    fn inlet_rpc(&self, id: &str, request: &RpcRequest) -> Value {
        match request.method.as_str() {
            "getMetaData" => rpc_result(&InletMetadata {
                label: format!("I{id}"),
                plug_type: "Fake Plug Type".to_string(),
            }),
            "getSettings" => rpc_result(&InletSettings::default()),
            "getSensors" => sensor_map(INLET_SENSORS, &format!("/model/inlet/{id}")),
            method => method_not_found(method),
        }
    }

    fn outlet_rpc(&self, id: &str, request: &RpcRequest) -> Value {
        match request.method.as_str() {
            "getMetaData" => rpc_result(&OutletMetadata {
                label: format!("O{id}"),
                receptacle_type: "Fake Receptacle Type".to_string(),
            }),
            "getSettings" => rpc_result(&OutletSettings::default()),
            "getState" => rpc_result(&OutletState {
                available: true,
                power_state: 1,
            }),
            "getSensors" => sensor_map(OUTLET_SENSORS, &format!("/model/outlet/{id}")),
            method => method_not_found(method),
        }
    }

    fn ocp_rpc(&self, id: &str, request: &RpcRequest) -> Value {
        match request.method.as_str() {
            "getMetaData" => rpc_result(&OcpMetadata {
                label: format!("C{id}"),
                max_trip_cnt: 1000,
            }),
            "getSettings" => rpc_result(&OcpSettings::default()),
            "getSensors" => sensor_map(OCP_SENSORS, &format!("/tfwopaque/{id}")),
            method => method_not_found(method),
        }
    }

    fn sensor_rpc(&self, sensor: &str, request: &RpcRequest) -> Value {
        match request.method.as_str() {
            "getReading" | "getState" => {
                let now = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                rpc_result(&Reading {
                    timestamp: now,
                    available: !self.unavailable.read().contains(sensor),
                    value: rand::random::<f64>(),
                })
            }
            method => method_not_found(method),
        }
    }

    fn snmp_rpc(&self, request: &RpcRequest) -> Value {
        match request.method.as_str() {
            "getConfiguration" => rpc_result(&SnmpInfo {
                read_comm: "ReadComm".to_string(),
                sys_contact: "SysContact".to_string(),
                sys_location: "SysLocation".to_string(),
                sys_name: "SysName".to_string(),
                v2_enabled: true,
                v3_enabled: false,
                write_comm: "WriteComm".to_string(),
            }),
            method => method_not_found(method),
        }
    }

    /// Route a bulk sub-request by its resource id, the way the device
    /// firmware fans `performBulk` out internally.
    fn dispatch(&self, rid: &str, request: &RpcRequest) -> Option<Value> {
        let segments: Vec<&str> = rid.trim_matches('/').split('/').collect();
        match segments.as_slice() {
            ["model", "pdu", "0"] => Some(self.pdu_rpc(request)),
            ["snmp"] => Some(self.snmp_rpc(request)),
            ["model", "inlet", id] => Some(self.inlet_rpc(id, request)),
            ["model", "outlet", id] => Some(self.outlet_rpc(id, request)),
            ["tfwopaque", "ocp", id] => Some(self.ocp_rpc(id, request)),
            ["model", _, _, sensor] => Some(self.sensor_rpc(sensor, request)),
            ["tfwopaque", _, sensor] => Some(self.sensor_rpc(sensor, request)),
            _ => None,
        }
    }

    fn bulk_rpc(&self, request: &RpcRequest) -> Value {
        if request.method != "performBulk" {
            return method_not_found(&request.method);
        }

        let requests = request
            .params
            .as_ref()
            .and_then(|p| p.get("requests"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let responses: Vec<Value> = requests
            .iter()
            .map(|sub| {
                let rid = sub.get("rid").and_then(Value::as_str).unwrap_or_default();
                let inner: RpcRequest = sub
                    .get("json")
                    .cloned()
                    .and_then(|j| serde_json::from_value(j).ok())
                    .unwrap_or_default();

                match self.dispatch(rid, &inner) {
                    Some(response) => json!({"StatCode": 200, "JSON": response}),
                    None => {
                        tracing::error!(rid, "Bulk sub-request for unknown resource");
                        json!({"StatCode": 500, "JSON": null})
                    }
                }
            })
            .collect();

        // The bulk result is not wrapped in the `_ret_` payload envelope.
        json!({
            "jsonrpc": "2.0",
            "id": 0,
            "result": {"Responses": responses},
        })
    }
}

/// Incoming JSON-RPC request body; the envelope fields are ignored.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
}

fn rpc_result<T: serde::Serialize>(value: &T) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 0,
        "result": {"_ret_": value},
    })
}

fn method_not_found(method: &str) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": 0,
        "error": {
            "code": -32601,
            "message": "Method not found",
            "data": {"method": method},
        },
    })
}

/// Build a sensor map with resource links for populated slots and nulls for
/// absent ones.
fn sensor_map(table: &[(&str, Option<&str>)], base: &str) -> Value {
    let map: serde_json::Map<String, Value> = table
        .iter()
        .map(|(name, kind)| {
            let value = match kind {
                Some(kind) => json!({"RID": format!("{base}/{name}"), "Type": kind}),
                None => Value::Null,
            };
            (name.to_string(), value)
        })
        .collect();
    rpc_result(&map)
}

// ── HTTP surface ────────────────────────────────────────────────────

async fn require_auth(
    State(stub): State<SharedStub>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    if !stub.authorized(&headers) {
        return (StatusCode::UNAUTHORIZED, "unauthorized\n").into_response();
    }
    next.run(request).await
}

async fn pdu_endpoint(State(stub): State<SharedStub>, Json(request): Json<RpcRequest>) -> Json<Value> {
    Json(stub.pdu_rpc(&request))
}

async fn bulk_endpoint(State(stub): State<SharedStub>, Json(request): Json<RpcRequest>) -> Json<Value> {
    Json(stub.bulk_rpc(&request))
}

async fn snmp_endpoint(State(stub): State<SharedStub>, Json(request): Json<RpcRequest>) -> Json<Value> {
    Json(stub.snmp_rpc(&request))
}

async fn inlet_endpoint(
    State(stub): State<SharedStub>,
    Path(id): Path<String>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    Json(stub.inlet_rpc(&id, &request))
}

async fn outlet_endpoint(
    State(stub): State<SharedStub>,
    Path(id): Path<String>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    Json(stub.outlet_rpc(&id, &request))
}

async fn ocp_endpoint(
    State(stub): State<SharedStub>,
    Path(id): Path<String>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    Json(stub.ocp_rpc(&id, &request))
}

async fn model_sensor_endpoint(
    State(stub): State<SharedStub>,
    Path((_kind, _id, sensor)): Path<(String, String, String)>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    Json(stub.sensor_rpc(&sensor, &request))
}

async fn opaque_sensor_endpoint(
    State(stub): State<SharedStub>,
    Path((_id, sensor)): Path<(String, String)>,
    Json(request): Json<RpcRequest>,
) -> Json<Value> {
    Json(stub.sensor_rpc(&sensor, &request))
}

/// Build the stub's router around shared device state.
pub fn router(stub: SharedStub) -> Router {
    Router::new()
        .route("/model/pdu/0", post(pdu_endpoint))
        .route("/bulk", post(bulk_endpoint))
        .route("/snmp", post(snmp_endpoint))
        .route("/model/inlet/:id", post(inlet_endpoint))
        .route("/model/outlet/:id", post(outlet_endpoint))
        .route("/tfwopaque/ocp/:id", post(ocp_endpoint))
        .route("/model/:kind/:id/:sensor", post(model_sensor_endpoint))
        .route("/tfwopaque/:id/:sensor", post(opaque_sensor_endpoint))
        .layer(axum::middleware::from_fn_with_state(
            stub.clone(),
            require_auth,
        ))
        .with_state(stub)
}

/// Spawn the stub on an ephemeral port, returning its base URL. Used by
/// integration tests.
pub async fn spawn(stub: SharedStub) -> anyhow::Result<String> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let app = router(stub);
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Stub server error: {e}");
        }
    });
    Ok(format!("http://{addr}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stub() -> SharedStub {
        StubState::new(StubConfig::default())
    }

    fn request(method: &str) -> RpcRequest {
        RpcRequest {
            method: method.to_string(),
            params: None,
        }
    }

    #[test]
    fn test_pdu_metadata_casing() {
        let response = stub().pdu_rpc(&request("getMetaData"));
        let ret = &response["result"]["_ret_"];
        assert_eq!(ret["Nameplate"]["SerialNumber"], "FAKESERIALNUMBER");
        assert_eq!(ret["CtrlBoardSerial"], "FAKECTRLBOARDSERIAL");
    }

    #[test]
    fn test_outlet_count_follows_state() {
        let stub = stub();
        let response = stub.pdu_rpc(&request("getOutlets"));
        assert_eq!(
            response["result"]["_ret_"].as_array().unwrap().len(),
            8
        );

        stub.set_outlets(3);
        let response = stub.pdu_rpc(&request("getOutlets"));
        assert_eq!(
            response["result"]["_ret_"].as_array().unwrap().len(),
            3
        );
    }

    #[test]
    fn test_sensor_map_contains_nulls() {
        let response = stub().inlet_rpc("0", &request("getSensors"));
        let ret = &response["result"]["_ret_"];
        assert!(ret["phaseAngle"].is_null());
        assert_eq!(ret["voltage"]["RID"], "/model/inlet/0/voltage");
    }

    #[test]
    fn test_unknown_method_is_rpc_error() {
        let response = stub().snmp_rpc(&request("getNonsense"));
        assert_eq!(response["error"]["code"], -32601);
    }

    #[test]
    fn test_bulk_dispatch_preserves_order_and_status() {
        let stub = stub();
        let bulk = RpcRequest {
            method: "performBulk".to_string(),
            params: Some(json!({"requests": [
                {"rid": "/model/pdu/0", "json": {"method": "getSettings"}},
                {"rid": "/nowhere", "json": {"method": "getSettings"}},
            ]})),
        };

        let response = stub.bulk_rpc(&bulk);
        let responses = response["result"]["Responses"].as_array().unwrap();
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0]["StatCode"], 200);
        assert_eq!(
            responses[0]["JSON"]["result"]["_ret_"]["Name"],
            "Fake Name"
        );
        assert_eq!(responses[1]["StatCode"], 500);
    }

    #[test]
    fn test_unavailable_sensor_flag() {
        let stub = stub();
        stub.set_unavailable("voltage", true);

        let response = stub.sensor_rpc("voltage", &request("getReading"));
        assert_eq!(response["result"]["_ret_"]["Available"], false);

        stub.set_unavailable("voltage", false);
        let response = stub.sensor_rpc("voltage", &request("getReading"));
        assert_eq!(response["result"]["_ret_"]["Available"], true);
    }
}
