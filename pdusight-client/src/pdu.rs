//! Domain operations against a single PDU.
//!
//! Field casing on the wire follows the device's management model
//! (PascalCase with `RID` kept uppercase), hence the serde renames.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::bulk::{BulkRequest, unwrap_payload};
use crate::error::{Error, Result};
use crate::rpc::{Request, RpcClient};

const PDU_PATH: &str = "/model/pdu/0";
const BULK_PATH: &str = "/bulk";
const SNMP_PATH: &str = "/snmp";

/// Reference to an addressable resource in the device model tree.
///
/// Resource ids are unique within one device only; two devices may both
/// expose `/model/outlet/0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    #[serde(rename = "RID")]
    pub rid: String,
    #[serde(rename = "Type")]
    pub kind: String,
}

/// Factory nameplate of the PDU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PduNameplate {
    pub manufacturer: String,
    pub model: String,
    pub part_number: String,
    pub serial_number: String,
}

/// Immutable hardware metadata of the PDU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PduMetadata {
    pub nameplate: PduNameplate,
    pub ctrl_board_serial: String,
    pub hw_revision: String,
    pub fw_revision: String,
    pub mac_address: String,
    pub has_switchable_outlets: bool,
    pub has_metered_outlets: bool,
    pub has_latching_outlet_relays: bool,
    pub is_inline_meter: bool,
    pub is_energy_pulse_supported: bool,
}

/// User-assigned PDU settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PduSettings {
    pub name: String,
}

/// Combined metadata and settings for the main PDU entry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PduInfo {
    pub metadata: PduMetadata,
    pub settings: PduSettings,
}

/// Inlet hardware metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InletMetadata {
    pub label: String,
    pub plug_type: String,
}

/// User-assigned inlet settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct InletSettings {
    pub name: String,
}

/// Discovery result for one inlet.
#[derive(Debug, Clone)]
pub struct InletInfo {
    pub resource: Resource,
    pub metadata: InletMetadata,
    pub settings: InletSettings,
    pub sensors: HashMap<String, Resource>,
}

/// Outlet hardware metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OutletMetadata {
    pub label: String,
    pub receptacle_type: String,
}

/// User-assigned outlet settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OutletSettings {
    pub name: String,
}

/// Relay state of one outlet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OutletState {
    pub available: bool,
    pub power_state: u32,
}

/// Discovery result for one outlet.
#[derive(Debug, Clone)]
pub struct OutletInfo {
    pub resource: Resource,
    pub metadata: OutletMetadata,
    pub settings: OutletSettings,
    pub state: OutletState,
    pub sensors: HashMap<String, Resource>,
}

/// Overcurrent protector hardware metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OcpMetadata {
    pub label: String,
    pub max_trip_cnt: i64,
}

/// User-assigned overcurrent protector settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct OcpSettings {
    pub name: String,
}

/// Discovery result for one overcurrent protector.
#[derive(Debug, Clone)]
pub struct OcpInfo {
    pub resource: Resource,
    pub metadata: OcpMetadata,
    pub settings: OcpSettings,
    pub sensors: HashMap<String, Resource>,
}

/// SNMP agent configuration of the PDU.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SnmpInfo {
    pub read_comm: String,
    pub sys_contact: String,
    pub sys_location: String,
    pub sys_name: String,
    pub v2_enabled: bool,
    pub v3_enabled: bool,
    pub write_comm: String,
}

/// One timestamped sensor reading. `value` is only meaningful when
/// `available` is set; timestamps are Unix epoch seconds as reported by
/// the device.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct Reading {
    pub timestamp: u64,
    pub available: bool,
    pub value: f64,
}

/// Sensors expose different reading methods depending on their type tag.
/// An unrecognised tag means the device grew a capability this client does
/// not model, which is an invariant violation rather than a runtime error.
pub fn reading_method(resource: &Resource) -> &'static str {
    if resource.kind.contains("NumericSensor") {
        "getReading"
    } else if resource.kind.contains("StateSensor")
        || resource.kind.contains("OverCurrentProtectorTripSensor")
    {
        "getState"
    } else {
        panic!(
            "unknown sensor type {} for resource {}",
            resource.kind, resource.rid
        );
    }
}

/// Drop absent sensors: the device reports unsupported sensor slots as null.
fn filter_absent(sensors: HashMap<String, Option<Resource>>) -> HashMap<String, Resource> {
    sensors
        .into_iter()
        .filter_map(|(name, resource)| resource.map(|r| (name, r)))
        .collect()
}

/// Decode one positional slot of a bulk payload list.
fn decode_slot<T: DeserializeOwned>(payloads: &[Value], index: usize) -> Result<T> {
    let value = payloads
        .get(index)
        .cloned()
        .ok_or_else(|| Error::Bulk(format!("missing bulk payload at index {index}")))?;
    Ok(serde_json::from_value(value)?)
}

/// Client for one PDU's management API.
#[derive(Debug, Clone)]
pub struct PduClient {
    rpc: RpcClient,
    base_url: Url,
}

impl PduClient {
    pub fn new(rpc: RpcClient, base_url: Url) -> Self {
        Self { rpc, base_url }
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    /// Single call against a model path, unwrapping the payload envelope
    /// into the caller's target type.
    async fn call_decoded<T: DeserializeOwned>(&self, path: &str, request: Request) -> Result<T> {
        let response = self.rpc.call(self.endpoint(path)?, &request).await?;
        let payload = unwrap_payload(response)?;
        Ok(serde_json::from_value(payload)?)
    }

    async fn bulk(&self, requests: &[BulkRequest]) -> Result<Vec<Value>> {
        self.rpc
            .bulk_call(self.endpoint(BULK_PATH)?, requests)
            .await
    }

    /// Fetch metadata and settings for the main PDU entry in one bulk call.
    pub async fn pdu_info(&self) -> Result<PduInfo> {
        let requests = [
            BulkRequest::new(PDU_PATH, Request::new("getMetaData")),
            BulkRequest::new(PDU_PATH, Request::new("getSettings")),
        ];
        let payloads = self.bulk(&requests).await?;
        Ok(PduInfo {
            metadata: decode_slot(&payloads, 0)?,
            settings: decode_slot(&payloads, 1)?,
        })
    }

    /// List inlet resources of the PDU.
    pub async fn inlets(&self) -> Result<Vec<Resource>> {
        self.call_decoded(PDU_PATH, Request::new("getInlets")).await
    }

    /// List outlet resources of the PDU.
    pub async fn outlets(&self) -> Result<Vec<Resource>> {
        self.call_decoded(PDU_PATH, Request::new("getOutlets")).await
    }

    /// List overcurrent protector resources of the PDU.
    pub async fn overcurrent_protectors(&self) -> Result<Vec<Resource>> {
        self.call_decoded(PDU_PATH, Request::new("getOverCurrentProtectors"))
            .await
    }

    /// Fetch metadata, settings and sensor maps for a set of inlets in one
    /// bulk call (three elements per inlet).
    pub async fn inlet_info(&self, inlets: &[Resource]) -> Result<Vec<InletInfo>> {
        let mut requests = Vec::with_capacity(inlets.len() * 3);
        for inlet in inlets {
            requests.push(BulkRequest::new(&inlet.rid, Request::new("getMetaData")));
            requests.push(BulkRequest::new(&inlet.rid, Request::new("getSettings")));
            requests.push(BulkRequest::new(&inlet.rid, Request::new("getSensors")));
        }
        let payloads = self.bulk(&requests).await?;

        inlets
            .iter()
            .enumerate()
            .map(|(i, inlet)| {
                let base = i * 3;
                Ok(InletInfo {
                    resource: inlet.clone(),
                    metadata: decode_slot(&payloads, base)?,
                    settings: decode_slot(&payloads, base + 1)?,
                    sensors: filter_absent(decode_slot(&payloads, base + 2)?),
                })
            })
            .collect()
    }

    /// Fetch metadata, settings, relay state and sensor maps for a set of
    /// outlets in one bulk call (four elements per outlet).
    pub async fn outlet_info(&self, outlets: &[Resource]) -> Result<Vec<OutletInfo>> {
        let mut requests = Vec::with_capacity(outlets.len() * 4);
        for outlet in outlets {
            requests.push(BulkRequest::new(&outlet.rid, Request::new("getMetaData")));
            requests.push(BulkRequest::new(&outlet.rid, Request::new("getSettings")));
            requests.push(BulkRequest::new(&outlet.rid, Request::new("getState")));
            requests.push(BulkRequest::new(&outlet.rid, Request::new("getSensors")));
        }
        let payloads = self.bulk(&requests).await?;

        outlets
            .iter()
            .enumerate()
            .map(|(i, outlet)| {
                let base = i * 4;
                Ok(OutletInfo {
                    resource: outlet.clone(),
                    metadata: decode_slot(&payloads, base)?,
                    settings: decode_slot(&payloads, base + 1)?,
                    state: decode_slot(&payloads, base + 2)?,
                    sensors: filter_absent(decode_slot(&payloads, base + 3)?),
                })
            })
            .collect()
    }

    /// Fetch metadata, settings and sensor maps for a set of overcurrent
    /// protectors in one bulk call (three elements per protector).
    pub async fn ocp_info(&self, ocps: &[Resource]) -> Result<Vec<OcpInfo>> {
        let mut requests = Vec::with_capacity(ocps.len() * 3);
        for ocp in ocps {
            requests.push(BulkRequest::new(&ocp.rid, Request::new("getMetaData")));
            requests.push(BulkRequest::new(&ocp.rid, Request::new("getSettings")));
            requests.push(BulkRequest::new(&ocp.rid, Request::new("getSensors")));
        }
        let payloads = self.bulk(&requests).await?;

        ocps.iter()
            .enumerate()
            .map(|(i, ocp)| {
                let base = i * 3;
                Ok(OcpInfo {
                    resource: ocp.clone(),
                    metadata: decode_slot(&payloads, base)?,
                    settings: decode_slot(&payloads, base + 1)?,
                    sensors: filter_absent(decode_slot(&payloads, base + 2)?),
                })
            })
            .collect()
    }

    /// Fetch current readings for a set of sensors in one bulk call, one
    /// element per sensor. The RPC method is selected per sensor type.
    pub async fn sensor_readings(&self, sensors: &[Resource]) -> Result<Vec<Reading>> {
        let requests: Vec<BulkRequest> = sensors
            .iter()
            .map(|s| BulkRequest::new(&s.rid, Request::new(reading_method(s))))
            .collect();
        let payloads = self.bulk(&requests).await?;

        (0..sensors.len())
            .map(|i| decode_slot(&payloads, i))
            .collect()
    }

    /// Fetch the SNMP agent configuration.
    pub async fn snmp_info(&self) -> Result<SnmpInfo> {
        let requests = [BulkRequest::new(
            SNMP_PATH,
            Request::new("getConfiguration"),
        )];
        let payloads = self.bulk(&requests).await?;
        decode_slot(&payloads, 0)
    }

    /// Probe device connectivity by fetching PDU info; any error means the
    /// device is offline.
    pub async fn connection_check(&self) -> Result<()> {
        self.pdu_info().await.map(|_| ())
    }
}
