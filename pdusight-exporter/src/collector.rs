//! Per-device metric collector holding the latest snapshot.

use std::collections::HashMap;

use glob::Pattern;
use parking_lot::{Mutex, RwLock};

use pdusight_client::{PduInfo, SensorCategory, SnmpInfo};

use crate::config::LabelPolicy;
use crate::naming;

/// One published sensor value, carrying its device-reported capture time.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub category: SensorCategory,
    /// Sensor name as the device reports it, e.g. `activePower`.
    pub sensor: String,
    /// Display label of the parent inlet/outlet/protector.
    pub label: String,
    /// Unix epoch seconds when the device took the reading.
    pub timestamp: u64,
    pub value: f64,
}

/// Latest known state of one device. Fields are replaced wholesale by their
/// setters; readers never observe a partial update.
#[derive(Debug, Default)]
struct DeviceSnapshot {
    pdu_info: Option<PduInfo>,
    snmp_info: Option<SnmpInfo>,
    readings: Vec<SensorSample>,
}

/// A fully self-described metric sample ready for exposition. All metrics
/// this exporter emits are gauges.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub name: String,
    pub help: String,
    pub labels: Vec<(String, String)>,
    pub value: f64,
    /// Exposition timestamp in milliseconds, pinned to the reading's own
    /// capture time. Readings refresh on a slower cadence than scrapes, so
    /// scrape time would be wrong here.
    pub timestamp_ms: Option<i64>,
}

/// Holds the latest snapshot for one device and renders it as metrics on
/// demand.
#[derive(Debug)]
pub struct DeviceCollector {
    /// Configured device name; endpoint filtering always uses this one.
    name: String,
    policy: LabelPolicy,
    snapshot: RwLock<DeviceSnapshot>,
    /// Sensor names recur every cycle, so their snake_case forms are
    /// memoized.
    metric_names: Mutex<HashMap<String, String>>,
}

impl DeviceCollector {
    pub fn new(name: impl Into<String>, policy: LabelPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            snapshot: RwLock::new(DeviceSnapshot::default()),
            metric_names: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the published readings.
    pub fn set_readings(&self, readings: Vec<SensorSample>) {
        self.snapshot.write().readings = readings;
    }

    /// Replace the PDU info.
    pub fn set_pdu_info(&self, info: PduInfo) {
        self.snapshot.write().pdu_info = Some(info);
    }

    /// Replace the SNMP info.
    pub fn set_snmp_info(&self, info: SnmpInfo) {
        self.snapshot.write().snmp_info = Some(info);
    }

    /// No static descriptors: sensor identities are only known after
    /// discovery, so everything is described at collect time.
    pub fn describe(&self) -> Vec<String> {
        Vec::new()
    }

    /// Glob match of the device name against a pattern list. The literal
    /// `all` matches every device.
    pub fn matches(&self, patterns: &[String]) -> bool {
        patterns.iter().any(|p| {
            p.eq_ignore_ascii_case("all")
                || Pattern::new(p)
                    .map(|pattern| pattern.matches(&self.name))
                    .unwrap_or(false)
        })
    }

    /// Render the current snapshot as self-described samples.
    pub fn collect(&self, namespace: &str) -> Vec<MetricSample> {
        let snapshot = self.snapshot.read();

        let mut samples = Vec::with_capacity(snapshot.readings.len() + 1);
        samples.push(MetricSample {
            name: format!("{namespace}_device_active"),
            help: "1 if the PDU has reported its info, 0 otherwise".to_string(),
            labels: vec![("pdu_name".to_string(), self.device_name(&snapshot))],
            value: if snapshot.pdu_info.is_some() { 1.0 } else { 0.0 },
            timestamp_ms: None,
        });

        let Some(pdu_info) = &snapshot.pdu_info else {
            return samples;
        };

        let base_labels = self.base_labels(pdu_info, snapshot.snmp_info.as_ref());
        for reading in &snapshot.readings {
            let mut labels = base_labels.clone();
            labels.push(("label".to_string(), reading.label.clone()));

            samples.push(MetricSample {
                name: self.metric_name(namespace, reading.category, &reading.sensor),
                help: format!("{} sensor reading for {}", reading.category, reading.sensor),
                labels,
                value: reading.value,
                timestamp_ms: Some(reading.timestamp as i64 * 1000),
            });
        }

        samples
    }

    /// Name used in the `pdu_name` label: the configured one when the
    /// policy says so or nothing has been reported yet, the device-reported
    /// one otherwise.
    fn device_name(&self, snapshot: &DeviceSnapshot) -> String {
        if self.policy.use_config_name {
            return self.name.clone();
        }
        match &snapshot.pdu_info {
            Some(info) if !info.settings.name.is_empty() => info.settings.name.clone(),
            _ => self.name.clone(),
        }
    }

    fn base_labels(&self, pdu_info: &PduInfo, snmp_info: Option<&SnmpInfo>) -> Vec<(String, String)> {
        let mut labels = vec![(
            "pdu_name".to_string(),
            if self.policy.use_config_name || pdu_info.settings.name.is_empty() {
                self.name.clone()
            } else {
                pdu_info.settings.name.clone()
            },
        )];

        if self.policy.serial_number {
            labels.push((
                "pdu_serial_number".to_string(),
                pdu_info.metadata.nameplate.serial_number.clone(),
            ));
        }

        if let Some(snmp) = snmp_info {
            if self.policy.snmp_sys_name {
                labels.push(("snmp_sys_name".to_string(), snmp.sys_name.clone()));
            }
            if self.policy.snmp_sys_location {
                labels.push(("snmp_sys_location".to_string(), snmp.sys_location.clone()));
            }
            if self.policy.snmp_sys_contact {
                labels.push(("snmp_sys_contact".to_string(), snmp.sys_contact.clone()));
            }
        }

        labels
    }

    fn metric_name(&self, namespace: &str, category: SensorCategory, sensor: &str) -> String {
        let mut cache = self.metric_names.lock();
        let snake = cache
            .entry(sensor.to_string())
            .or_insert_with(|| naming::snake_case(sensor));
        format!("{}_{}_{}", namespace, category.as_str(), snake)
    }
}
