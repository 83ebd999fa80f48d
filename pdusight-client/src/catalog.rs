//! Uniform sensor catalog built from per-resource discovery results.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::pdu::{InletInfo, OcpInfo, OutletInfo, Resource};

/// Resource category a sensor hangs off.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorCategory {
    Inlet,
    Outlet,
    Ocp,
}

impl SensorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorCategory::Inlet => "inlet",
            SensorCategory::Outlet => "outlet",
            SensorCategory::Ocp => "ocp",
        }
    }
}

impl std::fmt::Display for SensorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One discovered sensor: where it lives and how to address it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub category: SensorCategory,
    /// Display label of the parent resource; the user-assigned name when one
    /// is set, the hardware label otherwise.
    pub label: String,
    /// Sensor name within the parent's sensor map, e.g. `activePower`.
    pub sensor: String,
    pub resource: Resource,
}

/// Flatten per-resource sensor maps into a uniform list.
///
/// The catalog is rebuilt wholesale on every discovery pass; absent sensors
/// were already dropped when the maps were decoded.
pub fn build_catalog(
    inlets: &[InletInfo],
    outlets: &[OutletInfo],
    ocps: &[OcpInfo],
) -> Vec<CatalogEntry> {
    let mut entries = Vec::new();
    for inlet in inlets {
        let label = display_label(&inlet.settings.name, &inlet.metadata.label);
        push_entries(&mut entries, SensorCategory::Inlet, &label, &inlet.sensors);
    }
    for outlet in outlets {
        let label = display_label(&outlet.settings.name, &outlet.metadata.label);
        push_entries(&mut entries, SensorCategory::Outlet, &label, &outlet.sensors);
    }
    for ocp in ocps {
        let label = display_label(&ocp.settings.name, &ocp.metadata.label);
        push_entries(&mut entries, SensorCategory::Ocp, &label, &ocp.sensors);
    }
    entries
}

fn display_label(name: &str, label: &str) -> String {
    if name.is_empty() {
        label.to_string()
    } else {
        name.to_string()
    }
}

fn push_entries(
    entries: &mut Vec<CatalogEntry>,
    category: SensorCategory,
    label: &str,
    sensors: &HashMap<String, Resource>,
) {
    for (sensor, resource) in sensors {
        entries.push(CatalogEntry {
            category,
            label: label.to_string(),
            sensor: sensor.clone(),
            resource: resource.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdu::{InletMetadata, InletSettings, OcpMetadata, OcpSettings};

    fn sensor_map(entries: &[(&str, &str)]) -> HashMap<String, Resource> {
        entries
            .iter()
            .map(|(name, rid)| {
                (
                    name.to_string(),
                    Resource {
                        rid: rid.to_string(),
                        kind: "sensors.NumericSensor_4_0_2".to_string(),
                    },
                )
            })
            .collect()
    }

    fn inlet(name: &str, label: &str, sensors: HashMap<String, Resource>) -> InletInfo {
        InletInfo {
            resource: Resource {
                rid: "/model/inlet/0".to_string(),
                kind: "Inlet_2_0_3".to_string(),
            },
            metadata: InletMetadata {
                label: label.to_string(),
                plug_type: String::new(),
            },
            settings: InletSettings {
                name: name.to_string(),
            },
            sensors,
        }
    }

    #[test]
    fn test_build_catalog_flattens_categories() {
        let inlets = vec![inlet(
            "",
            "I1",
            sensor_map(&[
                ("voltage", "/model/inlet/0/voltage"),
                ("current", "/model/inlet/0/current"),
            ]),
        )];
        let ocps = vec![OcpInfo {
            resource: Resource {
                rid: "/tfwopaque/ocp/0".to_string(),
                kind: "OverCurrentProtector_3_0_2".to_string(),
            },
            metadata: OcpMetadata {
                label: "C1".to_string(),
                max_trip_cnt: 0,
            },
            settings: OcpSettings::default(),
            sensors: sensor_map(&[("current", "/tfwopaque/ocp/0/current")]),
        }];

        let catalog = build_catalog(&inlets, &[], &ocps);
        assert_eq!(catalog.len(), 3);
        assert_eq!(
            catalog
                .iter()
                .filter(|e| e.category == SensorCategory::Inlet)
                .count(),
            2
        );
        assert_eq!(
            catalog
                .iter()
                .filter(|e| e.category == SensorCategory::Ocp)
                .count(),
            1
        );
    }

    #[test]
    fn test_display_label_prefers_assigned_name() {
        let named = inlet("rack feed A", "I1", sensor_map(&[("voltage", "/v")]));
        let unnamed = inlet("", "I2", sensor_map(&[("voltage", "/v2")]));

        let catalog = build_catalog(&[named, unnamed], &[], &[]);
        let labels: Vec<&str> = catalog.iter().map(|e| e.label.as_str()).collect();
        assert!(labels.contains(&"rack feed A"));
        assert!(labels.contains(&"I2"));
    }

    #[test]
    fn test_empty_discovery_yields_empty_catalog() {
        assert!(build_catalog(&[], &[], &[]).is_empty());
    }
}
