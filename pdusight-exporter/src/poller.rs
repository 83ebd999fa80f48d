//! Dual-cadence device poller: slow structural discovery, fast reading
//! refresh.
//!
//! Each monitored device gets one poller running two concurrent tasks. The
//! discovery task rebuilds the sensor catalog every ten base intervals and
//! hands it over through a single-slot watch cell; the reading task adopts
//! whatever catalog is newest without ever waiting for one. Both tasks stop
//! on the shared shutdown signal; in-flight calls finish but are not
//! rescheduled.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval, interval_at};
use tracing::{debug, warn};

use pdusight_client::{CatalogEntry, PduClient, Resource, build_catalog};

use crate::collector::{DeviceCollector, SensorSample};

/// Polls one device and publishes into its collector.
pub struct DevicePoller {
    name: String,
    client: PduClient,
    collector: Arc<DeviceCollector>,
    interval: Duration,
    poll_snmp: bool,
}

impl DevicePoller {
    pub fn new(
        name: impl Into<String>,
        client: PduClient,
        collector: Arc<DeviceCollector>,
        interval: Duration,
        poll_snmp: bool,
    ) -> Self {
        Self {
            name: name.into(),
            client,
            collector,
            interval,
            poll_snmp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// One full discovery pass: PDU info, SNMP info when enabled, topology
    /// enumeration and catalog build. Publishes everything it learns and
    /// returns the fresh catalog for adoption.
    pub async fn discover(&self) -> pdusight_client::Result<Vec<CatalogEntry>> {
        self.refresh_info().await?;

        let inlets = self.client.inlets().await?;
        let inlet_info = self.client.inlet_info(&inlets).await?;

        let outlets = self.client.outlets().await?;
        let outlet_info = self.client.outlet_info(&outlets).await?;

        let ocps = self.client.overcurrent_protectors().await?;
        let ocp_info = self.client.ocp_info(&ocps).await?;

        let catalog = build_catalog(&inlet_info, &outlet_info, &ocp_info);
        debug!(
            device = %self.name,
            inlets = inlet_info.len(),
            outlets = outlet_info.len(),
            ocps = ocp_info.len(),
            sensors = catalog.len(),
            "Discovery pass complete"
        );
        Ok(catalog)
    }

    /// Republish PDU info (and SNMP info when enabled) so renames and
    /// reported names stay current.
    pub async fn refresh_info(&self) -> pdusight_client::Result<()> {
        let pdu_info = self.client.pdu_info().await?;
        self.collector.set_pdu_info(pdu_info);

        if self.poll_snmp {
            let snmp_info = self.client.snmp_info().await?;
            self.collector.set_snmp_info(snmp_info);
        }

        Ok(())
    }

    /// Fetch readings for the adopted catalog and publish the available
    /// ones, stamped with the device-reported capture time.
    pub async fn publish_readings(&self, catalog: &[CatalogEntry]) -> pdusight_client::Result<()> {
        let sensors: Vec<Resource> = catalog.iter().map(|e| e.resource.clone()).collect();
        let readings = self.client.sensor_readings(&sensors).await?;

        let samples: Vec<SensorSample> = catalog
            .iter()
            .zip(readings)
            .filter(|(_, reading)| reading.available)
            .map(|(entry, reading)| SensorSample {
                category: entry.category,
                sensor: entry.sensor.clone(),
                label: entry.label.clone(),
                timestamp: reading.timestamp,
                value: reading.value,
            })
            .collect();

        debug!(device = %self.name, published = samples.len(), of = catalog.len(), "Published readings");
        self.collector.set_readings(samples);
        Ok(())
    }

    /// Spawn the discovery and reading tasks. `initial` is the catalog from
    /// the synchronous startup discovery (empty when that failed and the
    /// skip policy kept the device registered).
    pub fn spawn_tasks(
        self: &Arc<Self>,
        initial: Vec<CatalogEntry>,
        shutdown: watch::Receiver<bool>,
    ) -> Vec<JoinHandle<()>> {
        let (catalog_tx, catalog_rx) = watch::channel(initial);
        vec![
            tokio::spawn(self.clone().run_discovery(catalog_tx, shutdown.clone())),
            tokio::spawn(self.clone().run_readings(catalog_rx, shutdown)),
        ]
    }

    /// Discovery cadence: every ten base intervals, publish a fresh catalog
    /// into the handoff slot. Never blocks the reading task.
    async fn run_discovery(
        self: Arc<Self>,
        slot: watch::Sender<Vec<CatalogEntry>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let period = self.interval * 10;
        // The startup pass already ran; the first tick waits a full period.
        let mut ticker = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            match self.discover().await {
                // The newest catalog is the only relevant one; overwrite
                // whatever the reading task has not picked up yet.
                Ok(catalog) => {
                    let _ = slot.send(catalog);
                }
                Err(e) => {
                    warn!(device = %self.name, error = %e, "Discovery failed");
                }
            }
        }

        debug!(device = %self.name, "Discovery task stopped");
    }

    /// Reading cadence: probe connectivity, republish device info, adopt
    /// the newest catalog and publish readings. Any failure skips the cycle
    /// and leaves the previous snapshot in force; the cadence itself never
    /// backs off.
    async fn run_readings(
        self: Arc<Self>,
        mut slot: watch::Receiver<Vec<CatalogEntry>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = interval(self.interval);
        let mut catalog = slot.borrow_and_update().clone();

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.client.connection_check().await {
                warn!(device = %self.name, error = %e, "Connection check failed, skipping poll cycle");
                continue;
            }

            if let Err(e) = self.refresh_info().await {
                warn!(device = %self.name, error = %e, "Failed to refresh device info");
                continue;
            }

            if slot.has_changed().unwrap_or(false) {
                catalog = slot.borrow_and_update().clone();
                debug!(device = %self.name, sensors = catalog.len(), "Adopted fresh sensor catalog");
            }

            if let Err(e) = self.publish_readings(&catalog).await {
                warn!(device = %self.name, error = %e, "Failed to poll readings");
            }
        }

        debug!(device = %self.name, "Reading task stopped");
    }
}
