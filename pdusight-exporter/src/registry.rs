//! Device collector registry, request filtering and exposition encoding.

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::Arc;

use thiserror::Error;

use crate::collector::{DeviceCollector, MetricSample};

/// A selector that matched no registered device. Surfaced to the scraper as
/// an HTTP error so typos do not silently produce empty results.
#[derive(Debug, Error)]
#[error("no device matches endpoint selector '{0}'")]
pub struct UnknownSelector(pub String);

/// Owns one collector per configured device. Built once at startup; only
/// the snapshots inside the collectors mutate afterwards.
pub struct Registry {
    namespace: String,
    collectors: Vec<Arc<DeviceCollector>>,
}

impl Registry {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            collectors: Vec::new(),
        }
    }

    pub fn register(&mut self, collector: Arc<DeviceCollector>) {
        self.collectors.push(collector);
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Select the collectors a scrape request asked for.
    ///
    /// An empty selector list, a literal `all` or a lone `*` selects every
    /// device (valid even when none are registered). Each explicit selector
    /// must match at least one device.
    pub fn select(
        &self,
        selectors: &[String],
    ) -> Result<Vec<Arc<DeviceCollector>>, UnknownSelector> {
        let select_all = selectors.is_empty()
            || selectors
                .iter()
                .any(|s| s.eq_ignore_ascii_case("all") || s == "*");
        if select_all {
            return Ok(self.collectors.clone());
        }

        let mut selected: Vec<Arc<DeviceCollector>> = Vec::new();
        for selector in selectors {
            let pattern = std::slice::from_ref(selector);
            let mut matched_any = false;
            for collector in &self.collectors {
                if collector.matches(pattern) {
                    matched_any = true;
                    if !selected.iter().any(|c| Arc::ptr_eq(c, collector)) {
                        selected.push(collector.clone());
                    }
                }
            }
            if !matched_any {
                return Err(UnknownSelector(selector.clone()));
            }
        }

        Ok(selected)
    }

    /// Render the selected collectors in the text exposition format.
    pub fn encode(&self, collectors: &[Arc<DeviceCollector>]) -> String {
        let samples: Vec<MetricSample> = collectors
            .iter()
            .flat_map(|c| c.collect(&self.namespace))
            .collect();
        encode_samples(&samples)
    }
}

/// Encode samples in the text exposition format, grouping HELP/TYPE
/// comments per metric name. Names sort for stable output; two devices with
/// identical sensors share one TYPE header.
fn encode_samples(samples: &[MetricSample]) -> String {
    let mut by_name: BTreeMap<&str, Vec<&MetricSample>> = BTreeMap::new();
    for sample in samples {
        by_name.entry(&sample.name).or_default().push(sample);
    }

    let mut output = Vec::with_capacity(samples.len() * 100);
    for (name, series) in by_name {
        let Some(first) = series.first() else {
            continue;
        };
        writeln!(output, "# HELP {} {}", name, first.help).ok();
        writeln!(output, "# TYPE {name} gauge").ok();

        for sample in series {
            match sample.timestamp_ms {
                Some(timestamp) => writeln!(
                    output,
                    "{}{} {} {}",
                    sample.name,
                    crate::naming::format_labels(&sample.labels),
                    crate::naming::format_value(sample.value),
                    timestamp
                )
                .ok(),
                None => writeln!(
                    output,
                    "{}{} {}",
                    sample.name,
                    crate::naming::format_labels(&sample.labels),
                    crate::naming::format_value(sample.value)
                )
                .ok(),
            };
        }
    }

    String::from_utf8(output).unwrap_or_default()
}
