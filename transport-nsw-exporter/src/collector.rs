//! Car park collector: one upstream fetch per configured facility, mapped
//! into Prometheus samples on every scrape.
//!
//! Each facility is an isolated failure domain. Whatever happens upstream,
//! a facility contributes exactly one group of samples per pass, and that
//! group always ends with the facility's error counter.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::client::{ClientError, FacilitySource};
use crate::facility::{Facility, FieldError};
use crate::metrics::{CarParkDescriptors, CarParkMetric, ExporterStats, MetricDesc, Sample, TextEncoder};

/// All samples produced for one facility in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct FacilitySamples {
    pub facility_id: String,
    /// Samples in emission order; the last one is always the error counter.
    pub samples: Vec<Sample>,
    /// Errors counted for this facility during the pass.
    pub errors: u32,
}

/// Receives facility groups as a collection pass produces them.
pub trait SampleSink {
    fn accept(&mut self, group: FacilitySamples);
}

impl SampleSink for Vec<FacilitySamples> {
    fn accept(&mut self, group: FacilitySamples) {
        self.push(group);
    }
}

impl SampleSink for TextEncoder<'_> {
    fn accept(&mut self, group: FacilitySamples) {
        for sample in group.samples {
            self.push(sample);
        }
    }
}

/// Map one facility's fetch outcome into its sample group.
///
/// A failed fetch yields only the error counter (value 1). A successful
/// fetch yields the info sample followed by each numeric sample whose field
/// parsed; every field that did not parse is skipped and counted.
pub fn map_facility(facility_id: &str, outcome: Result<Facility, ClientError>) -> FacilitySamples {
    let mut samples = Vec::with_capacity(5);
    let mut errors = 0u32;

    match outcome {
        Err(e) => {
            warn!(facility_id = %facility_id, error = %e, "unable to fetch carpark data");
            errors += 1;
        }
        Ok(facility) => {
            let readings = facility.readings(facility_id);
            let labels = readings.info.label_values();

            samples.push(Sample::new(CarParkMetric::Info, labels.clone(), 1.0));

            let numeric = [
                (CarParkMetric::VehicleCount, readings.vehicle_count),
                (CarParkMetric::SpotsTotal, readings.spots_total),
                (CarParkMetric::LastUpdated, readings.last_updated),
            ];
            for (metric, reading) in numeric {
                match reading {
                    Ok(value) => samples.push(Sample::new(metric, labels.clone(), value as f64)),
                    Err(e) => {
                        log_field_error(facility_id, &e);
                        errors += 1;
                    }
                }
            }
        }
    }

    samples.push(Sample::new(
        CarParkMetric::Errors,
        vec![facility_id.to_string()],
        f64::from(errors),
    ));

    FacilitySamples {
        facility_id: facility_id.to_string(),
        samples,
        errors,
    }
}

fn log_field_error(facility_id: &str, error: &FieldError) {
    match error {
        FieldError::InvalidTimestamp { .. } => {
            warn!(facility_id = %facility_id, error = %error, "unable to parse time")
        }
        _ => warn!(facility_id = %facility_id, error = %error, "unable to parse field"),
    }
}

/// Collector over a fixed, ordered set of car park facilities.
pub struct CarParkCollector {
    source: Arc<dyn FacilitySource>,
    facility_ids: Arc<[String]>,
    descriptors: CarParkDescriptors,
    stats: RwLock<ExporterStats>,
}

impl CarParkCollector {
    /// Create a new collector.
    pub fn new(
        source: Arc<dyn FacilitySource>,
        facility_ids: Vec<String>,
        descriptors: CarParkDescriptors,
    ) -> Self {
        Self {
            source,
            facility_ids: facility_ids.into(),
            descriptors,
            stats: RwLock::new(ExporterStats::default()),
        }
    }

    /// The static list of metric families this collector can ever emit.
    pub fn describe(&self) -> &[MetricDesc] {
        self.descriptors.all()
    }

    pub fn descriptors(&self) -> &CarParkDescriptors {
        &self.descriptors
    }

    pub fn facility_ids(&self) -> &[String] {
        &self.facility_ids
    }

    /// Get exporter statistics.
    pub fn stats(&self) -> ExporterStats {
        self.stats.read().clone()
    }

    /// Run one collection pass, pushing each facility's group into `sink`.
    ///
    /// Fetches for all facilities run concurrently; groups are handed to the
    /// sink in configuration order, each as soon as it and every facility
    /// before it have resolved. Returns the total error count of the pass.
    pub async fn collect<S: SampleSink + ?Sized>(&self, sink: &mut S) -> u64 {
        let started = Instant::now();

        let handles: Vec<_> = self
            .facility_ids
            .iter()
            .map(|id| {
                let source = Arc::clone(&self.source);
                let id = id.clone();
                tokio::spawn(async move { source.fetch(&id).await })
            })
            .collect();

        let mut total_errors = 0u64;
        for (id, handle) in self.facility_ids.iter().zip(handles) {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    // A panicking fetch still owes its facility an error sample.
                    warn!(facility_id = %id, error = %e, "carpark fetch task failed");
                    let group = failed_group(id);
                    total_errors += u64::from(group.errors);
                    sink.accept(group);
                    continue;
                }
            };

            let group = map_facility(id, outcome);
            total_errors += u64::from(group.errors);
            sink.accept(group);
        }

        let elapsed = started.elapsed();
        {
            let mut stats = self.stats.write();
            stats.scrapes_total += 1;
            stats.facility_errors_total += total_errors;
            stats.last_scrape_duration_secs = elapsed.as_secs_f64();
        }

        debug!(
            facilities = self.facility_ids.len(),
            errors = total_errors,
            duration_ms = elapsed.as_millis() as u64,
            "Collection pass finished"
        );

        total_errors
    }

    /// Run one collection pass and render it in Prometheus text format.
    pub async fn render(&self) -> String {
        let mut encoder = TextEncoder::new(&self.descriptors);
        self.collect(&mut encoder).await;
        encoder.finish(&self.stats())
    }
}

/// Group for a facility whose fetch never produced an outcome.
fn failed_group(facility_id: &str) -> FacilitySamples {
    FacilitySamples {
        facility_id: facility_id.to_string(),
        samples: vec![Sample::new(
            CarParkMetric::Errors,
            vec![facility_id.to_string()],
            1.0,
        )],
        errors: 1,
    }
}

/// Create a shareable collector handle.
pub type SharedCollector = Arc<CarParkCollector>;
