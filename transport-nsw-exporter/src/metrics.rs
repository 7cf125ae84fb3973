//! Metric descriptors and Prometheus text exposition.

use std::fmt::Write;

/// Subsystem shared by every car park metric.
pub const CAR_PARK_SUBSYSTEM: &str = "car_park";

/// Labels attached to every per-facility car park metric except errors.
pub const FACILITY_LABELS: &[&str] = &["facility_id", "facility_name", "suburb", "address"];

/// Labels attached to the per-facility error counter.
pub const ERROR_LABELS: &[&str] = &["facility_id"];

/// Prometheus metric type, as written on the `# TYPE` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrometheusType {
    Counter,
    Gauge,
}

impl PrometheusType {
    /// Get the TYPE comment string for Prometheus exposition format.
    pub fn as_str(&self) -> &'static str {
        match self {
            PrometheusType::Counter => "counter",
            PrometheusType::Gauge => "gauge",
        }
    }
}

/// Every car park metric a collection pass can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CarParkMetric {
    Info,
    VehicleCount,
    SpotsTotal,
    LastUpdated,
    Errors,
}

impl CarParkMetric {
    /// Catalogue order, which is also exposition order.
    pub const ALL: [CarParkMetric; 5] = [
        CarParkMetric::Info,
        CarParkMetric::VehicleCount,
        CarParkMetric::SpotsTotal,
        CarParkMetric::LastUpdated,
        CarParkMetric::Errors,
    ];

    fn suffix(self) -> &'static str {
        match self {
            CarParkMetric::Info => "info",
            CarParkMetric::VehicleCount => "vehicle_count",
            CarParkMetric::SpotsTotal => "spots_total",
            CarParkMetric::LastUpdated => "last_updated_seconds",
            CarParkMetric::Errors => "errors",
        }
    }

    fn help(self) -> &'static str {
        match self {
            CarParkMetric::Info => "Car park information",
            CarParkMetric::VehicleCount => "Car park current vehicle count",
            CarParkMetric::SpotsTotal => "Car park total spots",
            CarParkMetric::LastUpdated => "Car park last updated timestamp",
            CarParkMetric::Errors => "Number of collector errors",
        }
    }

    fn labels(self) -> &'static [&'static str] {
        match self {
            CarParkMetric::Errors => ERROR_LABELS,
            _ => FACILITY_LABELS,
        }
    }

    fn index(self) -> usize {
        match self {
            CarParkMetric::Info => 0,
            CarParkMetric::VehicleCount => 1,
            CarParkMetric::SpotsTotal => 2,
            CarParkMetric::LastUpdated => 3,
            CarParkMetric::Errors => 4,
        }
    }
}

/// Static description of one exposed metric family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDesc {
    pub metric: CarParkMetric,
    pub name: String,
    pub help: &'static str,
    pub metric_type: PrometheusType,
    pub labels: &'static [&'static str],
}

/// Build a fully-qualified metric name from its components.
///
/// Empty components are skipped, so `("", "car_park", "info")` yields
/// `car_park_info`.
pub fn build_fq_name(namespace: &str, subsystem: &str, name: &str) -> String {
    [namespace, subsystem, name]
        .iter()
        .filter(|part| !part.is_empty())
        .copied()
        .collect::<Vec<_>>()
        .join("_")
}

/// The full catalogue of car park descriptors under one namespace.
#[derive(Debug, Clone)]
pub struct CarParkDescriptors {
    namespace: String,
    descs: Vec<MetricDesc>,
}

impl CarParkDescriptors {
    pub fn new(namespace: &str) -> Self {
        let descs = CarParkMetric::ALL
            .iter()
            .map(|&metric| MetricDesc {
                metric,
                name: build_fq_name(namespace, CAR_PARK_SUBSYSTEM, metric.suffix()),
                help: metric.help(),
                metric_type: PrometheusType::Gauge,
                labels: metric.labels(),
            })
            .collect();

        Self {
            namespace: namespace.to_string(),
            descs,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn get(&self, metric: CarParkMetric) -> &MetricDesc {
        &self.descs[metric.index()]
    }

    /// All descriptors, in catalogue order.
    pub fn all(&self) -> &[MetricDesc] {
        &self.descs
    }
}

/// One emitted data point.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub metric: CarParkMetric,
    /// Values for the metric's label schema, in schema order.
    pub label_values: Vec<String>,
    pub value: f64,
}

impl Sample {
    pub fn new(metric: CarParkMetric, label_values: Vec<String>, value: f64) -> Self {
        Self {
            metric,
            label_values,
            value,
        }
    }
}

/// Exporter-level counters rendered after the car park families.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExporterStats {
    /// Collection passes completed since startup.
    pub scrapes_total: u64,
    /// Per-facility errors accumulated since startup.
    pub facility_errors_total: u64,
    /// Wall time of the most recent collection pass.
    pub last_scrape_duration_secs: f64,
}

/// Accumulates samples into per-family buckets and renders them in
/// Prometheus text format 0.0.4.
///
/// Samples may arrive in any interleaving of families; the rendered output
/// groups them by family in catalogue order and keeps arrival order within
/// each family.
#[derive(Debug)]
pub struct TextEncoder<'a> {
    descriptors: &'a CarParkDescriptors,
    families: Vec<Vec<Sample>>,
}

impl<'a> TextEncoder<'a> {
    pub fn new(descriptors: &'a CarParkDescriptors) -> Self {
        Self {
            descriptors,
            families: vec![Vec::new(); CarParkMetric::ALL.len()],
        }
    }

    pub fn push(&mut self, sample: Sample) {
        self.families[sample.metric.index()].push(sample);
    }

    pub fn sample_count(&self) -> usize {
        self.families.iter().map(Vec::len).sum()
    }

    /// Render every buffered family, followed by the exporter stats.
    pub fn finish(self, stats: &ExporterStats) -> String {
        let mut output = String::with_capacity(self.sample_count() * 128 + 512);

        for desc in self.descriptors.all() {
            let series = &self.families[desc.metric.index()];
            if series.is_empty() {
                continue;
            }

            write_header(&mut output, &desc.name, desc.help, desc.metric_type);
            for sample in series {
                let labels: Vec<(&str, &str)> = desc
                    .labels
                    .iter()
                    .copied()
                    .zip(sample.label_values.iter().map(String::as_str))
                    .collect();
                writeln!(
                    output,
                    "{}{} {}",
                    desc.name,
                    format_labels(&labels),
                    format_value(sample.value)
                )
                .ok();
            }
        }

        let prefix = build_fq_name(self.descriptors.namespace(), "exporter", "");
        write_stat(
            &mut output,
            &format!("{}_scrapes_total", prefix),
            "Collection passes completed since startup",
            PrometheusType::Counter,
            stats.scrapes_total as f64,
        );
        write_stat(
            &mut output,
            &format!("{}_facility_errors_total", prefix),
            "Per-facility collection errors since startup",
            PrometheusType::Counter,
            stats.facility_errors_total as f64,
        );
        write_stat(
            &mut output,
            &format!("{}_last_scrape_duration_seconds", prefix),
            "Duration of the most recent collection pass",
            PrometheusType::Gauge,
            stats.last_scrape_duration_secs,
        );

        output
    }
}

fn write_header(output: &mut String, name: &str, help: &str, metric_type: PrometheusType) {
    writeln!(output, "# HELP {} {}", name, escape_help(help)).ok();
    writeln!(output, "# TYPE {} {}", name, metric_type.as_str()).ok();
}

fn write_stat(output: &mut String, name: &str, help: &str, metric_type: PrometheusType, value: f64) {
    write_header(output, name, help, metric_type);
    writeln!(output, "{} {}", name, format_value(value)).ok();
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Escape special characters in HELP text.
fn escape_help(help: &str) -> String {
    help.replace('\\', "\\\\").replace('\n', "\\n")
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(labels: &[(&str, &str)]) -> String {
    if labels.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_fq_name() {
        assert_eq!(
            build_fq_name("transport", "car_park", "info"),
            "transport_car_park_info"
        );
        assert_eq!(build_fq_name("", "car_park", "info"), "car_park_info");
        assert_eq!(build_fq_name("transport", "exporter", ""), "transport_exporter");
    }

    #[test]
    fn test_descriptor_catalogue() {
        let descriptors = CarParkDescriptors::new("transport");
        let names: Vec<&str> = descriptors.all().iter().map(|d| d.name.as_str()).collect();

        assert_eq!(
            names,
            vec![
                "transport_car_park_info",
                "transport_car_park_vehicle_count",
                "transport_car_park_spots_total",
                "transport_car_park_last_updated_seconds",
                "transport_car_park_errors",
            ]
        );
        assert_eq!(descriptors.get(CarParkMetric::Errors).labels, &["facility_id"]);
        assert_eq!(descriptors.get(CarParkMetric::Info).labels.len(), 4);
        assert!(
            descriptors
                .all()
                .iter()
                .all(|d| d.metric_type == PrometheusType::Gauge)
        );
    }

    #[test]
    fn test_descriptor_lookup_matches_metric() {
        let descriptors = CarParkDescriptors::new("tfnsw");
        for metric in CarParkMetric::ALL {
            assert_eq!(descriptors.get(metric).metric, metric);
        }
    }

    #[test]
    fn test_encoder_groups_families_in_catalogue_order() {
        let descriptors = CarParkDescriptors::new("transport");
        let mut encoder = TextEncoder::new(&descriptors);

        encoder.push(Sample::new(CarParkMetric::Errors, vec!["1".into()], 0.0));
        encoder.push(Sample::new(
            CarParkMetric::Info,
            vec!["2".into(), "B".into(), "S".into(), "A".into()],
            1.0,
        ));
        encoder.push(Sample::new(CarParkMetric::Errors, vec!["2".into()], 1.0));

        let output = encoder.finish(&ExporterStats::default());

        let info = output.find("# TYPE transport_car_park_info gauge").unwrap();
        let errors = output.find("# TYPE transport_car_park_errors gauge").unwrap();
        assert!(info < errors);
        assert_eq!(output.matches("# TYPE transport_car_park_errors").count(), 1);
        assert!(output.contains(
            "transport_car_park_info{facility_id=\"2\",facility_name=\"B\",suburb=\"S\",address=\"A\"} 1"
        ));
        let first = output.find("transport_car_park_errors{facility_id=\"1\"} 0").unwrap();
        let second = output.find("transport_car_park_errors{facility_id=\"2\"} 1").unwrap();
        assert!(first < second);
        assert!(!output.contains("vehicle_count"));
    }

    #[test]
    fn test_encoder_renders_exporter_stats() {
        let descriptors = CarParkDescriptors::new("transport");
        let encoder = TextEncoder::new(&descriptors);
        let stats = ExporterStats {
            scrapes_total: 3,
            facility_errors_total: 2,
            last_scrape_duration_secs: 0.25,
        };

        let output = encoder.finish(&stats);

        assert!(output.contains("# TYPE transport_exporter_scrapes_total counter"));
        assert!(output.contains("transport_exporter_scrapes_total 3"));
        assert!(output.contains("transport_exporter_facility_errors_total 2"));
        assert!(output.contains("transport_exporter_last_scrape_duration_seconds 0.25"));
    }

    #[test]
    fn test_escape_label_value() {
        assert_eq!(escape_label_value("simple"), "simple");
        assert_eq!(escape_label_value("with\"quote"), "with\\\"quote");
        assert_eq!(escape_label_value("with\\backslash"), "with\\\\backslash");
        assert_eq!(escape_label_value("with\nnewline"), "with\\nnewline");
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(42.0), "42");
        assert_eq!(format_value(1_709_288_130.0), "1709288130");
        assert_eq!(format_value(3.5), "3.5");
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::INFINITY), "+Inf");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
    }

    #[test]
    fn test_format_labels() {
        assert_eq!(format_labels(&[]), "");
        assert_eq!(
            format_labels(&[("a", "1"), ("b", "x\"y")]),
            "{a=\"1\",b=\"x\\\"y\"}"
        );
    }
}
