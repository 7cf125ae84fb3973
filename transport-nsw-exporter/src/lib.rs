//! Prometheus exporter for Transport NSW car park occupancy.
//!
//! Every scrape of the metrics endpoint triggers one pass over the configured
//! car park facilities: each facility is fetched from the Transport NSW open
//! data API and mapped into occupancy, capacity and freshness samples.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │ Transport NSW   │<────│    Collector    │<────│   HTTP Server   │
//! │ API (/carpark)  │────>│ (per facility)  │────>│   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! # Usage
//!
//! Run the exporter binary with a configuration file and the API token in
//! the environment:
//!
//! ```bash
//! TRANSPORT_NSW_API_TOKEN=... transport-nsw-exporter --config exporter.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod client;
pub mod collector;
pub mod config;
pub mod facility;
pub mod http;
pub mod metrics;
pub mod readiness;

pub use client::{ApiClient, ClientError, FacilitySource};
pub use collector::{CarParkCollector, SharedCollector};
pub use config::{ApiToken, ConfigError, ExporterConfig};
pub use http::{HttpServer, ServerError};
pub use metrics::CarParkDescriptors;
pub use readiness::{Lifecycle, ServerState};
