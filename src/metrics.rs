//! Prometheus surface of the election subsystem.
//!
//! The gauge carries the wall-clock start of the election in flight (0 when
//! none is running); the histogram records how long a peer took from
//! entering `look_for_leader` to a decided vote.

use lazy_static::lazy_static;
use prometheus::GaugeVec;
use prometheus::HistogramOpts;
use prometheus::HistogramVec;
use prometheus::Opts;
use prometheus::Registry;
use prometheus::exponential_buckets;

lazy_static! {
    pub static ref ELECTION_START_AT_METRIC: GaugeVec = GaugeVec::new(
        Opts::new(
            "election_start_at",
            "Unix millis at which the in-flight leader election started"
        ),
        &["sid"]
    )
    .expect("metric can not be created");
    pub static ref ELECTION_DECISION_LATENCY_METRIC: HistogramVec = HistogramVec::new(
        HistogramOpts::new(
            "election_decision_latency_metric",
            "Histogram of leader election decision latency in ms"
        )
        .buckets(exponential_buckets(1.0, 2.0, 16).unwrap()),
        &["sid"]
    )
    .expect("metric can not be created");
    pub static ref CUSTOM_REGISTRY: Registry =
        Registry::new_custom(Some("fle".to_string()), None).unwrap();
}

pub fn register_custom_metrics(registry: &Registry) {
    registry
        .register(Box::new(ELECTION_START_AT_METRIC.clone()))
        .expect("collector can be registered");
    registry
        .register(Box::new(ELECTION_DECISION_LATENCY_METRIC.clone()))
        .expect("collector can be registered");
}
