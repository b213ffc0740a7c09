// Prometheus metrics for the flowchart service
//
// Exposed on the optional /metrics listener:
// - Tool invocations by outcome (counter)
// - Turns debited (counter)
// - Generation latency (histogram)
// - Tracked rate-limit identities (gauge)
// - JSON-RPC requests by method (counter)

use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

lazy_static! {
    pub static ref REGISTRY: Arc<Registry> = Arc::new(Registry::new());

    // Pipeline metrics
    pub static ref INVOCATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("flowchart_invocations_total", "code_to_flowchart invocations by outcome"),
        &["outcome"]
    ).expect("Failed to create invocations metric");

    pub static ref TURNS_DEBITED_TOTAL: IntCounter = IntCounter::new(
        "quota_turns_debited_total",
        "Turns debited from account quotas"
    ).expect("Failed to create turns debited metric");

    pub static ref GENERATION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new("generation_duration_seconds", "Completion call latency in seconds")
            .buckets(vec![0.5, 1.0, 2.5, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0]),
    ).expect("Failed to create generation duration metric");

    // Rate limit metrics
    pub static ref RATE_LIMIT_TRACKED_IDENTITIES: IntGauge = IntGauge::new(
        "rate_limit_tracked_identities",
        "Identities currently held in the admission table"
    ).expect("Failed to create tracked identities metric");

    pub static ref RATE_LIMIT_REJECTIONS_TOTAL: IntCounter = IntCounter::new(
        "rate_limit_rejections_total",
        "Requests rejected by the admission window"
    ).expect("Failed to create rate limit rejections metric");

    // Protocol metrics
    pub static ref RPC_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("mcp_rpc_requests_total", "JSON-RPC requests by method"),
        &["method"]
    ).expect("Failed to create RPC requests metric");
}

/// Register all metrics with the registry.
///
/// Safe to call more than once; already-registered collectors are skipped.
pub fn init() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(INVOCATIONS_TOTAL.clone()),
        Box::new(TURNS_DEBITED_TOTAL.clone()),
        Box::new(GENERATION_DURATION_SECONDS.clone()),
        Box::new(RATE_LIMIT_TRACKED_IDENTITIES.clone()),
        Box::new(RATE_LIMIT_REJECTIONS_TOTAL.clone()),
        Box::new(RPC_REQUESTS_TOTAL.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| anyhow::anyhow!("Failed to encode metrics: {}", e))?;
    String::from_utf8(buffer).map_err(|e| anyhow::anyhow!("Invalid UTF-8 in metrics: {}", e))
}
