use tracing::trace;

// Trace-based metric helpers; the prometheus recorder installed in main
// covers process defaults, these add per-route and per-run signals.

pub fn inc_requests(route: &'static str) {
    trace!(
        target = "flatlay.metrics",
        route = route,
        "requests_total_inc"
    );
}

pub fn run_elapsed(run: &'static str, elapsed_ms: u128) {
    trace!(
        target = "flatlay.metrics",
        run = run,
        elapsed_ms = elapsed_ms as u64,
        "run_elapsed"
    );
}
