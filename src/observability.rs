use std::net::SocketAddr;

use crate::engine::{EngineError, ValidationError};

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: schedule mutations. Labels: op, status.
pub const SCHEDULE_MUTATIONS_TOTAL: &str = "classgrid_schedule_mutations_total";

/// Counter: rejected schedule mutations. Labels: op, reason.
pub const SCHEDULE_REJECTIONS_TOTAL: &str = "classgrid_schedule_rejections_total";

/// Histogram: time spent in the allocation validator, seconds. Labels: op.
pub const VALIDATION_DURATION_SECONDS: &str = "classgrid_validation_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: persisted schedules.
pub const SCHEDULES_ACTIVE: &str = "classgrid_schedules_active";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "classgrid_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "classgrid_wal_flush_batch_size";

/// Counter: completed WAL compactions.
pub const WAL_COMPACTIONS_TOTAL: &str = "classgrid_wal_compactions_total";

/// Install the fmt subscriber. Safe to call more than once.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().try_init();
}

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a rejection reason.
pub fn rejection_label(v: &ValidationError) -> &'static str {
    match v {
        ValidationError::DuplicateAssignment { .. } => "duplicate_assignment",
        ValidationError::BusyClassroom { .. } => "busy_classroom",
        ValidationError::BusyInstructor { .. } => "busy_instructor",
        ValidationError::OverlappingSchedule { .. } => "overlapping_schedule",
        ValidationError::ReferenceNotFound(_) => "reference_not_found",
    }
}

pub fn status_label(e: &EngineError) -> &'static str {
    match e {
        EngineError::Rejected(_) => "rejected",
        EngineError::NotFound(_) => "not_found",
        EngineError::AlreadyExists(_) | EngineError::StillReferenced(_) => "conflict",
        EngineError::InvalidInput(_) | EngineError::LimitExceeded(_) => "invalid",
        EngineError::UniqueViolation(_) | EngineError::WalError(_) => "error",
    }
}

/// Count one schedule mutation outcome.
pub fn record_mutation<T>(op: &'static str, result: &Result<T, EngineError>) {
    let status = match result {
        Ok(_) => "ok",
        Err(e) => status_label(e),
    };
    metrics::counter!(SCHEDULE_MUTATIONS_TOTAL, "op" => op, "status" => status).increment(1);
    if let Err(EngineError::Rejected(v)) = result {
        metrics::counter!(SCHEDULE_REJECTIONS_TOTAL, "op" => op, "reason" => rejection_label(v))
            .increment(1);
    }
}
