//! Prometheus metrics for the leveling pipeline

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};
use rank_common::{ActivitySource, AwardOutcome, DispatchReport};

#[derive(Clone)]
pub struct RankMetrics {
    pub awards_total: IntCounterVec,
    pub level_ups_total: IntCounter,
    pub role_grants_total: IntCounterVec,
    pub announcements_total: IntCounterVec,
    pub events_dropped_total: IntCounterVec,
    pub store_failures_total: IntCounter,
    pub voice_members: IntGauge,

    registry: Registry,
}

impl RankMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let awards_total = register_int_counter_vec_with_registry!(
            "rank_awards_total",
            "Activity events processed by source and result",
            &["source", "result"],
            registry
        )?;

        let level_ups_total = register_int_counter_with_registry!(
            "rank_level_ups_total",
            "Level-ups dispatched",
            registry
        )?;

        let role_grants_total = register_int_counter_vec_with_registry!(
            "rank_role_grants_total",
            "Level role grant attempts by result",
            &["result"],
            registry
        )?;

        let announcements_total = register_int_counter_vec_with_registry!(
            "rank_announcements_total",
            "Level-up announcements by result",
            &["result"],
            registry
        )?;

        let events_dropped_total = register_int_counter_vec_with_registry!(
            "rank_events_dropped_total",
            "Activity events dropped before the award policy, by reason",
            &["reason"],
            registry
        )?;

        let store_failures_total = register_int_counter_with_registry!(
            "rank_store_failures_total",
            "Awards abandoned because the ledger write failed",
            registry
        )?;

        let voice_members = register_int_gauge_with_registry!(
            "rank_voice_members",
            "Members currently tracked in voice channels",
            registry
        )?;

        Ok(Self {
            awards_total,
            level_ups_total,
            role_grants_total,
            announcements_total,
            events_dropped_total,
            store_failures_total,
            voice_members,
            registry,
        })
    }

    pub fn record_award(&self, source: ActivitySource, outcome: &AwardOutcome) {
        let result = if outcome.is_granted() { "granted" } else { "declined" };
        self.awards_total
            .with_label_values(&[source.as_str(), result])
            .inc();
    }

    pub fn record_dispatch(&self, report: &DispatchReport) {
        self.level_ups_total.inc();
        self.role_grants_total
            .with_label_values(&["granted"])
            .inc_by(report.granted.len() as u64);
        self.role_grants_total
            .with_label_values(&["held"])
            .inc_by(report.already_held.len() as u64);
        self.role_grants_total
            .with_label_values(&["failed"])
            .inc_by(report.failed.len() as u64);
        if report.announced_to.is_some() {
            self.announcements_total.with_label_values(&["sent"]).inc();
        }
        if report.announce_failed {
            self.announcements_total.with_label_values(&["failed"]).inc();
        }
    }

    pub fn record_dropped(&self, reason: &str) {
        self.events_dropped_total.with_label_values(&[reason]).inc();
    }

    /// Export metrics in Prometheus text format
    pub fn export(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            tracing::warn!("Failed to encode metrics: {}", e);
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
