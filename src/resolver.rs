//! Turns raw snapshot fields into the exposed values: scaling, zero-fallback
//! persistence, and the monotonic-counter guard.

use chrono::{NaiveDateTime, Timelike};

use crate::{
    metric::{MetricDescriptor, PersistencePolicy, PlantMetric, PvMetric},
    prelude::*,
    snapshot::PlantSnapshot,
};

/// Largest accepted one-step increase of a cumulative counter, kilowatt-hours
/// per panel. A plausibility envelope scaled to the installation size, not a
/// physical law.
pub const MAX_STEP_PER_PANEL: f64 = 0.5;

/// Guard cell of one cumulative counter metric: never shared across metrics
/// or across microinverters, never reset for the process lifetime.
#[derive(Debug, Default)]
pub struct CorrectionState {
    last_accepted: f64,
}

impl CorrectionState {
    /// Accept or reject a candidate reading.
    ///
    /// Decreases and implausible spikes resolve to the last accepted value;
    /// a step of exactly `panel_count * MAX_STEP_PER_PANEL` is still
    /// accepted. Rejections are deliberately invisible in the exposed
    /// series and only show up in the logs.
    pub fn push(&mut self, candidate: f64, panel_count: usize) -> f64 {
        if candidate < self.last_accepted {
            debug!(
                candidate,
                last_accepted = self.last_accepted,
                "rejected a decreasing counter reading",
            );
            return self.last_accepted;
        }
        #[allow(clippy::cast_precision_loss)]
        let bound = panel_count as f64 * MAX_STEP_PER_PANEL;
        if self.last_accepted > 0.0 && candidate > self.last_accepted + bound {
            debug!(
                candidate,
                last_accepted = self.last_accepted,
                bound,
                "rejected an implausible counter step",
            );
            return self.last_accepted;
        }
        self.last_accepted = candidate;
        candidate
    }
}

/// Mutable state of one exposed metric.
pub struct MetricState {
    /// The previously exposed value, kept for the carry-forward policies.
    last_value: Option<f64>,

    correction: Option<CorrectionState>,
}

impl MetricState {
    pub fn new(descriptor: &MetricDescriptor) -> Self {
        Self {
            last_value: None,
            correction: descriptor.monotonic.then(CorrectionState::default),
        }
    }
}

/// Resolve a plant-level metric.
///
/// Pure in everything but `state`; `None` means the value is unknown for
/// this cycle.
pub fn resolve_plant(
    metric: PlantMetric,
    snapshot: Option<&PlantSnapshot>,
    panel_count: usize,
    now: NaiveDateTime,
    state: &mut MetricState,
) -> Option<f64> {
    let snapshot = snapshot?;
    let descriptor = metric.descriptor();
    let mut value = if snapshot.total_production > 0.0 {
        Some(metric.raw(snapshot) / descriptor.scale)
    } else {
        zero_plant_fallback(descriptor, now, state)
    };
    if snapshot.total_production <= 0.0
        && let Some(counter) = metric.per_port_counter()
    {
        // The plant counter lags or resets independently of the per-port
        // counters; a positive per-port sum wins over the zero.
        let scale = counter.descriptor().scale;
        let sum: f64 =
            snapshot.microinverters.iter().map(|unit| counter.raw(unit) / scale).sum();
        if sum > 0.0 {
            value = Some(sum);
        }
    }
    if let (Some(correction), Some(candidate)) = (state.correction.as_mut(), value) {
        value = Some(correction.push(candidate, panel_count));
    }
    state.last_value = value;
    value
}

/// Resolve a per-microinverter metric for the port at `index` (zero-based).
///
/// The plant-level total gates the zero-fallback here as well: an all-zero
/// plant means the device has just reset or is not reporting yet.
pub fn resolve_pv(
    metric: PvMetric,
    index: usize,
    snapshot: Option<&PlantSnapshot>,
    now: NaiveDateTime,
    state: &mut MetricState,
) -> Option<f64> {
    let snapshot = snapshot?;
    let descriptor = metric.descriptor();
    let value = if snapshot.total_production > 0.0 {
        let unit = snapshot.microinverters.get(index)?;
        Some(metric.raw(unit) / descriptor.scale)
    } else {
        zero_plant_fallback(descriptor, now, state)
    };
    state.last_value = value;
    value
}

fn zero_plant_fallback(
    descriptor: &MetricDescriptor,
    now: NaiveDateTime,
    state: &MetricState,
) -> Option<f64> {
    match descriptor.persistence {
        PersistencePolicy::None => Some(0.0),
        PersistencePolicy::CarryForward => state.last_value,
        PersistencePolicy::ResetAtMidnight if now.hour() == 0 => Some(0.0),
        PersistencePolicy::ResetAtMidnight => state.last_value,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use chrono::NaiveDate;

    use super::*;
    use crate::link::testing::{microinverter, plant};

    fn at_hour(hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 8, 23).unwrap().and_hms_opt(hour, 15, 0).unwrap()
    }

    fn total_state() -> MetricState {
        MetricState::new(PlantMetric::TotalProduction.descriptor())
    }

    /// Feed a snapshot whose per-port totals yield the given plant total in
    /// kilowatt-hours (4 panels).
    fn resolve_total(state: &mut MetricState, total_kwh: f64) -> Option<f64> {
        let snapshot = plant(total_kwh * 1000.0 / 4.0, 4);
        resolve_plant(PlantMetric::TotalProduction, Some(&snapshot), 4, at_hour(13), state)
    }

    #[test]
    fn unknown_snapshot_resolves_to_unknown() {
        let mut state = total_state();
        assert_eq!(resolve_total(&mut state, 10.0), Some(10.0));
        assert_eq!(
            resolve_plant(PlantMetric::TotalProduction, None, 4, at_hour(13), &mut state),
            None,
        );
    }

    #[test]
    fn resolved_cumulative_series_is_non_decreasing() {
        let mut state = total_state();
        let raw = [10.0, 10.4, 9.8, 10.9, 10.2, 11.3];
        let mut previous = 0.0;
        for total in raw {
            let resolved = resolve_total(&mut state, total).unwrap();
            assert!(resolved >= previous, "series decreased: {previous} -> {resolved}");
            previous = resolved;
        }
    }

    #[test]
    fn decrease_resolves_to_the_previous_value() {
        let mut state = total_state();
        assert_eq!(resolve_total(&mut state, 10.0), Some(10.0));
        assert_eq!(resolve_total(&mut state, 8.0), Some(10.0));
    }

    #[test]
    fn step_at_the_bound_is_accepted() {
        // 4 panels: the envelope is exactly 2 kWh.
        let mut state = total_state();
        assert_eq!(resolve_total(&mut state, 10.0), Some(10.0));
        assert_eq!(resolve_total(&mut state, 12.0), Some(12.0));
    }

    #[test]
    fn step_above_the_bound_is_rejected() {
        let mut state = total_state();
        assert_eq!(resolve_total(&mut state, 10.0), Some(10.0));
        assert_relative_eq!(resolve_total(&mut state, 12.1).unwrap(), 10.0);
    }

    #[test]
    fn first_reading_is_accepted_regardless_of_size() {
        // The guard starts at zero: the envelope only applies once a positive
        // value has been accepted.
        let mut state = total_state();
        assert_eq!(resolve_total(&mut state, 1234.5), Some(1234.5));
    }

    #[test]
    fn zero_plant_with_policy_none_resolves_to_zero() {
        let snapshot = plant(0.0, 4);
        let mut state = MetricState::new(PlantMetric::PvPower.descriptor());
        assert_eq!(
            resolve_plant(PlantMetric::PvPower, Some(&snapshot), 4, at_hour(13), &mut state),
            Some(0.0),
        );
    }

    #[test]
    fn reset_at_midnight_zeroes_only_during_the_midnight_hour() {
        let descriptor = PvMetric::TodayProduction.descriptor();
        let mut state = MetricState::new(descriptor);
        let reporting = plant(100_000.0, 4);
        assert_relative_eq!(
            resolve_pv(PvMetric::TodayProduction, 0, Some(&reporting), at_hour(13), &mut state)
                .unwrap(),
            0.45,
        );
        let reset = plant(0.0, 4);
        assert_relative_eq!(
            resolve_pv(PvMetric::TodayProduction, 0, Some(&reset), at_hour(13), &mut state)
                .unwrap(),
            0.45,
        );
        assert_eq!(
            resolve_pv(PvMetric::TodayProduction, 0, Some(&reset), at_hour(0), &mut state),
            Some(0.0),
        );
    }

    #[test]
    fn carry_forward_without_a_prior_value_stays_unknown() {
        let snapshot = plant(0.0, 4);
        let mut state = MetricState::new(PvMetric::TotalProduction.descriptor());
        assert_eq!(
            resolve_pv(PvMetric::TotalProduction, 0, Some(&snapshot), at_hour(13), &mut state),
            None,
        );
    }

    #[test]
    fn zero_plant_counter_falls_back_to_the_per_port_sum() {
        // The plant counter reads zero while the ports still report data.
        let mut units: Vec<_> = (1..=4).map(|port| microinverter(port, 2500.0)).collect();
        for unit in &mut units {
            unit.today_production = 450.0;
        }
        let mut snapshot = plant(0.0, 4);
        snapshot.microinverters = units;
        let mut state = MetricState::new(PlantMetric::TodayProduction.descriptor());
        assert_relative_eq!(
            resolve_plant(PlantMetric::TodayProduction, Some(&snapshot), 4, at_hour(13), &mut state)
                .unwrap(),
            1.8,
        );
    }

    #[test]
    fn guard_applies_to_the_fallback_sum_too() {
        let mut state = total_state();
        assert_eq!(resolve_total(&mut state, 10.0), Some(10.0));
        // Plant counter resets to zero, per-port counters spike implausibly.
        let mut snapshot = plant(0.0, 4);
        snapshot.microinverters =
            (1..=4).map(|port| microinverter(port, 20_000.0)).collect();
        snapshot.total_production = 0.0;
        assert_relative_eq!(
            resolve_plant(
                PlantMetric::TotalProduction,
                Some(&snapshot),
                4,
                at_hour(13),
                &mut state,
            )
            .unwrap(),
            10.0,
        );
    }
}
