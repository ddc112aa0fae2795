//! Viewer state: latched instrument readings, acceleration baseline and the
//! rolling deviation window for the selected axis.
//!
//! One `ViewState` lives behind a single mutex. The connector's receive loop
//! writes through `ingest`, the input loop through the axis selectors, and
//! the render loop reads a whole frame under the same lock.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::{Acceleration, Axis, Snapshot};

pub type SharedState = Arc<Mutex<ViewState>>;

/// lock the shared state, recovering it if a holder panicked
pub fn lock(state: &Mutex<ViewState>) -> MutexGuard<'_, ViewState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// fixed-capacity FIFO of deviations, oldest first
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { samples: VecDeque::with_capacity(capacity), capacity }
    }

    /// append one sample; returns the evicted oldest one when full
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let evicted = if self.samples.len() == self.capacity { self.samples.pop_front() } else { None };
        self.samples.push_back(value);
        evicted
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = f64> + ExactSizeIterator + '_ {
        self.samples.iter().copied()
    }

    /// `max(|max|, |min|)` over the window, 0.0 when empty
    pub fn magnitude(&self) -> f64 {
        self.samples.iter().fold(0.0, |acc: f64, v| acc.max(v.abs()))
    }
}

#[derive(Debug, Clone)]
pub enum Baseline {
    Collecting { x: Vec<f64>, y: Vec<f64>, z: Vec<f64> },
    Calibrated(Acceleration),
}

impl Default for Baseline {
    fn default() -> Self {
        Baseline::Collecting { x: Vec::new(), y: Vec::new(), z: Vec::new() }
    }
}

impl Baseline {
    pub fn is_calibrated(&self) -> bool {
        matches!(self, Baseline::Calibrated(_))
    }

    pub fn reference(&self) -> Option<Acceleration> {
        match self {
            Baseline::Calibrated(reference) => Some(*reference),
            Baseline::Collecting { .. } => None,
        }
    }

    /// number of complete samples gathered so far (0 once calibrated)
    pub fn collected(&self) -> usize {
        match self {
            Baseline::Collecting { z, .. } => z.len(),
            Baseline::Calibrated(_) => 0,
        }
    }

    fn collect(&mut self, sample: Acceleration) {
        if let Baseline::Collecting { x, y, z } = self {
            x.push(sample.x);
            y.push(sample.y);
            z.push(sample.z);
        }
    }

    /// freeze the per-axis means; an axis with no samples gets 0.0
    fn calibrate(&mut self) -> Acceleration {
        let reference = match self {
            Baseline::Calibrated(reference) => return *reference,
            Baseline::Collecting { x, y, z } => Acceleration { x: mean(x), y: mean(y), z: mean(z) },
        };
        *self = Baseline::Calibrated(reference);
        reference
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct ViewState {
    latched: Snapshot,
    baseline: Baseline,
    window: RollingWindow,
    axis: Axis,
    latest: Option<Acceleration>,
}

impl ViewState {
    pub fn new(capacity: usize) -> Self {
        Self {
            latched: Snapshot::default(),
            baseline: Baseline::default(),
            window: RollingWindow::new(capacity),
            axis: Axis::default(),
            latest: None,
        }
    }

    pub fn shared(capacity: usize) -> SharedState {
        Arc::new(Mutex::new(Self::new(capacity)))
    }

    /// apply one inbound snapshot
    pub fn ingest(&mut self, snapshot: &Snapshot) {
        for (channel, value) in snapshot.present() {
            if !channel.is_acceleration() {
                self.latched.set(channel, value);
            }
        }

        // partial acceleration is ignored for both baseline and chart
        let Some(sample) = snapshot.acceleration() else {
            return;
        };
        self.latest = Some(sample);

        match &self.baseline {
            Baseline::Collecting { .. } => self.baseline.collect(sample),
            Baseline::Calibrated(reference) => {
                let deviation = sample.component(self.axis) - reference.component(self.axis);
                self.window.push(deviation);
            }
        }
    }

    /// end the collection phase; idempotent
    pub fn calibrate(&mut self) -> Acceleration {
        self.baseline.calibrate()
    }

    pub fn select_next_axis(&mut self) -> Axis {
        self.select_axis(self.axis.next())
    }

    pub fn select_previous_axis(&mut self) -> Axis {
        self.select_axis(self.axis.previous())
    }

    /// switch the charted axis; the window restarts, the baseline stays
    pub fn select_axis(&mut self, axis: Axis) -> Axis {
        self.axis = axis;
        self.window.clear();
        axis
    }

    pub fn axis(&self) -> Axis {
        self.axis
    }

    pub fn window(&self) -> &RollingWindow {
        &self.window
    }

    pub fn baseline(&self) -> &Baseline {
        &self.baseline
    }

    pub fn latched(&self) -> &Snapshot {
        &self.latched
    }

    /// latest complete sample minus the baseline, once calibrated
    pub fn latest_deviation(&self) -> Option<Acceleration> {
        let reference = self.baseline.reference()?;
        let latest = self.latest?;
        Some(Acceleration {
            x: latest.x - reference.x,
            y: latest.y - reference.y,
            z: latest.z - reference.z,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Channel;

    fn accel(x: f64, y: f64, z: f64) -> Snapshot {
        let mut s = Snapshot::default();
        s.set(Channel::AccelerationX, x);
        s.set(Channel::AccelerationY, y);
        s.set(Channel::AccelerationZ, z);
        s
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_calibration_then_deviation() {
        let mut state = ViewState::new(80);
        for _ in 0..100 {
            state.ingest(&accel(1.0, 0.0, 9.8));
        }
        assert_eq!(state.baseline().collected(), 100);
        assert!(state.window().is_empty());

        let reference = state.calibrate();
        assert!(close(reference.x, 1.0));
        assert!(close(reference.y, 0.0));
        assert!(close(reference.z, 9.8));

        state.ingest(&accel(1.0, 0.0, 10.3));
        let samples: Vec<f64> = state.window().iter().collect();
        assert_eq!(samples.len(), 1);
        assert!(close(samples[0], 0.5));

        let deviation = state.latest_deviation().unwrap();
        assert!(close(deviation.z, 0.5));
        assert!(close(deviation.x, 0.0));
    }

    #[test]
    fn test_empty_baseline_is_exactly_zero() {
        let mut state = ViewState::new(80);
        let reference = state.calibrate();
        assert_eq!(reference, Acceleration { x: 0.0, y: 0.0, z: 0.0 });

        state.ingest(&accel(0.1, 0.2, 0.3));
        assert_eq!(state.window().iter().collect::<Vec<_>>(), vec![0.3]);
    }

    #[test]
    fn test_calibrate_is_idempotent() {
        let mut state = ViewState::new(80);
        state.ingest(&accel(0.0, 0.0, 2.0));
        let first = state.calibrate();
        state.ingest(&accel(0.0, 0.0, 4.0));
        assert_eq!(state.calibrate(), first);
    }

    #[test]
    fn test_window_evicts_oldest_beyond_capacity() {
        let mut state = ViewState::new(80);
        state.calibrate();
        for i in 0..81 {
            state.ingest(&accel(0.0, 0.0, i as f64));
        }
        let samples: Vec<f64> = state.window().iter().collect();
        assert_eq!(samples.len(), 80);
        assert_eq!(samples[0], 1.0);
        assert_eq!(samples[79], 80.0);
    }

    #[test]
    fn test_rolling_window_reports_eviction() {
        let mut window = RollingWindow::new(2);
        assert_eq!(window.push(1.0), None);
        assert_eq!(window.push(-3.0), None);
        assert_eq!(window.push(2.0), Some(1.0));
        assert_eq!(window.magnitude(), 3.0);
    }

    #[test]
    fn test_axis_change_clears_window_keeps_baseline() {
        let mut state = ViewState::new(80);
        state.ingest(&accel(1.0, 2.0, 3.0));
        state.calibrate();
        state.ingest(&accel(1.5, 2.0, 3.0));
        assert_eq!(state.window().len(), 1);

        assert_eq!(state.select_next_axis(), Axis::X);
        assert!(state.window().is_empty());
        assert!(state.baseline().is_calibrated());

        state.ingest(&accel(1.5, 2.0, 3.0));
        assert_eq!(state.window().iter().collect::<Vec<_>>(), vec![0.5]);

        assert_eq!(state.select_previous_axis(), Axis::Z);
        assert!(state.window().is_empty());
    }

    #[test]
    fn test_partial_acceleration_is_ignored() {
        let mut state = ViewState::new(80);
        let mut partial = Snapshot::default();
        partial.set(Channel::AccelerationZ, 9.8);
        partial.set(Channel::Temperature, 21.5);
        state.ingest(&partial);

        assert_eq!(state.baseline().collected(), 0);
        assert_eq!(state.latched().temperature, Some(21.5));

        state.calibrate();
        state.ingest(&partial);
        assert!(state.window().is_empty());
        assert!(state.latest_deviation().is_none());
    }

    #[test]
    fn test_latched_readings_survive_snapshots_without_them() {
        let mut state = ViewState::new(80);
        let mut climate = Snapshot::default();
        climate.set(Channel::Humidity, 44.0);
        climate.set(Channel::Adc1, 1.25);
        state.ingest(&climate);
        state.ingest(&accel(0.0, 0.0, 1.0));

        assert_eq!(state.latched().humidity, Some(44.0));
        assert_eq!(state.latched().adc1, Some(1.25));
        assert_eq!(state.latched().co2, None);
        assert_eq!(state.latched().acceleration_z, None);
    }
}
