// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Decision engine: turns one cycle's readings into fan percentages.
//!
//! Every cycle runs the same pipeline, in this order:
//!
//! 1. curve lookup for pcie, cpu and hdd (unknown readings use the floor)
//! 2. chassis = max(cpu, pcie) + boost
//! 3. chassis soft cap
//! 4. critical override on raw temperatures (may exceed the soft cap)
//! 5. floor clamp
//! 6. step-limited smoothing against the last commanded percentages
//!
//! The engine owns the [`CommandedState`]. Computing a [`Decision`] never
//! mutates it; the actuation step reports what it issued via
//! [`DecisionEngine::record`].

use crate::channel::{Channel, ChannelPolicy, PerChannel};
use crate::curve::CurveSet;

/// Default additive boost of the chassis channel over max(cpu, pcie).
pub const DEFAULT_CHASSIS_BOOST: f64 = 10.0;

/// Default ceiling on the chassis channel outside critical conditions.
pub const DEFAULT_CHASSIS_SOFT_CAP: f64 = 50.0;

/// Default largest per-cycle change in percent.
pub const DEFAULT_SMOOTH_STEP: u8 = 5;

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// One cycle's reduced temperatures in degrees Celsius. `None` means unknown.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Readings {
    pub pcie_hot: Option<f64>,
    pub cpu: Option<f64>,
    pub hdd_max: Option<f64>,
}

impl Readings {
    /// The raw temperature feeding `channel`. Chassis has no sensor.
    pub fn for_channel(&self, channel: Channel) -> Option<f64> {
        match channel {
            Channel::Pcie => self.pcie_hot,
            Channel::Cpu => self.cpu,
            Channel::Hdd => self.hdd_max,
            Channel::Chassis => None,
        }
    }
}

/// Last percentage issued (attempted) per channel; `None` until the first
/// actuation.
pub type CommandedState = PerChannel<Option<u8>>;

/// Everything the engine needs besides readings and state.
#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub curves: CurveSet,
    pub channels: PerChannel<ChannelPolicy>,
    pub chassis_boost: f64,
    pub chassis_soft_cap: f64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            curves: CurveSet::default(),
            channels: default_channel_policies(),
            chassis_boost: DEFAULT_CHASSIS_BOOST,
            chassis_soft_cap: DEFAULT_CHASSIS_SOFT_CAP,
        }
    }
}

/// Built-in floors and critical thresholds.
pub fn default_channel_policies() -> PerChannel<ChannelPolicy> {
    let policy = |floor, critical_c| ChannelPolicy {
        floor,
        critical_c,
        step: DEFAULT_SMOOTH_STEP,
    };
    PerChannel {
        pcie: policy(15, Some(85.0)),
        chassis: policy(15, None),
        cpu: policy(15, Some(85.0)),
        hdd: policy(20, Some(57.0)),
    }
}

/// Result of one pass through the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    /// Curve stage output, chassis after boost and soft cap.
    pub curve: PerChannel<f64>,
    /// Target after critical override and floor clamp, before smoothing.
    pub desired: PerChannel<u8>,
    /// What should be issued this cycle.
    pub commanded: PerChannel<u8>,
    /// Channels whose raw temperature met the critical threshold.
    pub critical: Vec<Channel>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DecisionEngine {
    policy: Policy,
    state: CommandedState,
}

impl DecisionEngine {
    /// A fresh engine; the first decision bypasses smoothing.
    pub fn new(policy: Policy) -> Self {
        Self::with_state(policy, CommandedState::default())
    }

    /// An engine resuming from a known commanded state.
    pub fn with_state(policy: Policy, state: CommandedState) -> Self {
        Self { policy, state }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn state(&self) -> &CommandedState {
        &self.state
    }

    /// Remember that `pct` was issued to `channel`, whether or not the
    /// hardware accepted it.
    pub fn record(&mut self, channel: Channel, pct: u8) {
        *self.state.get_mut(channel) = Some(pct.min(100));
    }

    /// Run the pipeline for one cycle.
    pub fn decide(&self, readings: &Readings) -> Decision {
        let policy = &self.policy;
        let floor = |ch: Channel| f64::from(policy.channels.get(ch).floor);

        // Curve lookup, unknown readings fall back to the floor.
        let lookup = |ch: Channel| match (readings.for_channel(ch), policy.curves.get(ch)) {
            (Some(t), Some(curve)) => curve.evaluate(t),
            _ => floor(ch),
        };
        let mut pcie = lookup(Channel::Pcie);
        let mut cpu = lookup(Channel::Cpu);
        let mut hdd = lookup(Channel::Hdd);

        let mut chassis = (cpu.max(pcie) + policy.chassis_boost).clamp(0.0, 100.0);
        if chassis > policy.chassis_soft_cap {
            log::info!(
                "apply soft cap: chassis {chassis:.0}% -> {:.0}% (cap={:.0}%)",
                policy.chassis_soft_cap,
                policy.chassis_soft_cap
            );
            chassis = policy.chassis_soft_cap;
        }

        let curve = PerChannel {
            pcie,
            chassis,
            cpu,
            hdd,
        };
        log::info!("curve raw: {} (chassis +boost, soft-cap)", curve.map(|_, v| format!("{v:.1}")));

        let mut critical = Vec::new();
        for ch in [Channel::Pcie, Channel::Cpu, Channel::Hdd] {
            if policy.channels.get(ch).is_critical(readings.for_channel(ch)) {
                critical.push(ch);
            }
        }
        for &ch in &critical {
            match ch {
                Channel::Pcie => {
                    pcie = 100.0;
                    chassis = chassis.max(100.0);
                    log::warn!("pcie critical -> pcie=100% & chassis>=100%");
                }
                Channel::Cpu => {
                    cpu = 100.0;
                    chassis = chassis.max(100.0);
                    log::warn!("cpu critical -> cpu=100% & chassis>=100%");
                }
                Channel::Hdd => {
                    hdd = 100.0;
                    log::warn!("hdd critical -> hdd=100%");
                }
                Channel::Chassis => {}
            }
        }

        let pre_smoothing = PerChannel {
            pcie,
            chassis,
            cpu,
            hdd,
        };
        let desired = pre_smoothing.map(|ch, &pct| to_percent(pct.max(floor(ch))));
        let commanded = desired.map(|ch, &target| {
            smooth(*self.state.get(ch), target, self.policy.channels.get(ch).step)
        });
        log::info!("targets smoothed: {commanded}");

        Decision {
            curve,
            desired,
            commanded,
            critical,
        }
    }
}

/// Move from `prev` toward `target` by at most `step`. Without a previous
/// value the target is taken as-is.
pub fn smooth(prev: Option<u8>, target: u8, step: u8) -> u8 {
    let Some(prev) = prev else {
        return target;
    };
    if target > prev {
        prev.saturating_add(step).min(target)
    } else if target < prev {
        prev.saturating_sub(step).max(target)
    } else {
        prev
    }
}

fn to_percent(pct: f64) -> u8 {
    pct.round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curve::FanCurve;
    use proptest::prelude::*;

    fn readings(pcie_hot: Option<f64>, cpu: Option<f64>, hdd_max: Option<f64>) -> Readings {
        Readings {
            pcie_hot,
            cpu,
            hdd_max,
        }
    }

    #[test]
    fn test_smooth_first_cycle_bypass() {
        assert_eq!(smooth(None, 87, 5), 87);
        assert_eq!(smooth(None, 0, 1), 0);
    }

    #[test]
    fn test_smooth_limits_step() {
        assert_eq!(smooth(Some(40), 70, 5), 45);
        assert_eq!(smooth(Some(20), 15, 5), 15);
        assert_eq!(smooth(Some(20), 2, 5), 15);
        assert_eq!(smooth(Some(60), 60, 5), 60);
        assert_eq!(smooth(Some(98), 100, 5), 100);
    }

    #[test]
    fn test_unknown_reading_falls_back_to_floor() {
        let engine = DecisionEngine::new(Policy::default());
        let decision = engine.decide(&readings(None, None, None));
        assert_eq!(decision.curve.cpu, 15.0);
        assert_eq!(decision.curve.hdd, 20.0);
        assert_eq!(decision.desired.pcie, 15);
        assert_eq!(decision.desired.hdd, 20);
        // 15 + boost
        assert_eq!(decision.desired.chassis, 25);
        assert!(decision.critical.is_empty());
    }

    #[test]
    fn test_floor_is_strict_lower_bound() {
        let engine = DecisionEngine::new(Policy::default());
        // 20C is below every curve's first point; cpu curve gives 15, hdd 20.
        let decision = engine.decide(&readings(Some(20.0), Some(20.0), Some(20.0)));
        assert_eq!(decision.desired.pcie, 20);
        assert_eq!(decision.desired.cpu, 15);
        assert_eq!(decision.desired.hdd, 20);

        let mut policy = Policy::default();
        policy.channels.cpu.floor = 30;
        let decision = DecisionEngine::new(policy).decide(&readings(None, Some(45.0), None));
        assert!(decision.curve.cpu < 30.0);
        assert_eq!(decision.desired.cpu, 30);
    }

    #[test]
    fn test_critical_pcie_forces_full_speed() {
        let mut policy = Policy::default();
        policy.curves.pcie = FanCurve::from_pairs(&[(40.0, 20.0), (90.0, 60.0)]);
        let engine = DecisionEngine::new(policy);

        let decision = engine.decide(&readings(Some(90.0), Some(40.0), None));
        assert_eq!(decision.curve.pcie, 60.0);
        assert_eq!(decision.desired.pcie, 100);
        assert!(decision.desired.chassis >= 100);
        assert_eq!(decision.critical, vec![Channel::Pcie]);
    }

    #[test]
    fn test_soft_cap_applies_without_critical() {
        let engine = DecisionEngine::new(Policy::default());
        // cpu curve(70) = 70, pcie curve(65) = 50 -> chassis 80 before the cap
        let decision = engine.decide(&readings(Some(65.0), Some(70.0), None));
        assert_eq!(decision.curve.cpu, 70.0);
        assert_eq!(decision.curve.pcie, 50.0);
        assert_eq!(decision.curve.chassis, 50.0);
        assert_eq!(decision.desired.chassis, 50);
    }

    #[test]
    fn test_critical_cpu_bypasses_soft_cap() {
        let engine = DecisionEngine::new(Policy::default());
        let decision = engine.decide(&readings(Some(65.0), Some(86.0), None));
        assert_eq!(decision.desired.cpu, 100);
        assert_eq!(decision.desired.chassis, 100);
        assert_eq!(decision.commanded.chassis, 100);
    }

    #[test]
    fn test_critical_hdd_leaves_chassis_alone() {
        let engine = DecisionEngine::new(Policy::default());
        let decision = engine.decide(&readings(None, None, Some(57.0)));
        assert_eq!(decision.desired.hdd, 100);
        assert_eq!(decision.desired.chassis, 25);
        assert_eq!(decision.critical, vec![Channel::Hdd]);
    }

    #[test]
    fn test_multiple_critical_in_one_cycle() {
        let engine = DecisionEngine::new(Policy::default());
        let decision = engine.decide(&readings(Some(95.0), Some(90.0), Some(60.0)));
        assert_eq!(decision.critical, vec![Channel::Pcie, Channel::Cpu, Channel::Hdd]);
        assert_eq!(
            decision.desired,
            PerChannel {
                pcie: 100,
                chassis: 100,
                cpu: 100,
                hdd: 100
            }
        );
    }

    #[test]
    fn test_end_to_end_cycle_from_previous_state() {
        let state = PerChannel {
            pcie: Some(20),
            chassis: Some(15),
            cpu: Some(40),
            hdd: Some(20),
        };
        let engine = DecisionEngine::with_state(Policy::default(), state);
        let decision = engine.decide(&readings(None, Some(72.0), None));

        // (70,70)-(80,100): 70 + 0.2 * 30
        assert!((decision.curve.cpu - 76.0).abs() < 1e-9);
        assert_eq!(decision.desired.cpu, 76);
        assert_eq!(decision.commanded.cpu, 45);
        assert_eq!(decision.commanded.pcie, 15);
        assert_eq!(decision.commanded.hdd, 20);
        // 76 + 10 = 86, capped at 50, then one step up from 15
        assert_eq!(decision.desired.chassis, 50);
        assert_eq!(decision.commanded.chassis, 20);
    }

    #[test]
    fn test_chassis_ratchets_down_at_step_rate() {
        let mut engine = DecisionEngine::new(Policy::default());
        let hot = engine.decide(&readings(None, Some(90.0), None));
        for ch in Channel::ACTUATION_ORDER {
            engine.record(ch, *hot.commanded.get(ch));
        }
        assert_eq!(engine.state().chassis, Some(100));

        let cooled = engine.decide(&readings(None, Some(40.0), None));
        assert_eq!(cooled.desired.chassis, 25);
        assert_eq!(cooled.commanded.chassis, 95);
        assert_eq!(cooled.commanded.cpu, 95);
    }

    #[test]
    fn test_decide_does_not_touch_state() {
        let engine = DecisionEngine::new(Policy::default());
        let _ = engine.decide(&readings(Some(70.0), Some(70.0), Some(45.0)));
        assert_eq!(*engine.state(), CommandedState::default());
    }

    proptest! {
        #[test]
        fn prop_smooth_never_exceeds_step(prev in 0u8..=100, target in 0u8..=100, step in 1u8..=100) {
            let next = smooth(Some(prev), target, step);
            prop_assert!((i16::from(next) - i16::from(prev)).abs() <= i16::from(step));
        }

        #[test]
        fn prop_smooth_converges_without_overshoot(prev in 0u8..=100, target in 0u8..=100, step in 1u8..=20) {
            let distance = (i16::from(target) - i16::from(prev)).unsigned_abs();
            let calls = distance.div_ceil(u16::from(step));
            let mut current = prev;
            for _ in 0..calls {
                let next = smooth(Some(current), target, step);
                if prev <= target {
                    prop_assert!(next <= target);
                } else {
                    prop_assert!(next >= target);
                }
                current = next;
            }
            prop_assert_eq!(current, target);
        }

        #[test]
        fn prop_commanded_always_in_range(
            pcie in proptest::option::of(-20.0f64..150.0),
            cpu in proptest::option::of(-20.0f64..150.0),
            hdd in proptest::option::of(-20.0f64..150.0),
        ) {
            let engine = DecisionEngine::new(Policy::default());
            let decision = engine.decide(&readings(pcie, cpu, hdd));
            for ch in Channel::ALL {
                prop_assert!(*decision.commanded.get(ch) <= 100);
                prop_assert!(*decision.desired.get(ch) >= default_channel_policies().get(ch).floor);
            }
        }
    }
}
