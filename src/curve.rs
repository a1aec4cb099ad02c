// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Fan curve definitions and interpolation.
//!
//! A curve maps temperature readings to fan percentages (0-100).
//! Points are linearly interpolated between defined thresholds.
//! On disk a curve is a list of `[temperature, percentage]` pairs.

use crate::channel::Channel;
use serde::{Deserialize, Serialize};

/// A single point on a fan curve.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct CurvePoint {
    /// Temperature in degrees Celsius
    pub temp_c: f64,
    /// Fan duty in percent (0-100)
    pub pct: f64,
}

impl From<(f64, f64)> for CurvePoint {
    fn from((temp_c, pct): (f64, f64)) -> Self {
        Self { temp_c, pct }
    }
}

impl From<CurvePoint> for (f64, f64) {
    fn from(p: CurvePoint) -> Self {
        (p.temp_c, p.pct)
    }
}

/// A fan curve with an ordered list of temperature-to-percentage points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Vec<CurvePoint>", into = "Vec<CurvePoint>")]
pub struct FanCurve {
    /// Points sorted by ascending temperature. Equal temperatures keep
    /// their original relative order.
    points: Vec<CurvePoint>,
}

impl FanCurve {
    /// Create a new fan curve. Points are sorted by temperature automatically.
    pub fn new(mut points: Vec<CurvePoint>) -> Self {
        points.sort_by(|a, b| a.temp_c.total_cmp(&b.temp_c));
        Self { points }
    }

    /// Build a curve from `(temperature, percentage)` pairs.
    pub fn from_pairs(pairs: &[(f64, f64)]) -> Self {
        Self::new(pairs.iter().copied().map(CurvePoint::from).collect())
    }

    pub fn points(&self) -> &[CurvePoint] {
        &self.points
    }

    /// Evaluate the curve at a given temperature.
    ///
    /// - At or below the lowest point: returns the lowest point's percentage
    /// - At or above the highest point: returns the highest point's percentage
    /// - Between two points: linear interpolation over the first bracketing
    ///   segment; a zero-width segment yields its upper point
    pub fn evaluate(&self, temp_c: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 0.0;
        };
        if temp_c <= first.temp_c {
            return first.pct;
        }
        if temp_c >= last.temp_c {
            return last.pct;
        }

        for window in self.points.windows(2) {
            let lo = &window[0];
            let hi = &window[1];

            if lo.temp_c <= temp_c && temp_c <= hi.temp_c {
                let range_t = hi.temp_c - lo.temp_c;
                if range_t == 0.0 {
                    return hi.pct;
                }
                let frac = (temp_c - lo.temp_c) / range_t;
                return lo.pct + frac * (hi.pct - lo.pct);
            }
        }

        last.pct
    }

    /// Validate the curve has points, all values are finite and every
    /// percentage is within 0-100.
    pub fn validate(&self) -> Result<(), String> {
        if self.points.is_empty() {
            return Err("must be list of [temp, pct] with at least one point".to_string());
        }
        for (i, p) in self.points.iter().enumerate() {
            if !p.temp_c.is_finite() || !p.pct.is_finite() {
                return Err(format!("point {i} is not a finite number"));
            }
            if !(0.0..=100.0).contains(&p.pct) {
                return Err(format!("point {i} percentage {} outside 0-100", p.pct));
            }
        }
        Ok(())
    }
}

impl From<Vec<CurvePoint>> for FanCurve {
    fn from(points: Vec<CurvePoint>) -> Self {
        Self::new(points)
    }
}

impl From<FanCurve> for Vec<CurvePoint> {
    fn from(curve: FanCurve) -> Self {
        curve.points
    }
}

/// The curves of the three sensor-driven channels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveSet {
    pub pcie: FanCurve,
    pub cpu: FanCurve,
    pub hdd: FanCurve,
}

impl CurveSet {
    /// The curve driving `channel`; chassis has none.
    pub fn get(&self, channel: Channel) -> Option<&FanCurve> {
        match channel {
            Channel::Pcie => Some(&self.pcie),
            Channel::Cpu => Some(&self.cpu),
            Channel::Hdd => Some(&self.hdd),
            Channel::Chassis => None,
        }
    }
}

impl Default for CurveSet {
    fn default() -> Self {
        Self {
            pcie: default_pcie_curve(),
            cpu: default_cpu_curve(),
            hdd: default_hdd_curve(),
        }
    }
}

/// Default PCIe curve: tracks the hottest add-in card or DIMM.
pub fn default_pcie_curve() -> FanCurve {
    FanCurve::from_pairs(&[(40.0, 20.0), (65.0, 50.0), (75.0, 80.0), (80.0, 100.0)])
}

/// Default CPU curve, keyed on `Tctl`.
pub fn default_cpu_curve() -> FanCurve {
    FanCurve::from_pairs(&[(40.0, 15.0), (55.0, 40.0), (70.0, 70.0), (80.0, 100.0)])
}

/// Default HDD curve, keyed on the hottest SATA disk.
pub fn default_hdd_curve() -> FanCurve {
    FanCurve::from_pairs(&[(30.0, 20.0), (40.0, 35.0), (50.0, 60.0), (55.0, 100.0)])
}
