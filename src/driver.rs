// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! The control loop: sample → decide → actuate, once or forever.
//!
//! Cycles never overlap. The next cycle starts after a fixed sleep that
//! begins when the previous cycle finished, so an overrunning cycle delays
//! everything after it rather than causing a burst.

use crate::actuator::FanSink;
use crate::aggregator::SensorAggregator;
use crate::channel::{Channel, PerChannel};
use crate::engine::{Decision, DecisionEngine};
use crate::error::ActuationError;
use std::future::Future;
use std::time::Duration;

/// Shortest sleep between two cycles.
pub const MIN_INTERVAL: Duration = Duration::from_secs(1);

/// How long the controller keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// A single cycle.
    Once,
    /// Cycle, sleep `interval` (at least [`MIN_INTERVAL`]), repeat until
    /// shut down.
    Forever { interval: Duration },
}

pub struct Controller {
    sensors: SensorAggregator,
    engine: DecisionEngine,
    sink: Box<dyn FanSink>,
}

impl Controller {
    pub fn new(sensors: SensorAggregator, engine: DecisionEngine, sink: Box<dyn FanSink>) -> Self {
        Self {
            sensors,
            engine,
            sink,
        }
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    /// One full cycle. The decision is returned for inspection.
    pub async fn run_cycle(&mut self) -> Decision {
        let readings = self.sensors.sample().await;
        let decision = self.engine.decide(&readings);
        log::info!("=== sampling end ===");
        self.actuate(&decision.commanded).await;
        decision
    }

    /// Issue every channel, chassis first. A failure is logged and the
    /// remaining channels are still issued; the commanded state records
    /// what was attempted either way.
    async fn actuate(&mut self, commanded: &PerChannel<u8>) {
        for channel in Channel::ACTUATION_ORDER {
            let pct = *commanded.get(channel);
            if let Err(e) = self.sink.set(channel, pct).await {
                log::warn!("set {channel} -> {pct}% failed: {e}");
            }
            self.engine.record(channel, pct);
        }
    }

    /// Run in `mode`. In [`RunMode::Forever`] this returns only once
    /// `shutdown` resolves.
    pub async fn run(&mut self, mode: RunMode, shutdown: impl Future<Output = ()>) {
        match mode {
            RunMode::Once => {
                self.run_cycle().await;
            }
            RunMode::Forever { interval } => {
                if interval < MIN_INTERVAL {
                    log::warn!("interval {interval:?} too short, using {MIN_INTERVAL:?}");
                }
                let interval = interval.max(MIN_INTERVAL);
                let cycles = async {
                    loop {
                        self.run_cycle().await;
                        log::info!("sleep {:?} ...", interval);
                        tokio::time::sleep(interval).await;
                    }
                };
                tokio::select! {
                    _ = cycles => {}
                    _ = shutdown => log::info!("Received shutdown signal"),
                }
            }
        }
    }
}

/// One immediate actuation outside the control loop.
pub async fn set_manual(sink: &dyn FanSink, channel: Channel, pct: u8) -> Result<(), ActuationError> {
    let pct = pct.min(100);
    log::info!("manual set: {channel} -> {pct}%");
    sink.set(channel, pct).await
}

/// Resolves on SIGINT or SIGTERM.
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                log::warn!("Failed to install SIGTERM handler: {e}");
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::SetFuture;
    use crate::engine::Policy;
    use crate::error::ToolError;
    use crate::sensors::{DeviceDiscovery, DiscoverFuture, ReadFuture, SensorReading, TempSource};
    use std::sync::{Arc, Mutex};

    struct Fixed(Option<f64>);

    impl TempSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read(&self) -> ReadFuture<'_> {
            let reading = match self.0 {
                Some(v) => SensorReading::Value(v),
                None => SensorReading::Unavailable("absent".to_string()),
            };
            Box::pin(async move { reading })
        }
    }

    struct NoDisks;

    impl DeviceDiscovery for NoDisks {
        fn discover(&self) -> DiscoverFuture<'_> {
            Box::pin(async { Vec::new() })
        }
    }

    #[derive(Clone, Default)]
    struct RecordingSink {
        calls: Arc<Mutex<Vec<(Channel, u8)>>>,
        fail: Option<Channel>,
    }

    impl RecordingSink {
        fn calls(&self) -> Vec<(Channel, u8)> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl FanSink for RecordingSink {
        fn set(&self, channel: Channel, pct: u8) -> SetFuture<'_> {
            self.calls.lock().unwrap().push((channel, pct));
            let fail = self.fail == Some(channel);
            Box::pin(async move {
                if fail {
                    Err(ActuationError::Tool(ToolError::Timeout {
                        tool: "ipmitool".to_string(),
                        timeout: Duration::from_secs(8),
                    }))
                } else {
                    Ok(())
                }
            })
        }
    }

    fn controller(cpu: Option<f64>, sink: RecordingSink) -> Controller {
        let sensors = SensorAggregator::new(vec![], vec![Box::new(Fixed(cpu))], Box::new(NoDisks));
        Controller::new(sensors, DecisionEngine::new(Policy::default()), Box::new(sink))
    }

    #[tokio::test]
    async fn test_cycle_actuates_chassis_first() {
        let sink = RecordingSink::default();
        let mut ctl = controller(Some(72.0), sink.clone());
        ctl.run(RunMode::Once, std::future::pending()).await;

        let channels: Vec<Channel> = sink.calls().iter().map(|&(ch, _)| ch).collect();
        assert_eq!(channels, Channel::ACTUATION_ORDER.to_vec());
        // first cycle: no smoothing
        assert_eq!(
            sink.calls(),
            vec![
                (Channel::Chassis, 50),
                (Channel::Pcie, 15),
                (Channel::Cpu, 76),
                (Channel::Hdd, 20)
            ]
        );
        assert_eq!(ctl.engine().state().cpu, Some(76));
    }

    #[tokio::test]
    async fn test_failed_actuation_keeps_intent_and_continues() {
        let sink = RecordingSink {
            fail: Some(Channel::Chassis),
            ..Default::default()
        };
        let mut ctl = controller(None, sink.clone());
        let decision = ctl.run_cycle().await;

        assert_eq!(sink.calls().len(), 4);
        assert_eq!(ctl.engine().state().chassis, Some(decision.commanded.chassis));
        assert_eq!(ctl.engine().state().hdd, Some(20));
    }

    #[tokio::test]
    async fn test_next_cycle_smooths_from_issued_values() {
        let sink = RecordingSink::default();
        let mut ctl = controller(Some(40.0), sink.clone());
        let first = ctl.run_cycle().await;
        assert_eq!(first.commanded.chassis, 25);

        ctl.sensors = SensorAggregator::new(vec![], vec![Box::new(Fixed(Some(90.0)))], Box::new(NoDisks));
        let second = ctl.run_cycle().await;
        assert_eq!(second.desired.chassis, 100);
        assert_eq!(second.commanded.chassis, 30);
        assert_eq!(second.commanded.cpu, 20);
    }

    fn cycles(sink: &RecordingSink) -> usize {
        sink.calls().iter().filter(|(ch, _)| *ch == Channel::Chassis).count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_forever_runs_until_shutdown() {
        let sink = RecordingSink::default();
        let mut ctl = controller(Some(50.0), sink.clone());
        ctl.run(
            RunMode::Forever {
                interval: Duration::from_secs(5),
            },
            tokio::time::sleep(Duration::from_secs(12)),
        )
        .await;

        // t = 0, 5, 10
        assert_eq!(cycles(&sink), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_forever_interval_has_one_second_floor() {
        let sink = RecordingSink::default();
        let mut ctl = controller(Some(50.0), sink.clone());
        ctl.run(
            RunMode::Forever {
                interval: Duration::from_millis(5),
            },
            tokio::time::sleep(Duration::from_millis(2500)),
        )
        .await;

        // t = 0, 1, 2
        assert_eq!(cycles(&sink), 3);
    }

    #[tokio::test]
    async fn test_manual_set_clamps_and_bypasses_engine() {
        let sink = RecordingSink::default();
        set_manual(&sink, Channel::Hdd, 150).await.unwrap();
        assert_eq!(sink.calls(), vec![(Channel::Hdd, 100)]);
    }
}
