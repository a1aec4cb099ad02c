// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! Reduces raw sensor readings to one value per logical source.
//!
//! - `pcie_hot`: maximum of every PCIe-feeding source that produced a value
//! - `cpu`: the first CPU source that produced a value
//! - `hdd_max`: maximum over the discovered disks; disks without a value
//!   are left out
//!
//! The three groups are read concurrently and joined before returning, so
//! the engine only ever sees a complete [`Readings`].

use crate::engine::Readings;
use crate::sensors::{
    DeviceDiscovery, HwmonTemp, LmChip, LmSensors, LmSensorsSnapshot, SataDisks, SensorReading,
    StorcliRoc, TempSource,
};
use std::sync::Arc;
use std::time::Duration;

pub struct SensorAggregator {
    pcie: Vec<Box<dyn TempSource>>,
    cpu: Vec<Box<dyn TempSource>>,
    disks: Box<dyn DeviceDiscovery>,
}

impl SensorAggregator {
    pub fn new(
        pcie: Vec<Box<dyn TempSource>>,
        cpu: Vec<Box<dyn TempSource>>,
        disks: Box<dyn DeviceDiscovery>,
    ) -> Self {
        Self { pcie, cpu, disks }
    }

    /// The sources of this machine: storcli + jc42 for PCIe, k10temp for the
    /// CPU (via lm-sensors, then sysfs), SATA disks via lsblk + smartctl.
    /// jc42 and k10temp come from the same `sensors -j` run.
    pub fn system(timeout: Duration) -> Self {
        Self::system_with(LmSensorsSnapshot::new(timeout), timeout)
    }

    fn system_with(lm: Arc<LmSensorsSnapshot>, timeout: Duration) -> Self {
        Self::new(
            vec![
                Box::new(StorcliRoc { timeout }),
                Box::new(LmSensors {
                    chip: LmChip::Jc42Max,
                    snapshot: lm.clone(),
                }),
            ],
            vec![
                Box::new(LmSensors {
                    chip: LmChip::K10tempTctl,
                    snapshot: lm,
                }),
                Box::new(HwmonTemp::new("k10temp", "Tctl")),
            ],
            Box::new(SataDisks { timeout }),
        )
    }

    /// Read every source once and reduce.
    pub async fn sample(&self) -> Readings {
        log::info!("=== sampling begin ===");
        for source in self.pcie.iter().chain(&self.cpu) {
            source.begin_cycle();
        }

        let (pcie, cpu, hdd) = tokio::join!(
            read_all(&self.pcie),
            read_first(&self.cpu),
            self.read_disks(),
        );

        let readings = Readings {
            pcie_hot: max_value(&pcie),
            cpu,
            hdd_max: max_value(&hdd),
        };
        log::info!(
            "sampled: pcie_hot={:?} cpu={:?} hdd_max={:?}",
            readings.pcie_hot,
            readings.cpu,
            readings.hdd_max
        );
        readings
    }

    async fn read_disks(&self) -> Vec<SensorReading> {
        let disks = self.disks.discover().await;
        read_all(&disks).await
    }
}

async fn read_logged(source: &dyn TempSource) -> SensorReading {
    let reading = source.read().await;
    match &reading {
        SensorReading::Value(v) => log::info!("{} = {v}", source.name()),
        SensorReading::Unavailable(why) => log::debug!("{}: {why}", source.name()),
        SensorReading::Failed(e) => log::warn!("{} read failed: {e}", source.name()),
    }
    reading
}

async fn read_all(sources: &[Box<dyn TempSource>]) -> Vec<SensorReading> {
    let mut readings = Vec::with_capacity(sources.len());
    for source in sources {
        readings.push(read_logged(source.as_ref()).await);
    }
    readings
}

async fn read_first(sources: &[Box<dyn TempSource>]) -> Option<f64> {
    for source in sources {
        if let Some(v) = read_logged(source.as_ref()).await.value() {
            return Some(v);
        }
    }
    None
}

fn max_value(readings: &[SensorReading]) -> Option<f64> {
    readings
        .iter()
        .filter_map(SensorReading::value)
        .reduce(f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SensorError;
    use crate::sensors::{DiscoverFuture, ReadFuture};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixed(Option<f64>);

    impl TempSource for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn read(&self) -> ReadFuture<'_> {
            let reading = match self.0 {
                Some(v) => SensorReading::Value(v),
                None => SensorReading::Unavailable("not installed".to_string()),
            };
            Box::pin(async move { reading })
        }
    }

    struct Broken;

    impl TempSource for Broken {
        fn name(&self) -> &str {
            "broken"
        }

        fn read(&self) -> ReadFuture<'_> {
            Box::pin(async {
                SensorReading::Failed(SensorError::Parse {
                    tool: "broken".to_string(),
                    reason: "garbage".to_string(),
                })
            })
        }
    }

    struct Counting(Arc<AtomicUsize>, f64);

    impl TempSource for Counting {
        fn name(&self) -> &str {
            "counting"
        }

        fn read(&self) -> ReadFuture<'_> {
            self.0.fetch_add(1, Ordering::SeqCst);
            let v = self.1;
            Box::pin(async move { SensorReading::Value(v) })
        }
    }

    struct Disks(Vec<Option<f64>>);

    impl DeviceDiscovery for Disks {
        fn discover(&self) -> DiscoverFuture<'_> {
            let disks: Vec<Box<dyn TempSource>> = self
                .0
                .iter()
                .map(|&t| Box::new(Fixed(t)) as Box<dyn TempSource>)
                .collect();
            Box::pin(async move { disks })
        }
    }

    #[tokio::test]
    async fn test_pcie_hot_is_max_of_available() {
        let agg = SensorAggregator::new(
            vec![Box::new(Fixed(Some(61.0))), Box::new(Broken), Box::new(Fixed(Some(44.0)))],
            vec![],
            Box::new(Disks(vec![])),
        );
        assert_eq!(agg.sample().await.pcie_hot, Some(61.0));
    }

    #[tokio::test]
    async fn test_all_sources_missing_is_unknown() {
        let agg = SensorAggregator::new(
            vec![Box::new(Fixed(None)), Box::new(Broken)],
            vec![Box::new(Broken)],
            Box::new(Disks(vec![])),
        );
        assert_eq!(agg.sample().await, Readings::default());
    }

    #[tokio::test]
    async fn test_cpu_uses_first_source_with_value() {
        let fallback_reads = Arc::new(AtomicUsize::new(0));
        let agg = SensorAggregator::new(
            vec![],
            vec![
                Box::new(Fixed(Some(48.0))),
                Box::new(Counting(fallback_reads.clone(), 99.0)),
            ],
            Box::new(Disks(vec![])),
        );
        assert_eq!(agg.sample().await.cpu, Some(48.0));
        assert_eq!(fallback_reads.load(Ordering::SeqCst), 0);

        let agg = SensorAggregator::new(
            vec![],
            vec![Box::new(Broken), Box::new(Counting(fallback_reads.clone(), 52.0))],
            Box::new(Disks(vec![])),
        );
        assert_eq!(agg.sample().await.cpu, Some(52.0));
        assert_eq!(fallback_reads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disks_without_reading_are_excluded() {
        let agg = SensorAggregator::new(
            vec![],
            vec![],
            Box::new(Disks(vec![Some(34.0), None, Some(41.0)])),
        );
        assert_eq!(agg.sample().await.hdd_max, Some(41.0));

        let agg = SensorAggregator::new(vec![], vec![], Box::new(Disks(vec![None, None])));
        assert_eq!(agg.sample().await.hdd_max, None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_system_sources_share_one_sensors_run() {
        let dir = tempfile::tempdir().unwrap();
        let count = dir.path().join("count");
        let script = crate::tool::testing::write_script(
            dir.path(),
            "sensors",
            &format!(
                "echo run >> '{}'\ncat <<'EOF'\n{}\nEOF",
                count.display(),
                r#"{"jc42-i2c-0-18": {"temp1": {"temp1_input": 40.0}}, "k10temp-pci-00c3": {"Tctl": {"temp1_input": 50.0}}}"#
            ),
        );
        let timeout = Duration::from_secs(5);
        let agg = SensorAggregator::system_with(
            LmSensorsSnapshot::with_program(script.to_str().unwrap(), timeout),
            timeout,
        );
        let runs = || std::fs::read_to_string(&count).unwrap().lines().count();

        let readings = agg.sample().await;
        assert_eq!(readings.cpu, Some(50.0));
        assert!(readings.pcie_hot.is_some_and(|t| t >= 40.0));
        assert_eq!(runs(), 1);

        agg.sample().await;
        assert_eq!(runs(), 2);
    }

    #[tokio::test]
    async fn test_failure_in_one_group_does_not_affect_others() {
        let agg = SensorAggregator::new(
            vec![Box::new(Broken)],
            vec![Box::new(Fixed(Some(55.0)))],
            Box::new(Disks(vec![Some(38.0)])),
        );
        let readings = agg.sample().await;
        assert_eq!(readings.pcie_hot, None);
        assert_eq!(readings.cpu, Some(55.0));
        assert_eq!(readings.hdd_max, Some(38.0));
    }
}
