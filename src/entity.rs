//! The exposed value set: stable-identity adapters between the cache/resolver
//! engine and whatever reads the values. Sensors resolve on every read;
//! controls dispatch writes and only mirror the last requested value.

use std::time::Duration;

use chrono::Local;
use enumset::EnumSet;
use serde::Serialize;

use crate::{
    cache::SnapshotCache,
    command::{CommandDispatcher, CommandError},
    link::DeviceLink,
    metric::{DeviceClass, PlantMetric, PvMetric, StateClass, Unit},
    prelude::*,
    resolver::{self, MetricState},
    snapshot::PlantSnapshot,
};

/// One resolved reading, `value: None` meaning unknown for this cycle.
#[derive(Debug, Serialize)]
pub struct Reading {
    pub entity_id: String,
    pub name: &'static str,
    pub unit: Unit,
    pub device_class: DeviceClass,
    pub state_class: StateClass,
    pub value: Option<f64>,
}

struct PlantSensor {
    metric: PlantMetric,
    entity_id: String,
    state: MetricState,
}

impl PlantSensor {
    fn new(plant_name: &str, metric: PlantMetric) -> Self {
        let descriptor = metric.descriptor();
        Self {
            metric,
            entity_id: format!("dtu-{plant_name}-{}", descriptor.name),
            state: MetricState::new(descriptor),
        }
    }

    fn read(
        &mut self,
        snapshot: Option<&PlantSnapshot>,
        panel_count: usize,
        now: chrono::NaiveDateTime,
    ) -> Reading {
        let descriptor = self.metric.descriptor();
        Reading {
            entity_id: self.entity_id.clone(),
            name: descriptor.name,
            unit: descriptor.unit,
            device_class: descriptor.device_class,
            state_class: descriptor.state_class,
            value: resolver::resolve_plant(self.metric, snapshot, panel_count, now, &mut self.state),
        }
    }
}

struct PvSensor {
    metric: PvMetric,

    /// Zero-based index into the snapshot's port sequence.
    index: usize,

    entity_id: String,
    state: MetricState,
}

impl PvSensor {
    /// Binds the entity to the serial number and port so its identity
    /// survives refresh cycles.
    fn new(plant_name: &str, index: usize, unit_serial: &str, port: u16, metric: PvMetric) -> Self {
        let descriptor = metric.descriptor();
        Self {
            metric,
            index,
            entity_id: format!("dtu-pv-{plant_name}-{unit_serial}-{port}-{}", descriptor.name),
            state: MetricState::new(descriptor),
        }
    }

    fn read(&mut self, snapshot: Option<&PlantSnapshot>, now: chrono::NaiveDateTime) -> Reading {
        let descriptor = self.metric.descriptor();
        Reading {
            entity_id: self.entity_id.clone(),
            name: descriptor.name,
            unit: descriptor.unit,
            device_class: descriptor.device_class,
            state_class: descriptor.state_class,
            value: resolver::resolve_pv(self.metric, self.index, snapshot, now, &mut self.state),
        }
    }
}

/// All enabled sensors over one shared snapshot cache.
pub struct ExposedValueSet<L> {
    cache: SnapshotCache<L>,
    panel_count: usize,
    plant_sensors: Vec<PlantSensor>,
    pv_sensors: Vec<PvSensor>,
}

impl<L: DeviceLink> ExposedValueSet<L> {
    /// Performs the initial fetch: it validates the configuration against the
    /// device and binds the per-panel entities to serial numbers.
    #[instrument(skip_all, fields(plant_name = plant_name))]
    pub async fn try_new(
        link: L,
        min_poll_interval: Duration,
        plant_name: &str,
        panel_count: usize,
        plant_metrics: EnumSet<PlantMetric>,
        pv_metrics: EnumSet<PvMetric>,
    ) -> Result<Self> {
        let mut cache = SnapshotCache::new(link, min_poll_interval);
        cache.refresh().await;
        let snapshot = cache.current().context("the DTU did not answer the initial poll")?;
        ensure!(
            snapshot.microinverters.len() == panel_count,
            "the DTU reported {} ports, {panel_count} panels are configured",
            snapshot.microinverters.len(),
        );

        let plant_sensors: Vec<PlantSensor> =
            plant_metrics.iter().map(|metric| PlantSensor::new(plant_name, metric)).collect();
        let mut pv_sensors = Vec::with_capacity(panel_count * pv_metrics.len());
        for (index, unit) in snapshot.microinverters.iter().enumerate() {
            for metric in pv_metrics {
                pv_sensors.push(PvSensor::new(
                    plant_name,
                    index,
                    &unit.serial_number,
                    unit.port_number,
                    metric,
                ));
            }
        }
        info!(
            n_plant = plant_sensors.len(),
            n_pv = pv_sensors.len(),
            "bound the exposed entities",
        );
        Ok(Self { cache, panel_count, plant_sensors, pv_sensors })
    }

    /// One read cycle: a single (throttled) refresh, then every enabled
    /// metric resolved against the same snapshot.
    pub async fn read_all(&mut self) -> Vec<Reading> {
        self.cache.refresh().await;
        let Self { cache, panel_count, plant_sensors, pv_sensors } = self;
        let snapshot = cache.current();
        let now = Local::now().naive_local();
        let mut readings = Vec::with_capacity(plant_sensors.len() + pv_sensors.len());
        readings
            .extend(plant_sensors.iter_mut().map(|sensor| sensor.read(snapshot, *panel_count, now)));
        readings.extend(pv_sensors.iter_mut().map(|sensor| sensor.read(snapshot, now)));
        readings
    }
}

/// Writable power-limit percentage of one microinverter.
///
/// The mirrored value is the last *requested* percentage, not confirmed
/// device state: the DTU is never read back.
pub struct PowerLimitControl<L> {
    dispatcher: CommandDispatcher<L>,
    inverter_index: u16,
    last_requested: Option<u16>,
}

impl<L: DeviceLink> PowerLimitControl<L> {
    pub const fn new(link: L, inverter_index: u16) -> Self {
        Self { dispatcher: CommandDispatcher::new(link), inverter_index, last_requested: None }
    }

    pub async fn write(&mut self, percent: f64) -> Result<(), CommandError> {
        let written =
            self.dispatcher.set_power_limit_percent(self.inverter_index, percent).await?;
        self.last_requested = Some(written);
        Ok(())
    }

    pub const fn last_requested(&self) -> Option<u16> {
        self.last_requested
    }
}

/// Writable on/off switch of one microinverter.
pub struct OnOffControl<L> {
    dispatcher: CommandDispatcher<L>,
    inverter_index: u16,
    last_requested: Option<bool>,
}

impl<L: DeviceLink> OnOffControl<L> {
    pub const fn new(link: L, inverter_index: u16) -> Self {
        Self { dispatcher: CommandDispatcher::new(link), inverter_index, last_requested: None }
    }

    pub async fn write(&mut self, on: bool) -> Result<(), CommandError> {
        self.dispatcher.set_on_off(self.inverter_index, on).await?;
        self.last_requested = Some(on);
        Ok(())
    }

    pub const fn last_requested(&self) -> Option<bool> {
        self.last_requested
    }
}
