use clap::{Parser, Subcommand, ValueEnum};
use enumset::EnumSet;

use crate::{
    metric::{PlantMetric, PvMetric},
    prelude::*,
};

#[derive(Parser)]
#[command(author, version, about, propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Poll the DTU continuously and print the readings.
    Watch(Box<WatchArgs>),

    /// Run a single read cycle and print the readings.
    Fetch(Box<FetchArgs>),

    /// Set the active power limit of one microinverter.
    SetPowerLimit(SetPowerLimitArgs),

    /// Switch one microinverter on or off.
    SetPower(SetPowerArgs),
}

#[derive(Parser)]
pub struct DtuArgs {
    /// DTU Modbus TCP endpoint, for example `dtu.local:502`.
    #[clap(long = "dtu-address", env = "DTU_ADDRESS")]
    pub address: String,

    #[clap(long = "dtu-unit-id", default_value = "1", env = "DTU_UNIT_ID")]
    pub unit_id: u8,
}

#[derive(Parser)]
pub struct PlantArgs {
    /// Name used as the entity-identifier prefix.
    #[clap(long = "plant-name", default_value = "hoymiles", env = "PLANT_NAME")]
    pub name: String,

    /// Number of panels (microinverter ports) behind the DTU.
    #[clap(long = "panel-count", env = "PANEL_COUNT")]
    pub panel_count: usize,
}

#[derive(Parser)]
pub struct EngineArgs {
    #[clap(flatten)]
    pub dtu: DtuArgs,

    #[clap(flatten)]
    pub plant: PlantArgs,

    /// Minimal interval between two physical DTU polls, in seconds.
    #[clap(long = "min-poll-interval-secs", default_value = "120", env = "MIN_POLL_INTERVAL_SECS")]
    pub min_poll_interval_secs: u64,

    /// Plant-level metrics to expose.
    #[clap(
        long = "plant-metrics",
        env = "PLANT_METRICS",
        value_delimiter = ',',
        num_args = 1..,
        default_value = "pv-power,today-production,total-production,alarm-flag",
    )]
    pub plant_metrics: Vec<PlantMetric>,

    /// Per-microinverter metrics to expose.
    #[clap(
        long = "pv-metrics",
        env = "PV_METRICS",
        value_delimiter = ',',
        num_args = 1..,
        default_value = "pv-voltage,pv-current,grid-voltage,grid-frequency,pv-power,today-production,total-production,temperature",
    )]
    pub pv_metrics: Vec<PvMetric>,
}

impl EngineArgs {
    #[must_use]
    pub fn plant_metrics(&self) -> EnumSet<PlantMetric> {
        self.plant_metrics.iter().copied().collect()
    }

    #[must_use]
    pub fn pv_metrics(&self) -> EnumSet<PvMetric> {
        self.pv_metrics.iter().copied().collect()
    }
}

#[derive(Parser)]
pub struct WatchArgs {
    #[clap(flatten)]
    pub engine: EngineArgs,

    /// How often the exposed values are re-read, in seconds. May be shorter
    /// than the poll throttle: reads between polls reuse the cached snapshot.
    #[clap(long = "read-interval-secs", default_value = "30", env = "READ_INTERVAL_SECS")]
    pub read_interval_secs: u64,

    /// Print readings as JSON instead of a table.
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct FetchArgs {
    #[clap(flatten)]
    pub engine: EngineArgs,

    /// Print readings as JSON instead of a table.
    #[clap(long)]
    pub json: bool,
}

#[derive(Parser)]
pub struct InverterArgs {
    /// Number of microinverters behind the DTU.
    #[clap(long = "inverter-count", env = "INVERTER_COUNT")]
    pub inverter_count: u16,

    /// Zero-based microinverter index.
    #[clap(long)]
    pub inverter: u16,
}

impl InverterArgs {
    /// The target index, checked against the configured inverter count.
    pub fn validated(&self) -> Result<u16> {
        ensure!(
            self.inverter < self.inverter_count,
            "inverter index {} is out of range: {} inverters are configured",
            self.inverter,
            self.inverter_count,
        );
        Ok(self.inverter)
    }
}

#[derive(Parser)]
pub struct SetPowerLimitArgs {
    #[clap(flatten)]
    pub dtu: DtuArgs,

    #[clap(flatten)]
    pub inverter: InverterArgs,

    /// Power limit as a percentage of rated power, rounded to whole percents.
    #[clap(long)]
    pub percent: f64,
}

#[derive(Parser)]
pub struct SetPowerArgs {
    #[clap(flatten)]
    pub dtu: DtuArgs,

    #[clap(flatten)]
    pub inverter: InverterArgs,

    pub state: PowerState,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum PowerState {
    On,
    Off,
}

impl PowerState {
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On)
    }
}
