use serde::Serialize;

/// One atomic read of all plant and per-port registers.
///
/// A snapshot is never patched in place: a new fetch produces a new value and
/// the previous one is dropped.
#[derive(Clone, Debug, Serialize)]
pub struct PlantSnapshot {
    /// Aggregate instantaneous power, watts.
    pub pv_power: f64,

    /// Energy produced since local midnight, watt-hours.
    pub today_production: f64,

    /// Lifetime energy counter, watt-hours.
    pub total_production: f64,

    /// Raised when any microinverter reports a non-zero alarm code.
    pub alarm_flag: bool,

    /// Index-aligned with the configured panel count; index `i` always
    /// denotes the same physical port across fetches.
    pub microinverters: Vec<MicroinverterSnapshot>,
}

impl PlantSnapshot {
    /// Derive the plant-level aggregates from the per-port readings.
    ///
    /// The DTU keeps no separate plant registers: its counters are the sums
    /// over the connected ports.
    pub fn from_microinverters(microinverters: Vec<MicroinverterSnapshot>) -> Self {
        Self {
            pv_power: microinverters.iter().map(|unit| unit.pv_power).sum(),
            today_production: microinverters.iter().map(|unit| unit.today_production).sum(),
            total_production: microinverters.iter().map(|unit| unit.total_production).sum(),
            alarm_flag: microinverters.iter().any(|unit| unit.alarm_code != 0),
            microinverters,
        }
    }
}

/// Reading of a single microinverter port, in device-natural units.
#[derive(Clone, Debug, Serialize)]
pub struct MicroinverterSnapshot {
    pub serial_number: String,
    pub port_number: u16,

    /// Volts.
    pub pv_voltage: f64,

    /// Amperes.
    pub pv_current: f64,

    /// Volts.
    pub grid_voltage: f64,

    /// Hertz.
    pub grid_frequency: f64,

    /// Watts.
    pub pv_power: f64,

    /// Watt-hours since local midnight.
    pub today_production: f64,

    /// Lifetime watt-hours.
    pub total_production: f64,

    /// Degrees Celsius.
    pub temperature: f64,

    pub operating_status: u16,
    pub alarm_code: u16,
    pub alarm_count: u16,
    pub link_status: u16,
}
