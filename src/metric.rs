//! Static metric tables: one descriptor per exposed metric, fixed at compile
//! time. Raw register fields are reached through the enumerated identifiers
//! below, never by string lookup.

use clap::ValueEnum;
use enumset::EnumSetType;
use serde::Serialize;

use crate::snapshot::{MicroinverterSnapshot, PlantSnapshot};

#[derive(Clone, Copy, Debug, Serialize, derive_more::Display)]
pub enum Unit {
    #[display("")]
    #[serde(rename = "")]
    None,

    #[display("kW")]
    #[serde(rename = "kW")]
    Kilowatts,

    #[display("W")]
    #[serde(rename = "W")]
    Watts,

    #[display("kWh")]
    #[serde(rename = "kWh")]
    KilowattHours,

    #[display("V")]
    #[serde(rename = "V")]
    Volts,

    #[display("A")]
    #[serde(rename = "A")]
    Amperes,

    #[display("Hz")]
    #[serde(rename = "Hz")]
    Hertz,

    #[display("°C")]
    #[serde(rename = "°C")]
    Celsius,
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceClass {
    None,
    Power,
    Energy,
    Voltage,
    Current,
    Temperature,
}

/// Downstream statistics classification of a metric.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StateClass {
    None,

    /// A total that may both grow and shrink.
    Total,

    /// A monotonically increasing total.
    TotalIncreasing,
}

/// What to expose for a counter when the device reports an all-zero plant.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersistencePolicy {
    /// Expose 0.
    None,

    /// Keep the previously exposed value.
    CarryForward,

    /// Expose 0 during the midnight hour, carry forward otherwise.
    ResetAtMidnight,
}

pub struct MetricDescriptor {
    pub name: &'static str,
    pub unit: Unit,
    pub device_class: DeviceClass,
    pub state_class: StateClass,

    /// Divisor applied to the raw snapshot value, e.g. 1000 for counters that
    /// arrive in watt-hours but are exposed in kilowatt-hours.
    pub scale: f64,

    pub persistence: PersistencePolicy,

    /// Cumulative counters get the monotonic-correction guard.
    pub monotonic: bool,
}

/// Plant-level metric identifier.
#[derive(Debug, EnumSetType, ValueEnum)]
pub enum PlantMetric {
    PvPower,
    TodayProduction,
    TotalProduction,
    AlarmFlag,
}

impl PlantMetric {
    pub const fn descriptor(self) -> &'static MetricDescriptor {
        match self {
            Self::PvPower => &MetricDescriptor {
                name: "pv_power",
                unit: Unit::Kilowatts,
                device_class: DeviceClass::Power,
                state_class: StateClass::None,
                scale: 1000.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::TodayProduction => &MetricDescriptor {
                name: "today_production",
                unit: Unit::KilowattHours,
                device_class: DeviceClass::Energy,
                state_class: StateClass::TotalIncreasing,
                scale: 1000.0,
                persistence: PersistencePolicy::ResetAtMidnight,
                monotonic: false,
            },
            Self::TotalProduction => &MetricDescriptor {
                name: "total_production",
                unit: Unit::KilowattHours,
                device_class: DeviceClass::Energy,
                state_class: StateClass::Total,
                scale: 1000.0,
                persistence: PersistencePolicy::CarryForward,
                monotonic: true,
            },
            Self::AlarmFlag => &MetricDescriptor {
                name: "alarm_flag",
                unit: Unit::None,
                device_class: DeviceClass::None,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
        }
    }

    /// Raw, unscaled value from the snapshot.
    pub fn raw(self, snapshot: &PlantSnapshot) -> f64 {
        match self {
            Self::PvPower => snapshot.pv_power,
            Self::TodayProduction => snapshot.today_production,
            Self::TotalProduction => snapshot.total_production,
            Self::AlarmFlag => f64::from(u8::from(snapshot.alarm_flag)),
        }
    }

    /// Per-port counterpart used as a fallback when the plant counter reads
    /// zero while the ports still report data.
    pub const fn per_port_counter(self) -> Option<PvMetric> {
        match self {
            Self::TodayProduction => Some(PvMetric::TodayProduction),
            Self::TotalProduction => Some(PvMetric::TotalProduction),
            Self::PvPower | Self::AlarmFlag => None,
        }
    }
}

/// Per-microinverter metric identifier.
#[derive(Debug, EnumSetType, ValueEnum)]
pub enum PvMetric {
    PvVoltage,
    PvCurrent,
    GridVoltage,
    GridFrequency,
    PvPower,
    TodayProduction,
    TotalProduction,
    Temperature,
    OperatingStatus,
    AlarmCode,
    AlarmCount,
    LinkStatus,
}

impl PvMetric {
    pub const fn descriptor(self) -> &'static MetricDescriptor {
        match self {
            Self::PvVoltage => &MetricDescriptor {
                name: "pv_voltage",
                unit: Unit::Volts,
                device_class: DeviceClass::Voltage,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::PvCurrent => &MetricDescriptor {
                name: "pv_current",
                unit: Unit::Amperes,
                device_class: DeviceClass::Current,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::GridVoltage => &MetricDescriptor {
                name: "grid_voltage",
                unit: Unit::Volts,
                device_class: DeviceClass::Voltage,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::GridFrequency => &MetricDescriptor {
                name: "grid_frequency",
                unit: Unit::Hertz,
                device_class: DeviceClass::None,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::PvPower => &MetricDescriptor {
                name: "pv_power",
                unit: Unit::Watts,
                device_class: DeviceClass::Power,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::TodayProduction => &MetricDescriptor {
                name: "today_production",
                unit: Unit::KilowattHours,
                device_class: DeviceClass::Energy,
                state_class: StateClass::TotalIncreasing,
                scale: 1000.0,
                persistence: PersistencePolicy::ResetAtMidnight,
                monotonic: false,
            },
            Self::TotalProduction => &MetricDescriptor {
                name: "total_production",
                unit: Unit::KilowattHours,
                device_class: DeviceClass::Energy,
                state_class: StateClass::Total,
                scale: 1000.0,
                persistence: PersistencePolicy::CarryForward,
                monotonic: false,
            },
            Self::Temperature => &MetricDescriptor {
                name: "temperature",
                unit: Unit::Celsius,
                device_class: DeviceClass::Temperature,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::OperatingStatus => &MetricDescriptor {
                name: "operating_status",
                unit: Unit::None,
                device_class: DeviceClass::None,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::AlarmCode => &MetricDescriptor {
                name: "alarm_code",
                unit: Unit::None,
                device_class: DeviceClass::None,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::AlarmCount => &MetricDescriptor {
                name: "alarm_count",
                unit: Unit::None,
                device_class: DeviceClass::None,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
            Self::LinkStatus => &MetricDescriptor {
                name: "link_status",
                unit: Unit::None,
                device_class: DeviceClass::None,
                state_class: StateClass::None,
                scale: 1.0,
                persistence: PersistencePolicy::None,
                monotonic: false,
            },
        }
    }

    /// Raw, unscaled value from one port's reading.
    pub fn raw(self, unit: &MicroinverterSnapshot) -> f64 {
        match self {
            Self::PvVoltage => unit.pv_voltage,
            Self::PvCurrent => unit.pv_current,
            Self::GridVoltage => unit.grid_voltage,
            Self::GridFrequency => unit.grid_frequency,
            Self::PvPower => unit.pv_power,
            Self::TodayProduction => unit.today_production,
            Self::TotalProduction => unit.total_production,
            Self::Temperature => unit.temperature,
            Self::OperatingStatus => f64::from(unit.operating_status),
            Self::AlarmCode => f64::from(unit.alarm_code),
            Self::AlarmCount => f64::from(unit.alarm_count),
            Self::LinkStatus => f64::from(unit.link_status),
        }
    }
}
