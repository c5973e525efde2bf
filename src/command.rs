//! The write path: one fresh connection, one register write, no retry and no
//! read-back verification. Writes bypass the snapshot cache entirely.

use std::ops::RangeInclusive;

use crate::{
    link::{DeviceLink, TransportError},
    prelude::*,
};

/// On/off holding register of the first microinverter.
const ON_OFF_BASE_ADDRESS: u16 = 0xC006;

/// Power-limit holding register of the first microinverter.
const POWER_LIMIT_BASE_ADDRESS: u16 = 0xC007;

/// Each microinverter occupies this many registers in the control bank.
const CONTROL_REGISTER_STRIDE: u16 = 6;

/// Allowed power-limit percentage after rounding. The DTU misbehaves below
/// 2%, hence the raised minimum.
pub const POWER_LIMIT_PERCENT_RANGE: RangeInclusive<f64> = 2.0..=100.0;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Rejected by range validation, nothing was sent to the device.
    #[error("power limit {percent}% is outside the {}%..={}% range", POWER_LIMIT_PERCENT_RANGE.start(), POWER_LIMIT_PERCENT_RANGE.end())]
    OutOfRange { percent: f64 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Translates logical write requests into single register writes.
pub struct CommandDispatcher<L> {
    link: L,
}

impl<L: DeviceLink> CommandDispatcher<L> {
    pub const fn new(link: L) -> Self {
        Self { link }
    }

    /// Set the active power limit of the microinverter at the zero-based
    /// `inverter_index`, as a percentage of its rated power.
    ///
    /// The requested value is rounded to the nearest whole percent; values
    /// outside [`POWER_LIMIT_PERCENT_RANGE`] are rejected, not clamped.
    /// Returns the percentage actually written.
    #[instrument(skip(self))]
    pub async fn set_power_limit_percent(
        &self,
        inverter_index: u16,
        percent: f64,
    ) -> Result<u16, CommandError> {
        let rounded = percent.round();
        if !POWER_LIMIT_PERCENT_RANGE.contains(&rounded) {
            return Err(CommandError::OutOfRange { percent: rounded });
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let value = rounded as u16;
        let address = POWER_LIMIT_BASE_ADDRESS + inverter_index * CONTROL_REGISTER_STRIDE;
        self.link.write_register(address, value).await?;
        info!(inverter_index, value, "set the power limit");
        Ok(value)
    }

    /// Switch the microinverter at the zero-based `inverter_index` on or off.
    #[instrument(skip(self))]
    pub async fn set_on_off(&self, inverter_index: u16, on: bool) -> Result<(), CommandError> {
        let address = ON_OFF_BASE_ADDRESS + inverter_index * CONTROL_REGISTER_STRIDE;
        self.link.write_register(address, u16::from(on)).await?;
        info!(inverter_index, on, "switched the microinverter");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::testing::ScriptedLink;

    #[tokio::test]
    async fn below_minimum_is_rejected_without_a_write() {
        let dispatcher = CommandDispatcher::new(ScriptedLink::new(vec![]));
        let result = dispatcher.set_power_limit_percent(2, 1.0).await;
        assert!(matches!(result, Err(CommandError::OutOfRange { .. })));
        assert!(dispatcher.link.written().is_empty());
    }

    #[tokio::test]
    async fn rounding_happens_before_validation() {
        // 1.6 rounds up into the allowed range.
        let dispatcher = CommandDispatcher::new(ScriptedLink::new(vec![]));
        let written = dispatcher.set_power_limit_percent(0, 1.6).await.unwrap();
        assert_eq!(written, 2);
        assert_eq!(dispatcher.link.written(), vec![(0xC007, 2)]);
    }

    #[tokio::test]
    async fn power_limit_address_uses_the_inverter_stride() {
        let dispatcher = CommandDispatcher::new(ScriptedLink::new(vec![]));
        dispatcher.set_power_limit_percent(2, 49.6).await.unwrap();
        assert_eq!(dispatcher.link.written(), vec![(0xC007 + 12, 50)]);
    }

    #[tokio::test]
    async fn on_off_writes_a_boolean_register() {
        let dispatcher = CommandDispatcher::new(ScriptedLink::new(vec![]));
        dispatcher.set_on_off(1, false).await.unwrap();
        dispatcher.set_on_off(1, true).await.unwrap();
        assert_eq!(dispatcher.link.written(), vec![(0xC006 + 6, 0), (0xC006 + 6, 1)]);
    }
}
