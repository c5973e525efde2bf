//! Modbus TCP rendition of the device link.
//!
//! Every call resolves the endpoint, connects, performs its reads or the one
//! write, and disconnects: the DTU is a constrained embedded gateway and
//! holds no persistent sessions.

use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio_modbus::{
    Slave,
    client::{Client, Reader, Writer},
};

use super::{DeviceLink, TransportError};
use crate::{
    prelude::*,
    snapshot::{MicroinverterSnapshot, PlantSnapshot},
};

/// First register of the first microinverter data block.
const DATA_BASE_ADDRESS: u16 = 0x1000;

/// Address distance between two consecutive data blocks.
const DATA_BLOCK_STRIDE: u16 = 0x28;

/// Registers read per microinverter.
const DATA_BLOCK_LEN: u16 = 20;

#[derive(Clone, bon::Builder)]
pub struct ModbusDeviceLink {
    /// DTU endpoint as `host:port`.
    address: String,

    #[builder(default = 1)]
    unit_id: u8,

    /// Number of microinverter data blocks to read per snapshot.
    panel_count: usize,
}

impl ModbusDeviceLink {
    async fn connect(&self) -> Result<tokio_modbus::client::Context, TransportError> {
        let address = lookup_host(&self.address)
            .await
            .map_err(TransportError::connect)?
            .next()
            .ok_or_else(|| {
                TransportError::connect(format!("no addresses resolved for `{}`", self.address))
            })?;
        tokio_modbus::client::tcp::connect_slave(address, Slave(self.unit_id))
            .await
            .map_err(TransportError::connect)
    }
}

#[async_trait]
impl DeviceLink for ModbusDeviceLink {
    #[instrument(skip_all, fields(address = %self.address))]
    async fn fetch_snapshot(&self) -> Result<PlantSnapshot, TransportError> {
        let mut context = self.connect().await?;
        let mut microinverters = Vec::with_capacity(self.panel_count);
        for index in 0..self.panel_count {
            #[allow(clippy::cast_possible_truncation)]
            let address = DATA_BASE_ADDRESS + index as u16 * DATA_BLOCK_STRIDE;
            let words = context
                .read_holding_registers(address, DATA_BLOCK_LEN)
                .await
                .map_err(TransportError::request)?
                .map_err(TransportError::rejected)?;
            if words.len() < DATA_BLOCK_LEN as usize {
                return Err(TransportError::ShortResponse {
                    expected: DATA_BLOCK_LEN as usize,
                    actual: words.len(),
                });
            }
            microinverters.push(decode_block(&words));
        }
        let _ = context.disconnect().await;
        let snapshot = PlantSnapshot::from_microinverters(microinverters);
        debug!(
            pv_power = snapshot.pv_power,
            total_production = snapshot.total_production,
            "fetched the plant snapshot",
        );
        Ok(snapshot)
    }

    #[instrument(skip(self), fields(address = %self.address))]
    async fn write_register(&self, address: u16, value: u16) -> Result<(), TransportError> {
        let mut context = self.connect().await?;
        context
            .write_single_register(address, value)
            .await
            .map_err(TransportError::request)?
            .map_err(TransportError::rejected)?;
        let _ = context.disconnect().await;
        Ok(())
    }
}

/// Decode one 20-register microinverter data block.
fn decode_block(words: &[u16]) -> MicroinverterSnapshot {
    // The temperature register is the only signed one.
    let temperature = f64::from(words[12].cast_signed()) * 0.1;
    MicroinverterSnapshot {
        serial_number: decode_serial_number(&words[0..3]),
        port_number: words[3],
        pv_voltage: f64::from(words[4]) * 0.1,
        pv_current: f64::from(words[5]) * 0.01,
        grid_voltage: f64::from(words[6]) * 0.1,
        grid_frequency: f64::from(words[7]) * 0.01,
        pv_power: f64::from(words[8]) * 0.1,
        today_production: f64::from(words[9]),
        total_production: f64::from((u32::from(words[10]) << 16) | u32::from(words[11])),
        temperature,
        operating_status: words[13],
        alarm_code: words[14],
        alarm_count: words[15],
        link_status: words[16],
    }
}

/// The serial number arrives as six BCD bytes.
fn decode_serial_number(words: &[u16]) -> String {
    words.iter().flat_map(|word| word.to_be_bytes()).map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    fn block() -> Vec<u16> {
        let mut words = vec![
            0x1161, 0x8090, 0x6072, // serial number
            1,      // port number
            331,    // 33.1 V
            520,    // 5.2 A
            2314,   // 231.4 V
            5002,   // 50.02 Hz
            1725,   // 172.5 W
            450,    // 450 Wh today
            0x0001, // total production, high word
            0x86A0, // total production, low word: 100 000 Wh
            413,    // 41.3 °C
            3, 1, 2, 1,
        ];
        words.resize(DATA_BLOCK_LEN as usize, 0);
        words
    }

    #[test]
    fn decode_scales_every_field() {
        let unit = decode_block(&block());
        assert_eq!(unit.serial_number, "116180906072");
        assert_eq!(unit.port_number, 1);
        assert_relative_eq!(unit.pv_voltage, 33.1);
        assert_relative_eq!(unit.pv_current, 5.2);
        assert_relative_eq!(unit.grid_voltage, 231.4);
        assert_relative_eq!(unit.grid_frequency, 50.02);
        assert_relative_eq!(unit.pv_power, 172.5);
        assert_relative_eq!(unit.today_production, 450.0);
        assert_relative_eq!(unit.total_production, 100_000.0);
        assert_relative_eq!(unit.temperature, 41.3);
        assert_eq!(unit.operating_status, 3);
        assert_eq!(unit.alarm_code, 1);
        assert_eq!(unit.alarm_count, 2);
        assert_eq!(unit.link_status, 1);
    }

    #[test]
    fn decode_negative_temperature() {
        let mut words = block();
        words[12] = (-52_i16).cast_unsigned();
        assert_relative_eq!(decode_block(&words).temperature, -5.2);
    }

    #[test]
    fn plant_aggregates_are_sums_over_ports() {
        let units = vec![decode_block(&block()), decode_block(&block())];
        let snapshot = PlantSnapshot::from_microinverters(units);
        assert_relative_eq!(snapshot.pv_power, 345.0);
        assert_relative_eq!(snapshot.today_production, 900.0);
        assert_relative_eq!(snapshot.total_production, 200_000.0);
        assert!(snapshot.alarm_flag);
    }
}
