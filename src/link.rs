pub mod modbus;

use async_trait::async_trait;

pub use self::modbus::ModbusDeviceLink;
use crate::snapshot::PlantSnapshot;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single transport call.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The connection to the DTU could not be established.
    #[error("failed to connect to the DTU")]
    Connect(#[source] BoxedSource),

    /// The request never completed or the transport broke mid-call.
    #[error("the Modbus request failed")]
    Request(#[source] BoxedSource),

    /// The DTU answered with a Modbus exception.
    #[error("the DTU rejected the request")]
    Rejected(#[source] BoxedSource),

    /// The DTU answered with fewer registers than requested.
    #[error("short response from the DTU: expected {expected} registers, got {actual}")]
    ShortResponse { expected: usize, actual: usize },
}

impl TransportError {
    pub fn connect(source: impl Into<BoxedSource>) -> Self {
        Self::Connect(source.into())
    }

    pub fn request(source: impl Into<BoxedSource>) -> Self {
        Self::Request(source.into())
    }

    pub fn rejected(source: impl Into<BoxedSource>) -> Self {
        Self::Rejected(source.into())
    }
}

/// One device endpoint, stateless per call: the connection is opened,
/// operated on, and closed within a single method call.
#[async_trait]
pub trait DeviceLink {
    /// Fetch a full plant snapshot.
    async fn fetch_snapshot(&self) -> Result<PlantSnapshot, TransportError>;

    /// Write a single holding register.
    async fn write_register(&self, address: u16, value: u16) -> Result<(), TransportError>;
}
