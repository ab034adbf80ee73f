mod gateway;
#[cfg(test)]
mod recording_gateway;

pub use gateway::{Gateway, GatewayError};
#[cfg(test)]
pub(crate) use recording_gateway::{GatewayCall, RecordingGateway};
