//! Backend implementations.

mod cpal_backend;
mod null;
mod relay;
mod wav;

pub use cpal_backend::{CpalBackend, OutputDevice, list_output_devices};
pub use null::NullBackend;
pub use relay::{RELAY_LEFT, RELAY_RIGHT, RelayBackend};
pub use wav::WavBackend;
