mod certificate;
mod config;
mod device;

pub use certificate::*;
pub use config::*;
pub use device::*;
