mod image;
pub mod layout;
pub mod mapping;
mod process;
mod reader;
mod stream;

#[cfg(test)]
pub mod mock;

pub use image::RamImage;
pub use mapping::{AddressSpaceMapping, Endianness};
pub use process::*;
pub use reader::{ForeignProcess, ProcessControl, ReadMemory, WriteMemory};
pub use stream::MemoryStream;

#[cfg(test)]
pub use mock::{MockProcess, MockProcessBuilder};
