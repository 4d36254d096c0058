pub mod bus;
pub mod bus_builder;
pub mod event;
pub mod header;

pub use bus::*;
pub use bus_builder::*;
pub use event::*;
pub use header::*;
