pub mod driver;
pub mod job;

pub use driver::SimPlatform;
pub use job::{SimProcess, SimProgram, SimState};
