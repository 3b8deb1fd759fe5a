pub mod stubs;

pub use stubs::VecEventStream;
