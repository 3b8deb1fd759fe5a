mod poisson_generator;

pub use poisson_generator::PoissonEventGenerator;
