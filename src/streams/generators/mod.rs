mod cluster;
mod poisson;

pub use cluster::ClusterEventGenerator;
pub use poisson::PoissonEventGenerator;
