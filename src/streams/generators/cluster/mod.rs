mod cluster_generator;

pub use cluster_generator::ClusterEventGenerator;
