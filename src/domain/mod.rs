// Domain layer: experiment model and ports (storage, configuration, pipeline).

pub mod model;
pub mod ports;
