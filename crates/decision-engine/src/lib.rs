pub mod cycle;
pub mod resolver;

pub use cycle::{
    CancellationFlag, CycleOutcome, CycleReport, CycleRequest, CycleState, DecisionEngine,
    ProducerOutcome, ProducerReport,
};
pub use resolver::{position_scale_factor, resolve};
