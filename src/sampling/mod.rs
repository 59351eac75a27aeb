pub mod buffer;
pub mod controller;
pub mod live;
pub mod loop_worker;

pub use buffer::RollingAverage;
pub use controller::SamplerController;
pub use live::{live_channel, LiveHandle, LivePublisher, LiveState};
pub use loop_worker::{Sampler, SamplerConfig, SamplerDeps};
