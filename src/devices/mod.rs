//! In-process device implementations used in `sim` mode and by tests.

pub mod sim_actuator;
pub mod sim_sensor;

pub use sim_actuator::SimulatedLightActuator;
pub use sim_sensor::{PatternConfig, PatternKind, SensorStatus, SimulatedLuxSensor};
