pub mod action_event;
pub mod decision;
pub mod reading;

pub use action_event::ActionEvent;
pub use decision::{ControlAction, ControlDecision, Thresholds};
pub use reading::Reading;
