pub mod controller;
pub mod schedule;

pub use controller::{ControllerConfig, ControllerState, LuxController};
pub use schedule::{
    default_windows, format_hhmm, load_schedule_file, parse_hhmm, Band, ScheduleFile, SchedulePolicy, TimeWindow,
    WindowSpec,
};
