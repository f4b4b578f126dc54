pub mod camera_service;
pub mod network;
pub mod status_monitor;
pub mod stream_relay;

pub use camera_service::{CameraService, CheckOutcome, SweepReport, SweepSummary};
pub use network::{Pinger, SystemPinger};
pub use status_monitor::{MonitorState, StatusMonitor};
pub use stream_relay::StreamRelay;
