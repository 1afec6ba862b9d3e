//! Camera-based tank level monitor.
//!
//! Pulls H.264 over RTSP (TCP interleaved), reassembles access units, and
//! turns the float position reported by an external detector into
//! smoothed, hysteresis-gated level readings published over an in-process
//! event bus.
//!
//! ```text
//! RtspClient --AccessUnit--> SnapshotStage --SnapshotReceived--> detector
//!     --FloatPositionDetected--> LevelPipeline --LevelCalculated--> LevelReporter
//! ```
//!
//! Decoding, detection and the wire publisher are capability traits
//! ([`FrameDecoder`], [`LevelDetector`], [`Publisher`]) implemented by the
//! embedding application.

pub mod bus;
pub mod config;
pub mod error;
pub mod ingest;
pub mod level;
pub mod lifecycle;
pub mod media;
pub mod protocol;
pub mod publish;
pub mod session;
pub mod transport;

pub use bus::{Event, EventBus, EventKind, Subscription};
pub use config::{
    LevelConfig, MonitorConfig, PublishConfig, SchedulerConfig, SessionConfig, SnapshotMode,
};
pub use error::{Error, ProtocolErrorKind, Result, RtpError};
pub use level::{Calibration, LevelDetector, LevelPipeline, LevelSample};
pub use lifecycle::{ControlSignal, Controllable, bind_control};
pub use media::{AccessUnit, FrameDecoder, NalUnit, RasterFrame};
pub use publish::{LevelReporter, Publisher, Qos};
pub use session::{MediaSink, RtspClient, RtspTarget, SessionState};
