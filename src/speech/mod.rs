//! Speech recognition and synthesis coordination

pub mod amplitude;
pub mod countdown;
pub mod dispatcher;
pub mod queue_clock;
pub mod recognition;
pub mod syllables;
pub mod synthesis;
pub mod timing;
pub mod voices;

pub use amplitude::AmplitudeTracker;
pub use countdown::CountdownScheduler;
pub use dispatcher::{AnimationDispatcher, JawDirection, MovementEntry, Oscilloscope};
pub use queue_clock::ChunkQueueClock;
pub use recognition::{CaptureState, RecognitionErrorKind, RecognitionSession, RecognitionSettings};
pub use synthesis::{AudioChunk, SynthesisScheduler, SynthesisSettings};
pub use timing::{TimedWord, WordSchedule, WordTimingAllocator};
pub use voices::Voice;
