//! # bardesession
//!
//! Per-destination playback sessions for the Barde voice streaming engine.
//!
//! A [`Session`] owns one queue, one transcode pipeline and one playback
//! state machine for one voice destination; the [`SessionRegistry`]
//! guarantees at most one live session per destination and evicts idle or
//! terminated sessions.
//!
//! Control operations (`enqueue`, `pause`, `resume`, `skip`, `stop`,
//! `set_loop`, queue manipulation) are serialized through the session's
//! command channel, so concurrent callers always observe a well-defined
//! total order. Playback progress is reported through a broadcast stream
//! of [`PlayerEvent`]s carrying titles and error kinds only.
//!
//! ## Error containment
//!
//! Resolution and transcode failures on one queue entry are contained by
//! the skip-on-error policy: the entry is discarded, a
//! [`PlayerEvent::TrackSkipped`] is emitted and the next entry starts. A
//! transport failure is session-fatal: the session stops, emits
//! [`PlayerEvent::Stopped`] and is evicted; any retry belongs to the
//! external command layer.

mod error;
mod events;
mod queue;
mod registry;
mod session;
mod state;

pub use error::{Result, SessionError};
pub use events::{PlayerEvent, StopReason};
pub use queue::{QueueEntry, TrackQueue};
pub use registry::{PipelineBuilder, SessionRegistry};
pub use session::{DestinationId, NowPlaying, Session, SessionSnapshot};
pub use state::{LoopMode, PlaybackState};
