pub mod connector;
pub mod context;
pub mod conveyor;
pub mod event_bus;
pub mod identity;
pub mod pipeline;

pub use connector::Connector;
pub use context::StageContext;
pub use conveyor::{Conveyor, EvictionFilter, OverflowPolicy};
pub use event_bus::{Event, EventBus, EventHandleFlag, EventType, WatcherId};
pub use identity::{StageId, StageIdLease, StageIdentityPool, StageMask};
pub use pipeline::{FrameDoneCallback, LinkStatus, Pipeline, StreamMsg, StreamMsgObserver, StreamMsgType};
