//! Turn orchestration: the state machine that decides when the user has
//! finished speaking and pushes the finished segment downstream.

pub mod segment;
pub mod timer;
pub mod turn;

pub use segment::SegmentAssembler;
pub use timer::TimerSlot;
pub use turn::{Command, Notice, OrchestratorDeps, OrchestratorHandle, TurnSettings};
