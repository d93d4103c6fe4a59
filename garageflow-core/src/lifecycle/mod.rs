//! Job status rules and the optimistic job board.

pub mod board;
pub mod events;
pub mod transition;


pub use board::{BoardCoordinator, BoardSnapshot, MoveOutcome};
pub use events::BoardEvent;
pub use transition::{is_valid_transition, BoardPolicy, TransitionPolicy};
