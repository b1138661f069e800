pub mod castling;
pub mod command;
pub mod correction_guidance;
pub mod correction_mode;
pub mod field_events;
pub mod manager;
pub mod move_state;
pub mod player_moves;
pub mod session;
pub mod task_worker;

pub use command::{
    EventCallback, GameCallbacks, GameInfo, GameManagerConfig, GameManagerConfigBuilder,
    KeyCallback, MoveCallback, TakebackCallback,
};
pub use correction_guidance::{
    check_kings_in_center, choose_guidance_pair, compute_state_deltas, GuidanceOutcome,
};
pub use correction_mode::CorrectionMode;
pub use manager::GameManager;
pub use move_state::{
    castling_lane_for_rook, CastlingLane, KingLiftTimer, MoveState, CASTLING_LANES,
    CENTER_SQUARES, MIN_UCI_MOVE_LENGTH,
};
pub use task_worker::GameTaskWorker;
