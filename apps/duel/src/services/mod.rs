pub mod game_flow;
pub mod matchmaking;
pub mod notify;
