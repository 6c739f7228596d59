pub mod app;
pub mod game;

pub use app::Config;
pub use game::GameSettings;
