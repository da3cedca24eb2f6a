pub mod fake_player;
pub mod scripted_engine;
