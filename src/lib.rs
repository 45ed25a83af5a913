pub mod config;
pub mod db;
pub mod error;
pub mod h2h;
pub mod ledger;
pub mod player_season;
pub mod query;
pub mod regenerate;
pub mod server;
pub mod standings;
pub mod team_season;
