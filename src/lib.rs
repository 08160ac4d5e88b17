#[macro_use]
extern crate log;
#[macro_use]
extern crate anyhow;

pub mod api;
pub mod archive;
pub mod calories;
pub mod framing;
pub mod framing_manager;
mod logs;
pub mod main_db;
pub mod storage;
pub mod track;
pub mod trip;
pub mod utils;
