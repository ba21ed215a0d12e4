pub mod company;
pub mod engine;
pub mod extract;
pub mod ics;
pub mod jobs;
pub mod limits;
pub mod model;
pub mod observability;
pub mod wal;
