pub mod analysis;
pub mod poller;
pub mod stall;
