pub mod health;
pub mod history;
pub mod inbound;
pub mod logs;
pub mod ports;
