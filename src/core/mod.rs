pub mod aggregation;
pub mod composer;
pub mod executor;
pub mod export;
pub mod inspector;
pub mod session;
pub mod widgets;
