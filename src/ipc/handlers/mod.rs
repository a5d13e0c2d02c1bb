pub mod accessibility;
pub mod core;
pub mod feed;
pub mod setup;
