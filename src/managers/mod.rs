pub mod coordinator;
pub mod logging;
pub mod notification;
pub mod pipeline;
pub mod retention;
pub mod status;
