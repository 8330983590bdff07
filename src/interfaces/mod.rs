//! Event sources feeding the settler.

pub mod json {
    pub mod event_reader;
}

#[cfg(feature = "event-hub-kafka")]
pub mod kafka {
    pub mod event_consumer;
}
