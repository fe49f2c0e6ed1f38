//! Session-lifecycle and asynchronous-signaling core.
//!
//! Coordinates two-party live interactions (calls and turn-based games)
//! over a poll-based notification feed: a state machine validates every
//! transition, a compare-and-swap store commits it, a signal bus fans it out
//! to notification rows, a reaper reclaims abandoned sessions, and a client
//! poller turns polled rows into edge-triggered UI events.

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod machine;
pub mod state;

pub mod models {
    pub mod notification;
    pub mod session;
}

pub mod repositories {
    pub mod memory;
    pub mod postgres;
    pub mod store;
}

pub mod services {
    pub mod reaper;
    pub mod sessions;
    pub mod signals;
}

pub mod handlers {
    pub mod notifications;
    pub mod sessions;
}

pub mod middleware_layer {
    pub mod auth;
}

pub mod validation {
    pub mod sessions;
}

pub mod poller;
