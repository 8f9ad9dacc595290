//! pipface-core: the avatar engine, no UI.
//!
//! Expression table, blend engine, particles, idle/sleep supervision and the
//! UDP command protocol. Renderers read [`types::FaceSnapshot`]s from a watch
//! channel and events from `tokio::broadcast`; they only ever change state by
//! sending [`engine::EngineCommand`]s.

pub mod channel;
pub mod client;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod expression;
pub mod face;
pub mod motion;
pub mod particles;
pub mod service;
pub mod supervisor;
pub mod types;
