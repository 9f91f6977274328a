//! # Anteroom Services Library
//!
//! Core library for token lifecycle management and service coordination.
//! This library provides access-token caching with proactive refresh, a
//! service registry with coordinated startup/shutdown, and the async
//! coordination services the presentation layer subscribes to.
//!
//! ## Modules
//!
//! - [`auth`] - Identity provider abstraction, token service, and JWT helpers
//! - [`registry`] - Named service catalog with lifecycle and readiness signaling
//! - [`events`] - Typed publish/subscribe primitive used by every service
//! - [`coordination`] - Waiting, toast, and modal-form coordination services
//! - [`api`] - Authenticated JSON API client
//! - [`bootstrap`] - Application wiring for the full service roster

pub mod api;
pub mod auth;
pub mod bootstrap;
pub mod coordination;
pub mod events;
pub mod registry;
