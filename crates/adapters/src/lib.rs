// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! lume-adapters: integrations with the outside world.
//!
//! The Hue bridge REST client and its SSE event stream, plus the
//! geocoding lookup used by solar schedules. Everything here is a thin
//! translation layer: wire formats in, engine types out.

pub mod geo;
pub mod hue;

pub use geo::{GeoError, Geocoder, GeocoderConfig};
pub use hue::client::{HueClient, HueConfig, HueError};
pub use hue::sse::{
    parse_frame, FrameParser, HttpConnector, ReconnectConfig, SseError, SseReader,
    StreamConnector,
};
