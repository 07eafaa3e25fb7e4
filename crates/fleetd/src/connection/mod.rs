// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Live agent connections: the WebSocket endpoint agents dial into and the
//! hub that routes registry commands onto those sockets.

pub mod hub;
pub mod protocol;
pub mod ws;

pub use hub::{AgentConnection, ConnectionHub};
pub use protocol::{AgentToServer, RemoteConfig, ServerToAgent};
pub use ws::build_agent_router;
