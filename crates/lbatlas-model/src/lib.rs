// Copyright (c) lbatlas contributors
// SPDX-License-Identifier: Apache-2.0

//! The normalised load-balancer tree every vendor collector produces and
//! the bitemporal writer persists. The tree is strictly owning
//! (LB -> VS -> backend servers, no back-edges).

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Extra vendor attributes, keyed by a human-readable label.
pub type Extra = BTreeMap<String, String>;

/// Available actions, keyed by action id with a human-readable label.
pub type Actions = BTreeMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerState {
    Up,
    Down,
    Disabled,
    Unknown,
}

impl ServerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerState::Up => "up",
            ServerState::Down => "down",
            ServerState::Disabled => "disabled",
            ServerState::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct LoadBalancer {
    pub name: String,
    /// Free-form vendor tag ("AAS", "F5 LTM", ..., or "A + B" when several
    /// collectors share the device).
    pub kind: String,
    pub description: String,
    pub extra: Extra,
    pub actions: Actions,
    /// Virtual servers keyed by their vendor-specific id.
    pub virtualservers: BTreeMap<String, VirtualServer>,
}

impl LoadBalancer {
    pub fn new(name: &str, kind: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: kind.to_string(),
            description: description.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct VirtualServer {
    pub name: String,
    /// Textual "ip:port" or a composite form for grouped services.
    pub vip: String,
    pub protocol: String,
    /// Vendor balancing mode, normalised to a lowercase string.
    pub mode: String,
    pub extra: Extra,
    pub actions: Actions,
    /// Real and sorry servers keyed by their vendor-specific id.
    pub realservers: BTreeMap<String, BackendServer>,
}

impl VirtualServer {
    pub fn new(name: &str, vip: &str, protocol: &str, mode: &str) -> Self {
        Self {
            name: name.to_string(),
            vip: vip.to_string(),
            protocol: protocol.to_string(),
            mode: mode.to_string(),
            ..Default::default()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct RealServer {
    pub name: String,
    pub rip: String,
    pub rport: Option<i32>,
    pub protocol: String,
    pub weight: i32,
    pub state: ServerState,
    pub extra: Extra,
    pub actions: Actions,
}

impl RealServer {
    pub fn new(
        name: &str,
        rip: &str,
        rport: Option<i32>,
        protocol: &str,
        weight: i32,
        state: ServerState,
    ) -> Self {
        Self {
            name: name.to_string(),
            rip: rip.to_string(),
            rport,
            protocol: protocol.to_string(),
            weight,
            state,
            extra: Extra::new(),
            actions: Actions::new(),
        }
    }
}

/// A backup member, served when the primaries are gone. Same shape as
/// `RealServer` minus the weight; kept as a distinct variant so downstream
/// code can always tell primaries from backups.
#[derive(Clone, Debug, PartialEq)]
pub struct SorryServer {
    pub name: String,
    pub rip: String,
    pub rport: Option<i32>,
    pub protocol: String,
    pub state: ServerState,
    pub extra: Extra,
    pub actions: Actions,
}

impl SorryServer {
    pub fn new(name: &str, rip: &str, rport: Option<i32>, protocol: &str, state: ServerState) -> Self {
        Self {
            name: name.to_string(),
            rip: rip.to_string(),
            rport,
            protocol: protocol.to_string(),
            state,
            extra: Extra::new(),
            actions: Actions::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackendServer {
    Real(RealServer),
    Sorry(SorryServer),
}

impl BackendServer {
    pub fn is_sorry(&self) -> bool {
        matches!(self, BackendServer::Sorry(_))
    }

    pub fn name(&self) -> &str {
        match self {
            BackendServer::Real(rs) => &rs.name,
            BackendServer::Sorry(rs) => &rs.name,
        }
    }

    pub fn state(&self) -> ServerState {
        match self {
            BackendServer::Real(rs) => rs.state,
            BackendServer::Sorry(rs) => rs.state,
        }
    }

    pub fn extra(&self) -> &Extra {
        match self {
            BackendServer::Real(rs) => &rs.extra,
            BackendServer::Sorry(rs) => &rs.extra,
        }
    }

    pub fn extra_mut(&mut self) -> &mut Extra {
        match self {
            BackendServer::Real(rs) => &mut rs.extra,
            BackendServer::Sorry(rs) => &mut rs.extra,
        }
    }

    pub fn actions(&self) -> &Actions {
        match self {
            BackendServer::Real(rs) => &rs.actions,
            BackendServer::Sorry(rs) => &rs.actions,
        }
    }
}

/// What one `collect` call yields, scoped to the refresh that asked for it.
/// The writer matches on the variant to restrict its close/insert pass.
#[derive(Clone, Debug, PartialEq)]
pub enum Snapshot {
    LoadBalancer(LoadBalancer),
    VirtualServer(VirtualServer),
    Backend(BackendServer),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_renders_lowercase() {
        assert_eq!(ServerState::Up.to_string(), "up");
        assert_eq!(ServerState::Disabled.to_string(), "disabled");
    }

    #[test]
    fn backend_variants() {
        let rs = BackendServer::Real(RealServer::new(
            "web1",
            "10.0.0.1",
            Some(80),
            "TCP",
            1,
            ServerState::Up,
        ));
        let sorry = BackendServer::Sorry(SorryServer::new(
            "backup",
            "10.0.0.9",
            Some(80),
            "TCP",
            ServerState::Down,
        ));
        assert!(!rs.is_sorry());
        assert!(sorry.is_sorry());
        assert_eq!(sorry.state(), ServerState::Down);
    }
}
