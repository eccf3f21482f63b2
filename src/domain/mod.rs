// Copyright (c) 2025 - Stichting Beep
//! Infrastructure Domain Models
//!
//! Value objects and invariants shared by every construct of the platform.
//!
//! # Value Objects with Invariants
//!
//! - [`Ipv4Cidr`] - IPv4 network block, host bits zero
//! - [`PortRange`] - inclusive transport port range
//! - [`Protocol`] / [`Direction`] - network rule matching
//! - [`ResourceType`] - cloud resource taxonomy
//!
//! # Invariants
//!
//! [`invariants`] holds the pure validation functions applied at
//! construction time.

pub mod invariants;
pub mod network;
pub mod resource_type;

pub use invariants::{ValidationError, ValidationResult};
pub use network::{Direction, Ipv4Cidr, NetworkError, PortRange, Protocol};
pub use resource_type::{ResourceCategory, ResourceType};
