//! Permission model.
//!
//! Capabilities are held as structured records indexed for lookup; the
//! flat `app.<action>_<project>_<objectType>__<field>` strings are only a
//! serialization format for the capability store.

mod action;
mod capabilities;
mod gate;
mod permission;

pub use action::{Action, ObjectType, Scope};
pub use capabilities::{Capability, CapabilitySet, CapabilitySetBuilder, UserContext};
pub use gate::PermissionGate;
pub use permission::{PermissionCodename, get_permission, parse_permission};
