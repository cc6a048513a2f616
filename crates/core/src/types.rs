//! Identifier newtypes shared by every FleetOps crate.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an existing identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Generate a fresh random (UUID v4) identifier.
            pub fn generate() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            /// Borrow the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Driver (user) identifier
    DriverId
);
id_type!(
    /// Vehicle identifier (the code scanned at check-in)
    VehicleId
);
id_type!(
    /// Shift identifier
    ShiftId
);
id_type!(
    /// Vehicle assignment identifier
    AssignmentId
);
id_type!(
    /// Admin (reviewer / dispatcher) identifier
    AdminId
);
id_type!(
    /// Trip identifier
    TripId
);
id_type!(
    /// Verification attempt identifier
    VerificationId
);
id_type!(
    /// Live subscriber connection identifier
    ConnectionId
);
