use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! define_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }
    };
}

// World / session addressing
define_id!(WorldId);
define_id!(SessionId);
define_id!(ChapterId);
define_id!(AreaId);

// Characters (players, allies, NPCs) and combat participants
define_id!(CharacterId);
define_id!(CombatId);
define_id!(CombatantId);

// Memory graph
define_id!(MemoryNodeId);
define_id!(MemoryEdgeId);

// World/narrative events
define_id!(EventId);
define_id!(EventDefId);

// Turn bookkeeping
define_id!(StateDeltaId);
define_id!(ToolCallId);
