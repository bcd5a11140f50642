use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, SourceError, SourceResult};

// Macro keeps all ID wrappers structurally identical, so wire compatibility stays predictable.
macro_rules! define_wire_id {
    ($name:ident, $id_type:literal) => {
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            Serialize,
            Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new(raw: Uuid) -> Self {
                Self(raw)
            }

            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            pub fn parse(raw: &str) -> SourceResult<Self> {
                let parsed = Uuid::parse_str(raw).context(InvalidIdSnafu {
                    stage: "parse-wire-id",
                    id_type: $id_type,
                    raw: raw.to_string(),
                })?;
                Ok(Self(parsed))
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(formatter, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self::new(value)
            }
        }

        impl From<$name> for Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl FromStr for $name {
            type Err = SourceError;

            fn from_str(raw: &str) -> SourceResult<Self> {
                Self::parse(raw)
            }
        }
    };
}

define_wire_id!(ConversationId, "conversation-id");
define_wire_id!(MessageId, "message-id");
define_wire_id!(SenderId, "sender-id");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_roundtrips_through_display_and_parse() {
        let id = MessageId::generate();
        let encoded = id.to_string();
        let decoded = encoded.parse::<MessageId>().expect("valid id must parse");
        assert_eq!(decoded, id);
    }

    #[test]
    fn malformed_id_is_rejected() {
        let result = ConversationId::parse("not-a-valid-uuid");
        assert!(matches!(result, Err(SourceError::InvalidId { .. })));
    }
}
