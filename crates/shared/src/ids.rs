macro_rules! define_id {
    ($name:ident, $what:literal) => {
        #[doc = concat!("Typed UUID v7 identifier for ", $what, ".")]
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub uuid::Uuid);

        #[allow(clippy::new_without_default)]
        impl $name {
            /// Generate a new time-sortable identifier.
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(uuid::Uuid::parse_str(s)?))
            }
        }
    };
}

define_id!(UserId, "a user account");
define_id!(KeyId, "one generation of a user's identity key");

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn user_id_new_creates_v7_uuid() {
        let id = UserId::new();
        assert_eq!(id.0.get_version(), Some(uuid::Version::SortRand));
    }

    #[test]
    fn user_id_serializes_as_bare_uuid_string() {
        let id = UserId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{id}\""));
        let back: UserId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn user_id_from_str_rejects_garbage() {
        assert!(UserId::from_str("not-a-uuid").is_err());
        assert!(UserId::from_str("").is_err());
    }

    #[test]
    fn key_id_round_trips_through_display() {
        let id = KeyId::new();
        let parsed = KeyId::from_str(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
    }

    #[test]
    fn key_ids_order_by_generation() {
        let older = KeyId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let newer = KeyId::new();
        assert!(older < newer);
    }
}
