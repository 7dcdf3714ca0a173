//! ID newtype generation.

/// Define a newtype ID wrapper around `String`.
///
/// Generates `new()`, `as_str()`, `Display`, `From<String>`, `From<&str>`,
/// `PartialEq<str>`, `PartialEq<&str>` implementations, matching the shape
/// tools elsewhere in this workspace expect from an opaque identifier.
#[macro_export]
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl PartialEq<str> for $name {
            fn eq(&self, other: &str) -> bool {
                self.0 == other
            }
        }

        impl PartialEq<&str> for $name {
            fn eq(&self, other: &&str) -> bool {
                self.0 == *other
            }
        }
    };
}

crate::define_id! {
    /// Identity of a disc: its fingerprint, formatted as a 64-char hex string.
    pub struct DiscId;
}

crate::define_id! {
    /// Surrogate key for a track row, `{disc_id}:{track_number}`.
    pub struct TrackId;
}

crate::define_id! {
    /// Task identifier: `{UTC-timestamp}-{kind}[-{suffix}]`, lexicographically
    /// sortable by creation order.
    pub struct TaskId;
}

crate::define_id! {
    /// `(daemon_id, device)` drive identity, formatted as `{daemon_id}:{device}`.
    pub struct DriveId;
}
