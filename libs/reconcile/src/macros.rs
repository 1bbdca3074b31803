//! Macros for defining open remote vocabularies.

/// Macro to define a string-valued remote vocabulary.
///
/// This generates an enum with one variant per known remote value plus an
/// `Other(String)` catch-all, so values introduced by the provider parse
/// instead of failing. The generated type has:
/// - `as_str()` returning the canonical remote spelling
/// - `is_known()` to tell known values from the catch-all
/// - `From<&str>` / `From<String>` accepting the canonical spelling and aliases
/// - `Display`, `Serialize` and `Deserialize` as a plain string
///
/// # Example
///
/// ```ignore
/// define_vocabulary! {
///     /// Remote request state.
///     RequestState {
///         Open => "open",
///         Cancelled => "cancelled" | "canceled",
///     }
/// }
///
/// assert_eq!(RequestState::from("canceled"), RequestState::Cancelled);
/// assert_eq!(RequestState::from("held").as_str(), "held");
/// ```
macro_rules! define_vocabulary {
    (
        $(#[$meta:meta])*
        $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident => $wire:literal $(| $alias:literal)*
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant,
            )+
            /// A value not known to this crate, kept verbatim.
            Other(String),
        }

        impl $name {
            /// Returns the remote spelling of this value.
            #[must_use]
            pub fn as_str(&self) -> &str {
                match self {
                    $( Self::$variant => $wire, )+
                    Self::Other(value) => value.as_str(),
                }
            }

            /// Returns false for values captured by the catch-all.
            #[must_use]
            pub fn is_known(&self) -> bool {
                !matches!(self, Self::Other(_))
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                match value {
                    $( $wire $(| $alias)* => Self::$variant, )+
                    other => Self::Other(other.to_string()),
                }
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::from(value.as_str())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: serde::Serializer,
            {
                serializer.serialize_str(self.as_str())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                let value = String::deserialize(deserializer)?;
                Ok(Self::from(value))
            }
        }
    };
}

pub(crate) use define_vocabulary;
