//! Enumerations that cross the wire as fixed numeric codes.
//!
//! Codes are part of the protocol contract and must never be renumbered.
//! Values serialize as integers; decoding accepts either the integer code or
//! the variant name, because some servers emit enum names in error bodies.

/// Declares an enum with fixed wire codes and integer serde support.
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $(
                $(#[$vmeta:meta])*
                $variant:ident = $code:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $(
                $(#[$vmeta])*
                $variant = $code
            ),+
        }

        impl $name {
            /// Every variant in code order.
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            /// Returns the numeric wire code.
            #[must_use]
            pub const fn code(self) -> i32 {
                self as i32
            }

            /// Looks up a variant by its wire code.
            #[must_use]
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $(c if c == $code => Some($name::$variant),)+
                    _ => None,
                }
            }

            /// Returns the variant name.
            #[must_use]
            pub const fn name(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }

            /// Looks up a variant by name, ignoring ASCII case.
            #[must_use]
            pub fn from_name(name: &str) -> Option<Self> {
                $(
                    if name.eq_ignore_ascii_case(stringify!($variant)) {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl $crate::__serde::Serialize for $name {
            fn serialize<S>(&self, serializer: S) -> ::std::result::Result<S::Ok, S::Error>
            where
                S: $crate::__serde::Serializer,
            {
                serializer.serialize_i32(self.code())
            }
        }

        impl<'de> $crate::__serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> ::std::result::Result<Self, D::Error>
            where
                D: $crate::__serde::Deserializer<'de>,
            {
                struct CodeVisitor;

                impl<'de> $crate::__serde::de::Visitor<'de> for CodeVisitor {
                    type Value = $name;

                    fn expecting(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                        write!(f, "a {} code or name", stringify!($name))
                    }

                    fn visit_i64<E>(self, v: i64) -> ::std::result::Result<$name, E>
                    where
                        E: $crate::__serde::de::Error,
                    {
                        $name::from_code(v).ok_or_else(|| {
                            E::custom(format!("unknown {} code {v}", stringify!($name)))
                        })
                    }

                    fn visit_u64<E>(self, v: u64) -> ::std::result::Result<$name, E>
                    where
                        E: $crate::__serde::de::Error,
                    {
                        let code = i64::try_from(v).map_err(E::custom)?;
                        self.visit_i64(code)
                    }

                    fn visit_str<E>(self, v: &str) -> ::std::result::Result<$name, E>
                    where
                        E: $crate::__serde::de::Error,
                    {
                        $name::from_name(v).ok_or_else(|| {
                            E::custom(format!("unknown {} name {v:?}", stringify!($name)))
                        })
                    }
                }

                deserializer.deserialize_any(CodeVisitor)
            }
        }
    };
}

wire_enum! {
    /// Stage of the sync session, reported by the server on failures.
    pub enum SyncStage {
        None = 0,
        BeginSession = 1,
        EndSession = 2,
        ScopeLoading = 3,
        ScopeWriting = 4,
        SnapshotCreating = 5,
        SnapshotApplying = 6,
        SchemaReading = 7,
        Provisioning = 8,
        Deprovisioning = 9,
        ChangesSelecting = 10,
        ChangesApplying = 11,
        Migrating = 12,
        MetadataCleaning = 13,
    }
}

impl Default for SyncStage {
    fn default() -> Self {
        Self::None
    }
}

wire_enum! {
    /// Kind of sync requested by the client.
    pub enum SyncType {
        Normal = 0,
        Reinitialize = 1,
        ReinitializeWithUpload = 2,
    }
}

impl Default for SyncType {
    fn default() -> Self {
        Self::Normal
    }
}

wire_enum! {
    /// Operation the server asks the client to perform after negotiation.
    pub enum SyncOperation {
        Normal = 0,
        Reinitialize = 1,
        ReinitializeWithUpload = 2,
        DropAllAndSync = 4,
        DropAllAndExit = 8,
        DeprovisionAndSync = 16,
        AbortSync = 32,
    }
}

impl Default for SyncOperation {
    fn default() -> Self {
        Self::Normal
    }
}

wire_enum! {
    /// How row conflicts are resolved. The resolution itself happens elsewhere.
    pub enum ConflictResolutionPolicy {
        ServerWins = 0,
        ClientWins = 1,
    }
}

impl Default for ConflictResolutionPolicy {
    fn default() -> Self {
        Self::ServerWins
    }
}
