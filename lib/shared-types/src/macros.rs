use std::sync::LazyLock;

use regex::Regex;

/// Implements [`std::fmt::Display`] for a newtype, assuming that the inner type implements Display.
macro_rules! impl_display {
    ($newtype: ty) => {
        impl std::fmt::Display for $newtype {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }
    };
}
pub(crate) use impl_display;

/// Implements [`std::convert::Into`]
macro_rules! impl_into {
    ($newtype: ty; $inner: ty) => {
        impl std::convert::From<$newtype> for $inner {
            fn from(value: $newtype) -> Self {
                value.0.into()
            }
        }
    };
}
pub(crate) use impl_into;

/// Implements [`std::str::FromStr`], [`std::convert::TryFrom<String>`], [`AsRef<str>`] and
/// [`std::fmt::Display`] for a newtype wrapping a `String` restricted to `[A-Za-z0-9_-]+`.
///
/// The newtype is expected to derive serde with `#[serde(try_from = "String")]`.
macro_rules! impls_for_identifier_newtype {
    ($newtype: ty) => {
        impl std::str::FromStr for $newtype {
            type Err = $crate::InvalidIdentifierError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if $crate::macros::is_identifier(s) {
                    Ok(Self(s.to_owned()))
                } else {
                    Err($crate::InvalidIdentifierError {
                        value: s.to_owned(),
                    })
                }
            }
        }

        impl std::convert::TryFrom<String> for $newtype {
            type Error = $crate::InvalidIdentifierError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl AsRef<str> for $newtype {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl $newtype {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        $crate::macros::impl_display!($newtype);
        $crate::macros::impl_into!($newtype; String);
    };
}
pub(crate) use impls_for_identifier_newtype;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid identifier pattern"));

pub(crate) fn is_identifier(value: &str) -> bool {
    IDENTIFIER.is_match(value)
}
