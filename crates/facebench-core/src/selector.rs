//! Named selectors for the pluggable pipeline stages.
//!
//! Each selector enum carries an exhaustive variant → display-name mapping,
//! accepts its numeric index or its name, and (de)serializes as its name.

use facebench_img::UnknownPreprocess;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown {kind} selector: {value}")]
    UnknownSelector { kind: &'static str, value: String },
    #[error(transparent)]
    Preprocess(#[from] UnknownPreprocess),
    #[error("invalid {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
    #[error("unknown preset: {0}")]
    UnknownPreset(String),
}

macro_rules! named_selector {
    (
        $(#[$meta:meta])*
        $name:ident ($what:literal) {
            $($(#[$vmeta:meta])* $variant:ident => $label:literal),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn name(self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            pub fn from_index(index: usize) -> Result<Self, $crate::selector::ConfigError> {
                Self::ALL.get(index).copied().ok_or_else(|| {
                    $crate::selector::ConfigError::UnknownSelector {
                        kind: $what,
                        value: index.to_string(),
                    }
                })
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.name())
            }
        }

        impl std::str::FromStr for $name {
            type Err = $crate::selector::ConfigError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                if let Ok(index) = s.parse::<usize>() {
                    return Self::from_index(index);
                }
                Self::ALL
                    .iter()
                    .copied()
                    .find(|k| k.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| $crate::selector::ConfigError::UnknownSelector {
                        kind: $what,
                        value: s.to_string(),
                    })
            }
        }

        impl TryFrom<String> for $name {
            type Error = $crate::selector::ConfigError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(kind: $name) -> Self {
                kind.name().to_string()
            }
        }
    };
}

pub(crate) use named_selector;
