use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_blank(&self) -> bool {
                self.0.trim().is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

// The backend keys users by username, so both identifiers are plain strings.
id_newtype!(UserId);
id_newtype!(TopicId);

/// Letter for one of the four options a quiz question offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnswerLetter {
    A,
    B,
    C,
    D,
}

impl AnswerLetter {
    pub const ALL: [AnswerLetter; 4] = [Self::A, Self::B, Self::C, Self::D];

    /// Maps an option position to its letter; positions past `D` have none.
    pub fn from_option_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parses a lone letter, any case, optionally followed by `)` or `.`
    /// (`"b"`, `" B "`, `"B)"`). Words such as `"bogus"` are rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let letter = trimmed
            .strip_suffix(')')
            .or_else(|| trimmed.strip_suffix('.'))
            .unwrap_or(trimmed);
        let mut chars = letter.chars();
        let (Some(first), None) = (chars.next(), chars.next()) else {
            return None;
        };
        match first.to_ascii_uppercase() {
            'A' => Some(Self::A),
            'B' => Some(Self::B),
            'C' => Some(Self::C),
            'D' => Some(Self::D),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
        }
    }
}

impl fmt::Display for AnswerLetter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub interests: Vec<String>,
    #[serde(default, rename = "isPremium")]
    pub is_premium: bool,
}

impl User {
    pub fn user_id(&self) -> UserId {
        UserId(self.username.clone())
    }
}
