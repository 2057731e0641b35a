//! Optional instruction set extensions, selected by the `tl:<name>:` source header.

use std::{
    fmt::{Display, Formatter},
    ops::{BitOr, BitOrAssign},
};

use serde::{Deserialize, Serialize};

/// The prefix that starts an extension header.
pub const EXTENSION_HEADER_PREFIX: &[u8] = b"tl:";

/// The separator between extension names in the header.
pub const EXTENSION_HEADER_SEPARATOR: u8 = b':';

/// The maximum length of an extension name.
pub const MAX_EXTENSION_NAME_LEN: usize = 3;

/// The extensions understood by this interpreter, keyed by their header name.
pub const SUPPORTED_EXTENSIONS: &[(&str, Extensions)] = &[("net", Extensions::NET)];

/// A set of enabled extensions, stored as a bitmask.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Extensions(u8);

impl Extensions {
    /// No extension enabled.
    pub const NONE: Self = Self(0);

    /// The networking extension.
    pub const NET: Self = Self(0b0000_0001);

    /// Create a set from raw bits.
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// The raw bits of this set.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns `true` if every extension in `other` is enabled in `self`.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns `true` if no extension is enabled.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Look up a supported extension by its header name.
    #[must_use]
    pub fn from_name(name: &[u8]) -> Option<Self> {
        SUPPORTED_EXTENSIONS
            .iter()
            .find(|(supported, _)| supported.as_bytes() == name)
            .map(|(_, extension)| *extension)
    }

    /// Returns `true` if `byte` appears in the name of any supported extension.
    #[must_use]
    pub fn is_name_byte(byte: u8) -> bool {
        SUPPORTED_EXTENSIONS.iter().any(|(name, _)| name.as_bytes().contains(&byte))
    }

    /// Detect the extension header at the very start of `source`.
    ///
    /// Parsing never fails: it stops at the first name that is unsupported, too long, or made of
    /// characters no supported name uses, keeping whatever was enabled up to that point. Plain
    /// brainfuck sources therefore always end up with no extension enabled.
    #[must_use]
    pub fn detect(source: &[u8]) -> Self {
        let mut extensions = Self::NONE;
        if source.len() <= EXTENSION_HEADER_PREFIX.len() + MAX_EXTENSION_NAME_LEN
            || !source.starts_with(EXTENSION_HEADER_PREFIX)
        {
            return extensions;
        }

        let mut name = Vec::with_capacity(MAX_EXTENSION_NAME_LEN);
        for &byte in &source[EXTENSION_HEADER_PREFIX.len()..] {
            if byte == EXTENSION_HEADER_SEPARATOR {
                let Some(extension) = Self::from_name(&name) else {
                    break;
                };
                extensions |= extension;
                name.clear();
                continue;
            }
            if name.len() == MAX_EXTENSION_NAME_LEN {
                // Anything longer can't be a valid name, but the name so far may be.
                if let Some(extension) = Self::from_name(&name) {
                    extensions |= extension;
                }
                break;
            }
            if !Self::is_name_byte(byte) {
                break;
            }
            name.push(byte);
        }
        extensions
    }
}

impl BitOr for Extensions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Extensions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl Display for Extensions {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let names = SUPPORTED_EXTENSIONS
            .iter()
            .filter(|(_, extension)| self.contains(*extension))
            .map(|(name, _)| *name)
            .collect::<Vec<_>>();
        if names.is_empty() {
            f.write_str("none")
        } else {
            f.write_str(&names.join(":"))
        }
    }
}
