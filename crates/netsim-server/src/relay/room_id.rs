use crate::error::RelayError;
use rand::Rng;
use std::fmt;

pub const ROOM_ID_LEN: usize = 6;

const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Short human-typeable room token, always stored upper-case
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomId(String);

impl RoomId {
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let id = (0..ROOM_ID_LEN)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        Self(id)
    }

    /// Normalize user input: trims whitespace and ignores case
    pub fn parse(input: &str) -> Result<Self, RelayError> {
        let normalized = input.trim().to_ascii_uppercase();
        let valid = normalized.len() == ROOM_ID_LEN
            && normalized.bytes().all(|b| b.is_ascii_alphanumeric());

        if valid {
            Ok(Self(normalized))
        } else {
            Err(RelayError::InvalidRoomId(input.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
