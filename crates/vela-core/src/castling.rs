//! Castling rights as a 4-bit set.

use std::fmt;

use crate::error::FenError;
use crate::square::Square;

/// Castling rights: bit 0 = `K`, 1 = `Q`, 2 = `k`, 3 = `q`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CastlingRights(u8);

impl CastlingRights {
    pub const NONE: CastlingRights = CastlingRights(0);
    pub const ALL: CastlingRights = CastlingRights(0b1111);

    const FLAGS: [(char, u8); 4] = [('K', 0b0001), ('Q', 0b0010), ('k', 0b0100), ('q', 0b1000)];

    /// Rights lost when a piece leaves or lands on `sq`.
    const fn revoked_by(sq: Square) -> u8 {
        match sq.index() {
            0 => 0b0010,
            4 => 0b0011,
            7 => 0b0001,
            56 => 0b1000,
            60 => 0b1100,
            63 => 0b0100,
            _ => 0,
        }
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Return the rights that survive a move touching `from` and `to`.
    #[inline]
    pub const fn after_move(self, from: Square, to: Square) -> CastlingRights {
        CastlingRights(self.0 & !(Self::revoked_by(from) | Self::revoked_by(to)))
    }

    /// Parse the FEN castling field (`"KQkq"`, `"-"`, ...).
    pub fn from_fen(s: &str) -> Result<CastlingRights, FenError> {
        if s == "-" {
            return Ok(CastlingRights::NONE);
        }
        s.chars().try_fold(CastlingRights::NONE, |acc, c| {
            Self::FLAGS
                .iter()
                .find(|(flag, _)| *flag == c)
                .map(|&(_, bit)| CastlingRights(acc.0 | bit))
                .ok_or(FenError::InvalidCastlingChar { character: c })
        })
    }
}

impl fmt::Display for CastlingRights {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("-");
        }
        for (c, bit) in Self::FLAGS {
            if self.0 & bit != 0 {
                write!(f, "{c}")?;
            }
        }
        Ok(())
    }
}
