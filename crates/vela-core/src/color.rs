//! Colors. An NNUE accumulator keeps one half per color, and the Black
//! half sees the board mirrored top to bottom.

use std::fmt;
use std::ops::Not;

/// Owner of a piece, or the perspective an accumulator half is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Color {
    White = 0,
    Black = 1,
}

impl Color {
    /// Halves per accumulator.
    pub const COUNT: usize = 2;

    /// Perspectives in the order accumulator halves are laid out.
    pub const ALL: [Color; 2] = [Color::White, Color::Black];

    /// Row of this perspective in accumulator, cache and stats arrays.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// The other perspective. The side to move's half is concatenated first,
    /// this one second.
    #[inline]
    pub const fn flip(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Square-index step of a pawn push, used to locate en passant squares.
    #[inline]
    pub const fn pawn_push(self) -> i8 {
        match self {
            Color::White => 8,
            Color::Black => -8,
        }
    }
}

impl Not for Color {
    type Output = Color;

    #[inline]
    fn not(self) -> Color {
        self.flip()
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Color::White => "w",
            Color::Black => "b",
        })
    }
}
