//! FEN parsing and serialization for [`Board`].

use std::fmt;
use std::str::FromStr;

use crate::board::Board;
use crate::castling::CastlingRights;
use crate::color::Color;
use crate::error::FenError;
use crate::piece::Piece;
use crate::square::Square;

/// The FEN string for the standard starting position.
pub const STARTING_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

impl FromStr for Board {
    type Err = FenError;

    /// Parse a FEN record. The two move counters may be omitted.
    fn from_str(fen: &str) -> Result<Board, FenError> {
        parse_fen(fen).inspect_err(|e| tracing::debug!(fen, error = %e, "rejected FEN"))
    }
}

fn parse_fen(fen: &str) -> Result<Board, FenError> {
    let fields: Vec<&str> = fen.split_whitespace().collect();
    if !(4..=6).contains(&fields.len()) {
        return Err(FenError::WrongFieldCount { found: fields.len() });
    }

    let ranks: Vec<&str> = fields[0].split('/').collect();
    if ranks.len() != 8 {
        return Err(FenError::WrongRankCount { found: ranks.len() });
    }

    let mut board = Board::empty();
    for (rank_index, rank_str) in ranks.iter().enumerate() {
        let rank = 7 - rank_index as u8;
        let mut file: u8 = 0;
        for c in rank_str.chars() {
            if let Some(skip) = c.to_digit(10) {
                if !(1..=8).contains(&skip) {
                    return Err(FenError::InvalidPieceChar { character: c });
                }
                file += skip as u8;
                continue;
            }
            let piece = Piece::from_fen_char(c).ok_or(FenError::InvalidPieceChar { character: c })?;
            let sq = Square::from_coords(file, rank).ok_or(FenError::BadRankLength {
                rank_index,
                length: file as usize + 1,
            })?;
            board.put_piece(piece, sq);
            file += 1;
        }
        if file != 8 {
            return Err(FenError::BadRankLength { rank_index, length: file as usize });
        }
    }

    let side_to_move = match fields[1] {
        "w" => Color::White,
        "b" => Color::Black,
        other => return Err(FenError::InvalidColor { found: other.to_string() }),
    };

    let castling = CastlingRights::from_fen(fields[2])?;

    let en_passant = match fields[3] {
        "-" => None,
        text => Some(
            Square::from_algebraic(text)
                .ok_or_else(|| FenError::InvalidEnPassant { found: text.to_string() })?,
        ),
    };

    let counter = |index: usize, field: &'static str, default: u16| -> Result<u16, FenError> {
        fields.get(index).map_or(Ok(default), |text| {
            text.parse::<u16>()
                .map_err(|_| FenError::InvalidMoveCounter { field, found: text.to_string() })
        })
    };
    let halfmove_clock = counter(4, "halfmove clock", 0)?;
    let fullmove_number = counter(5, "fullmove number", 1)?;

    board.set_state(side_to_move, castling, en_passant, halfmove_clock, fullmove_number);
    board.validate()?;
    Ok(board)
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for rank in (0..8u8).rev() {
            let mut empty = 0;
            for file in 0..8u8 {
                match Square::from_coords(file, rank).and_then(|sq| self.piece_on(sq)) {
                    Some(piece) => {
                        if empty > 0 {
                            write!(f, "{empty}")?;
                            empty = 0;
                        }
                        write!(f, "{piece}")?;
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                write!(f, "{empty}")?;
            }
            if rank > 0 {
                f.write_str("/")?;
            }
        }

        write!(f, " {} {}", self.side_to_move(), self.castling())?;
        match self.en_passant() {
            Some(sq) => write!(f, " {sq}")?,
            None => f.write_str(" -")?,
        }
        write!(f, " {} {}", self.halfmove_clock(), self.fullmove_number())
    }
}
