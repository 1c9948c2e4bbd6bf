//! Core chess types: board representation, FEN and copy-make move
//! application that reports the per-move piece delta.

mod bitboard;
mod board;
mod castling;
mod chess_move;
mod color;
mod dirty_piece;
mod error;
mod fen;
mod make_move;
mod piece;
mod piece_kind;
mod square;

pub use bitboard::Bitboard;
pub use board::{Board, PrettyBoard};
pub use castling::CastlingRights;
pub use chess_move::Move;
pub use color::Color;
pub use dirty_piece::DirtyPiece;
pub use error::{BoardError, FenError, MoveError};
pub use fen::STARTING_FEN;
pub use piece::Piece;
pub use piece_kind::PieceKind;
pub use square::Square;
