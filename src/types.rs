//! Core data model for absorption chess: colors, piece kinds, ability sets,
//! the board grid, and the JSON-shaped payload types sent to clients.
//!
//! Coordinates follow the wire protocol directly: `row` 0 is the top of the
//! board (black's back rank), `row` 7 is the bottom (white's back rank).
//! White advances toward row 0; black advances toward row 7.

use serde::de::{self, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

// ---------------------------------------------------------------------------
// Color
// ---------------------------------------------------------------------------

/// A side in the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    /// The other side.
    pub fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Row delta for a single forward step (white moves toward row 0).
    pub fn pawn_direction(self) -> i8 {
        match self {
            Color::White => -1,
            Color::Black => 1,
        }
    }

    /// Row pawns of this color start on.
    pub fn pawn_start_row(self) -> u8 {
        match self {
            Color::White => 6,
            Color::Black => 1,
        }
    }

    /// Row a pawn of this color must reach to be eligible for promotion.
    pub fn promotion_row(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }

    /// Back-rank row this color's king/rooks start on.
    pub fn back_row(self) -> u8 {
        match self {
            Color::White => 7,
            Color::Black => 0,
        }
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

// ---------------------------------------------------------------------------
// PieceKind
// ---------------------------------------------------------------------------

/// The six movement patterns a piece can carry. A piece's nominal `kind`
/// drives promotion/pawn-direction logic; its `abilities` set (below)
/// drives what moves it may actually make.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl PieceKind {
    const ALL: [PieceKind; 6] = [
        PieceKind::Pawn,
        PieceKind::Knight,
        PieceKind::Bishop,
        PieceKind::Rook,
        PieceKind::Queen,
        PieceKind::King,
    ];

    fn bit(self) -> u8 {
        1 << match self {
            PieceKind::Pawn => 0,
            PieceKind::Knight => 1,
            PieceKind::Bishop => 2,
            PieceKind::Rook => 3,
            PieceKind::Queen => 4,
            PieceKind::King => 5,
        }
    }
}

// ---------------------------------------------------------------------------
// AbilitySet — a small bitset over the six kinds
// ---------------------------------------------------------------------------

/// The set of movement abilities a piece has accumulated. Fits in one byte;
/// always contains the piece's own nominal kind at creation and only ever
/// grows (except when a pending promotion is cancelled).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AbilitySet(u8);

impl AbilitySet {
    pub fn of(kind: PieceKind) -> Self {
        AbilitySet(kind.bit())
    }

    pub fn contains(self, kind: PieceKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn insert(&mut self, kind: PieceKind) {
        self.0 |= kind.bit();
    }

    pub fn len(self) -> u32 {
        self.0.count_ones()
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = PieceKind> {
        PieceKind::ALL.into_iter().filter(move |k| self.contains(*k))
    }

    pub fn to_vec(self) -> Vec<PieceKind> {
        self.iter().collect()
    }
}

impl Serialize for AbilitySet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kinds = self.to_vec();
        let mut seq = serializer.serialize_seq(Some(kinds.len()))?;
        for kind in kinds {
            seq.serialize_element(&kind)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AbilitySet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct AbilitySetVisitor;
        impl<'de> Visitor<'de> for AbilitySetVisitor {
            type Value = AbilitySet;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "an array of piece kinds")
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<AbilitySet, A::Error> {
                let mut set = AbilitySet::default();
                while let Some(kind) = seq.next_element::<PieceKind>()? {
                    set.insert(kind);
                }
                Ok(set)
            }
        }
        deserializer.deserialize_seq(AbilitySetVisitor)
    }
}

// ---------------------------------------------------------------------------
// Square — (row, col), serialized as a [row, col] JSON pair
// ---------------------------------------------------------------------------

/// A board coordinate. `row` 0 is the top (black's back rank); `col` 0 is
/// the left edge. Both in `0..8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Square {
    pub row: u8,
    pub col: u8,
}

impl Square {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(row: i16, col: i16) -> bool {
        (0..8).contains(&row) && (0..8).contains(&col)
    }

    /// Returns the square offset by `(drow, dcol)`, or `None` if it falls
    /// off the board.
    pub fn offset(self, drow: i8, dcol: i8) -> Option<Square> {
        let row = self.row as i16 + drow as i16;
        let col = self.col as i16 + dcol as i16;
        if Square::in_bounds(row, col) {
            Some(Square::new(row as u8, col as u8))
        } else {
            None
        }
    }

    pub fn key(self) -> String {
        format!("{},{}", self.row, self.col)
    }
}

impl Serialize for Square {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.row)?;
        seq.serialize_element(&self.col)?;
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Square {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SquareVisitor;
        impl<'de> Visitor<'de> for SquareVisitor {
            type Value = Square;
            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "a [row, col] pair")
            }
            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Square, A::Error> {
                let row: u8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let col: u8 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if row > 7 || col > 7 {
                    return Err(de::Error::custom("square coordinates must be 0..8"));
                }
                Ok(Square::new(row, col))
            }
        }
        deserializer.deserialize_seq(SquareVisitor)
    }
}

// ---------------------------------------------------------------------------
// Piece
// ---------------------------------------------------------------------------

/// A piece on the board. `abilities` is the set of movement patterns it may
/// use; `kind` is its nominal identity (drives promotion/pawn-direction
/// logic and never changes except on promotion).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
    pub abilities: AbilitySet,
    pub position: Square,
    pub has_moved: bool,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color, position: Square) -> Self {
        Self {
            kind,
            color,
            abilities: AbilitySet::of(kind),
            position,
            has_moved: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// An 8x8 grid of optional pieces, row-major with row 0 at the top.
#[derive(Debug, Clone)]
pub struct Board {
    cells: [[Option<Piece>; 8]; 8],
}

impl Board {
    pub fn empty() -> Self {
        Self {
            cells: [[None; 8]; 8],
        }
    }

    pub fn get(&self, sq: Square) -> Option<Piece> {
        self.cells[sq.row as usize][sq.col as usize]
    }

    pub fn set(&mut self, sq: Square, piece: Option<Piece>) {
        self.cells[sq.row as usize][sq.col as usize] = piece;
    }

    pub fn find_king(&self, color: Color) -> Option<Square> {
        for row in 0..8u8 {
            for col in 0..8u8 {
                let sq = Square::new(row, col);
                if let Some(p) = self.get(sq)
                    && p.color == color
                    && p.kind == PieceKind::King
                {
                    return Some(sq);
                }
            }
        }
        None
    }

    pub fn pieces(&self) -> impl Iterator<Item = (Square, Piece)> + '_ {
        (0..8u8).flat_map(move |row| {
            (0..8u8).filter_map(move |col| {
                let sq = Square::new(row, col);
                self.get(sq).map(|p| (sq, p))
            })
        })
    }

    /// Sets up the standard absorption-chess starting position: identical
    /// to standard chess, each piece starting with a single-kind ability set.
    pub fn starting_position() -> Self {
        let mut board = Self::empty();

        let back_rank = [
            PieceKind::Rook,
            PieceKind::Knight,
            PieceKind::Bishop,
            PieceKind::Queen,
            PieceKind::King,
            PieceKind::Bishop,
            PieceKind::Knight,
            PieceKind::Rook,
        ];

        for (col, kind) in back_rank.iter().enumerate() {
            board.set(
                Square::new(0, col as u8),
                Some(Piece::new(*kind, Color::Black, Square::new(0, col as u8))),
            );
            board.set(
                Square::new(1, col as u8),
                Some(Piece::new(PieceKind::Pawn, Color::Black, Square::new(1, col as u8))),
            );
            board.set(
                Square::new(6, col as u8),
                Some(Piece::new(PieceKind::Pawn, Color::White, Square::new(6, col as u8))),
            );
            board.set(
                Square::new(7, col as u8),
                Some(Piece::new(*kind, Color::White, Square::new(7, col as u8))),
            );
        }

        board
    }

    /// Serializes to the 8x8 nullable-piece grid used in `game_state` payloads.
    pub fn to_json(&self) -> Vec<Vec<Option<Piece>>> {
        (0..8u8)
            .map(|row| {
                (0..8u8)
                    .map(|col| self.get(Square::new(row, col)))
                    .collect()
            })
            .collect()
    }

    pub fn from_json(rows: Vec<Vec<Option<Piece>>>) -> Self {
        let mut board = Self::empty();
        for (row, cells) in rows.into_iter().enumerate() {
            for (col, piece) in cells.into_iter().enumerate() {
                board.set(Square::new(row as u8, col as u8), piece);
            }
        }
        board
    }
}

impl Serialize for Board {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Board {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rows = Vec::<Vec<Option<Piece>>>::deserialize(deserializer)?;
        Ok(Board::from_json(rows))
    }
}

// ---------------------------------------------------------------------------
// Move — from/to plus the special-move flags the rules layer needs to apply it
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub is_castling: bool,
    pub is_en_passant: bool,
}

impl Move {
    pub fn simple(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            is_castling: false,
            is_en_passant: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Promotion-pending record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PromotionPending {
    pub row: u8,
    pub col: u8,
    pub color: Color,
    pub from: Square,
}

impl PromotionPending {
    /// The pawn's resting square, reassembled from the flattened `row`/`col`.
    pub fn square(&self) -> Square {
        Square::new(self.row, self.col)
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Per-game chess clock. `last_turn_start_ms` is a monotonic millisecond
/// timestamp (relative to an arbitrary epoch owned by the `Game`), not a
/// wall-clock value, so that `tokio::time::pause`/`advance` drive it in tests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Clock {
    pub white_ms: i64,
    pub black_ms: i64,
    pub increment_ms: i64,
    #[serde(rename = "last_turn_start")]
    pub last_turn_start_ms: i64,
}

impl Clock {
    pub fn new(initial_ms: i64, increment_ms: i64, now_ms: i64) -> Self {
        Self {
            white_ms: initial_ms,
            black_ms: initial_ms,
            increment_ms,
            last_turn_start_ms: now_ms,
        }
    }

    pub fn remaining(self, turn: Color, now_ms: i64) -> i64 {
        let base = match turn {
            Color::White => self.white_ms,
            Color::Black => self.black_ms,
        };
        base - (now_ms - self.last_turn_start_ms)
    }

    fn ms_mut(&mut self, color: Color) -> &mut i64 {
        match color {
            Color::White => &mut self.white_ms,
            Color::Black => &mut self.black_ms,
        }
    }

    /// Debits the elapsed time from `turn`'s clock. Returns the resulting
    /// remaining time (may be negative, signalling a flag-fall).
    pub fn debit_elapsed(&mut self, turn: Color, now_ms: i64) -> i64 {
        let elapsed = now_ms - self.last_turn_start_ms;
        let remaining = *self.ms_mut(turn) - elapsed;
        *self.ms_mut(turn) = remaining;
        remaining
    }

    /// Applies the increment to `moved` and restarts the clock for the new
    /// side to move.
    pub fn apply_increment_and_restart(&mut self, moved: Color, now_ms: i64) {
        *self.ms_mut(moved) += self.increment_ms;
        if *self.ms_mut(moved) < 0 {
            *self.ms_mut(moved) = 0;
        }
        self.last_turn_start_ms = now_ms;
    }
}

// ---------------------------------------------------------------------------
// Move history entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveHistoryEntry {
    pub from: Square,
    pub to: Square,
    pub piece_kind: PieceKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captured_kind: Option<PieceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub en_passant_captured: Option<PieceKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abilities_gained: Option<Vec<PieceKind>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub promoted_to: Option<PieceKind>,
}

// ---------------------------------------------------------------------------
// Terminal adjudication
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GameOverReason {
    Checkmate,
    Stalemate,
    Resign,
    Draw,
    Timeout,
    Disconnect,
}

/// Failure reasons for a rejected move/action. Never thrown as an
/// exception; always returned by value from the rules/game layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveError {
    WrongTurn,
    NoPiece,
    OwnPieceAtTarget,
    OutOfBounds,
    AbilityDisallows,
    PutsOwnKingInCheck,
    PromotionPendingMustResolve,
    GameOver,
}

impl fmt::Display for MoveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MoveError::WrongTurn => "wrong_turn",
            MoveError::NoPiece => "no_piece",
            MoveError::OwnPieceAtTarget => "own_piece_at_target",
            MoveError::OutOfBounds => "out_of_bounds",
            MoveError::AbilityDisallows => "ability_disallows",
            MoveError::PutsOwnKingInCheck => "puts_own_king_in_check",
            MoveError::PromotionPendingMustResolve => "promotion_pending_must_resolve",
            MoveError::GameOver => "game_over",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ability_set_starts_with_own_kind() {
        let set = AbilitySet::of(PieceKind::Rook);
        assert!(set.contains(PieceKind::Rook));
        assert!(!set.contains(PieceKind::Knight));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ability_set_union_grows() {
        let mut set = AbilitySet::of(PieceKind::Rook);
        set.insert(PieceKind::Knight);
        assert!(set.contains(PieceKind::Rook));
        assert!(set.contains(PieceKind::Knight));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn square_offset_respects_bounds() {
        let sq = Square::new(0, 0);
        assert_eq!(sq.offset(-1, 0), None);
        assert_eq!(sq.offset(1, 1), Some(Square::new(1, 1)));
    }

    #[test]
    fn starting_position_has_both_kings() {
        let board = Board::starting_position();
        assert!(board.find_king(Color::White).is_some());
        assert!(board.find_king(Color::Black).is_some());
        assert_eq!(board.find_king(Color::White), Some(Square::new(7, 4)));
        assert_eq!(board.find_king(Color::Black), Some(Square::new(0, 4)));
    }

    #[test]
    fn square_json_roundtrip() {
        let sq = Square::new(3, 5);
        let json = serde_json::to_string(&sq).unwrap();
        assert_eq!(json, "[3,5]");
        let back: Square = serde_json::from_str(&json).unwrap();
        assert_eq!(back, sq);
    }
}
