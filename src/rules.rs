//! Legal-move generation and application for absorption chess.
//!
//! A piece may move according to **any** ability in its ability set; the
//! own-king-safety filter is applied on top of the per-kind geometry by
//! simulating each pseudo-legal move on a scratch board and rejecting any
//! that leave the mover's own king in check.

use crate::types::*;
use std::collections::HashMap;

const ROOK_DIRS: [(i8, i8); 4] = [(-1, 0), (1, 0), (0, -1), (0, 1)];
const BISHOP_DIRS: [(i8, i8); 4] = [(-1, -1), (-1, 1), (1, -1), (1, 1)];
const KNIGHT_OFFSETS: [(i8, i8); 8] = [
    (-2, -1), (-2, 1), (-1, -2), (-1, 2),
    (1, -2), (1, 2), (2, -1), (2, 1),
];

// ---------------------------------------------------------------------------
// Attack detection
// ---------------------------------------------------------------------------

/// Returns `true` if `sq` is attacked by any piece of `attacker_color`,
/// under the union of abilities each attacking piece holds.
pub fn is_square_attacked(board: &Board, sq: Square, attacker_color: Color) -> bool {
    for &(dr, dc) in &KNIGHT_OFFSETS {
        if let Some(from) = sq.offset(dr, dc)
            && let Some(piece) = board.get(from)
            && piece.color == attacker_color
            && piece.abilities.contains(PieceKind::Knight)
        {
            return true;
        }
    }

    for dr in -1..=1i8 {
        for dc in -1..=1i8 {
            if dr == 0 && dc == 0 {
                continue;
            }
            if let Some(from) = sq.offset(dr, dc)
                && let Some(piece) = board.get(from)
                && piece.color == attacker_color
                && piece.abilities.contains(PieceKind::King)
            {
                return true;
            }
        }
    }

    let pawn_dir = attacker_color.pawn_direction();
    for dc in [-1i8, 1] {
        if let Some(from) = sq.offset(-pawn_dir, dc)
            && let Some(piece) = board.get(from)
            && piece.color == attacker_color
            && piece.abilities.contains(PieceKind::Pawn)
        {
            return true;
        }
    }

    for &(dr, dc) in &BISHOP_DIRS {
        let mut cur = sq;
        while let Some(next) = cur.offset(dr, dc) {
            if let Some(piece) = board.get(next) {
                if piece.color == attacker_color
                    && (piece.abilities.contains(PieceKind::Bishop)
                        || piece.abilities.contains(PieceKind::Queen))
                {
                    return true;
                }
                break;
            }
            cur = next;
        }
    }

    for &(dr, dc) in &ROOK_DIRS {
        let mut cur = sq;
        while let Some(next) = cur.offset(dr, dc) {
            if let Some(piece) = board.get(next) {
                if piece.color == attacker_color
                    && (piece.abilities.contains(PieceKind::Rook)
                        || piece.abilities.contains(PieceKind::Queen))
                {
                    return true;
                }
                break;
            }
            cur = next;
        }
    }

    false
}

/// Returns `true` if `color`'s king is currently attacked.
pub fn is_in_check(board: &Board, color: Color) -> bool {
    match board.find_king(color) {
        Some(king_sq) => is_square_attacked(board, king_sq, color.opponent()),
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Pseudo-legal move generation (per ability, before king-safety filtering)
// ---------------------------------------------------------------------------

fn generate_sliding_moves(board: &Board, from: Square, color: Color, dirs: &[(i8, i8)], moves: &mut Vec<Move>) {
    for &(dr, dc) in dirs {
        let mut cur = from;
        while let Some(to) = cur.offset(dr, dc) {
            match board.get(to) {
                None => {
                    moves.push(Move::simple(from, to));
                    cur = to;
                }
                Some(target) => {
                    if target.color != color {
                        moves.push(Move::simple(from, to));
                    }
                    break;
                }
            }
        }
    }
}

fn generate_knight_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    for &(dr, dc) in &KNIGHT_OFFSETS {
        if let Some(to) = from.offset(dr, dc) {
            match board.get(to) {
                None => moves.push(Move::simple(from, to)),
                Some(target) if target.color != color => moves.push(Move::simple(from, to)),
                _ => {}
            }
        }
    }
}

fn generate_king_step_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    for dr in -1..=1i8 {
        for dc in -1..=1i8 {
            if dr == 0 && dc == 0 {
                continue;
            }
            if let Some(to) = from.offset(dr, dc) {
                match board.get(to) {
                    None => moves.push(Move::simple(from, to)),
                    Some(target) if target.color != color => moves.push(Move::simple(from, to)),
                    _ => {}
                }
            }
        }
    }
}

fn generate_pawn_moves(
    board: &Board,
    from: Square,
    color: Color,
    en_passant: Option<Square>,
    moves: &mut Vec<Move>,
) {
    let dir = color.pawn_direction();
    let start_row = color.pawn_start_row();

    if let Some(one_ahead) = from.offset(dir, 0)
        && board.get(one_ahead).is_none()
    {
        moves.push(Move::simple(from, one_ahead));

        if from.row == start_row
            && let Some(two_ahead) = from.offset(dir * 2, 0)
            && board.get(two_ahead).is_none()
        {
            moves.push(Move::simple(from, two_ahead));
        }
    }

    for dc in [-1i8, 1] {
        if let Some(to) = from.offset(dir, dc) {
            if let Some(target) = board.get(to)
                && target.color != color
            {
                moves.push(Move::simple(from, to));
            }
            if Some(to) == en_passant {
                moves.push(Move {
                    from,
                    to,
                    is_castling: false,
                    is_en_passant: true,
                });
            }
        }
    }
}

/// Castling is only available through the king's own nominal kind — even a
/// king that has absorbed a rook's ability does not gain a generic "rook
/// jump"; the special castling move stays tied to the actual home king.
fn generate_castling_moves(board: &Board, from: Square, color: Color, moves: &mut Vec<Move>) {
    let rank = color.back_row();
    if from != Square::new(rank, 4) {
        return;
    }
    let king = match board.get(from) {
        Some(p) if p.kind == PieceKind::King && !p.has_moved => p,
        _ => return,
    };
    let _ = king;

    if is_square_attacked(board, from, color.opponent()) {
        return;
    }

    let is_home_rook = |board: &Board, sq: Square| -> bool {
        matches!(board.get(sq), Some(p) if p.kind == PieceKind::Rook && p.color == color && !p.has_moved)
    };

    // Kingside
    let f = Square::new(rank, 5);
    let g = Square::new(rank, 6);
    let rook_sq = Square::new(rank, 7);
    if is_home_rook(board, rook_sq)
        && board.get(f).is_none()
        && board.get(g).is_none()
        && !is_square_attacked(board, f, color.opponent())
        && !is_square_attacked(board, g, color.opponent())
    {
        moves.push(Move {
            from,
            to: g,
            is_castling: true,
            is_en_passant: false,
        });
    }

    // Queenside
    let d = Square::new(rank, 3);
    let c = Square::new(rank, 2);
    let b = Square::new(rank, 1);
    let rook_sq0 = Square::new(rank, 0);
    if is_home_rook(board, rook_sq0)
        && board.get(d).is_none()
        && board.get(c).is_none()
        && board.get(b).is_none()
        && !is_square_attacked(board, d, color.opponent())
        && !is_square_attacked(board, c, color.opponent())
    {
        moves.push(Move {
            from,
            to: c,
            is_castling: true,
            is_en_passant: false,
        });
    }
}

pub(crate) fn generate_pseudo_legal_moves(board: &Board, turn: Color, en_passant: Option<Square>) -> Vec<Move> {
    let mut moves = Vec::with_capacity(64);

    for (from, piece) in board.pieces() {
        if piece.color != turn {
            continue;
        }
        for ability in piece.abilities.iter() {
            match ability {
                PieceKind::Pawn => generate_pawn_moves(board, from, turn, en_passant, &mut moves),
                PieceKind::Knight => generate_knight_moves(board, from, turn, &mut moves),
                PieceKind::Bishop => generate_sliding_moves(board, from, turn, &BISHOP_DIRS, &mut moves),
                PieceKind::Rook => generate_sliding_moves(board, from, turn, &ROOK_DIRS, &mut moves),
                PieceKind::Queen => {
                    generate_sliding_moves(board, from, turn, &BISHOP_DIRS, &mut moves);
                    generate_sliding_moves(board, from, turn, &ROOK_DIRS, &mut moves);
                }
                PieceKind::King => generate_king_step_moves(board, from, turn, &mut moves),
            }
        }
        if piece.kind == PieceKind::King {
            generate_castling_moves(board, from, turn, &mut moves);
        }
    }

    dedup_moves(moves)
}

/// Absorbed abilities can overlap (e.g. a rook that has also absorbed a
/// queen), producing the same `(from, to)` destination from two different
/// ability generators. Collapse those, keeping special-move flags.
fn dedup_moves(moves: Vec<Move>) -> Vec<Move> {
    let mut seen: HashMap<(Square, Square), Move> = HashMap::with_capacity(moves.len());
    for mv in moves {
        seen.entry((mv.from, mv.to))
            .and_modify(|existing| {
                existing.is_castling |= mv.is_castling;
                existing.is_en_passant |= mv.is_en_passant;
            })
            .or_insert(mv);
    }
    seen.into_values().collect()
}

/// Generates every legal move for `turn`: pseudo-legal moves filtered by
/// the own-king-safety rule (simulate, check, revert).
pub fn generate_legal_moves(board: &Board, turn: Color, en_passant: Option<Square>) -> Vec<Move> {
    generate_pseudo_legal_moves(board, turn, en_passant)
        .into_iter()
        .filter(|mv| {
            let mut test_board = board.clone();
            apply_move(&mut test_board, *mv, turn);
            !is_in_check(&test_board, turn)
        })
        .collect()
}

/// Groups legal moves by origin square, as published to the side to move.
pub fn legal_moves_by_origin(board: &Board, turn: Color, en_passant: Option<Square>) -> HashMap<Square, Vec<Square>> {
    let mut map: HashMap<Square, Vec<Square>> = HashMap::new();
    for mv in generate_legal_moves(board, turn, en_passant) {
        map.entry(mv.from).or_default().push(mv.to);
    }
    map
}

// ---------------------------------------------------------------------------
// Move application
// ---------------------------------------------------------------------------

/// What happened when a move was applied to the board: used to build the
/// move-history entry and to report absorption to the caller.
#[derive(Debug, Clone)]
pub struct MoveEffect {
    pub piece_kind: PieceKind,
    pub captured_kind: Option<PieceKind>,
    pub en_passant_captured: Option<PieceKind>,
    pub abilities_gained: Vec<PieceKind>,
}

/// Applies `mv` to `board` for the mover `color`: performs the capture (or
/// en-passant capture), the castling rook hop, and the absorption of the
/// captured piece's kind into the mover's ability set.
pub fn apply_move(board: &mut Board, mv: Move, color: Color) -> MoveEffect {
    let mut piece = board.get(mv.from).expect("apply_move: no piece on from square");
    let piece_kind = piece.kind;
    let abilities_before = piece.abilities;
    board.set(mv.from, None);

    let mut captured_kind = None;
    let mut en_passant_captured = None;

    if mv.is_en_passant {
        let captured_sq = Square::new((mv.to.row as i8 - color.pawn_direction()) as u8, mv.to.col);
        if let Some(captured) = board.get(captured_sq) {
            en_passant_captured = Some(captured.kind);
            piece.abilities.insert(captured.kind);
        }
        board.set(captured_sq, None);
    } else if let Some(captured) = board.get(mv.to) {
        captured_kind = Some(captured.kind);
        piece.abilities.insert(captured.kind);
    }

    if mv.is_castling {
        let rank = mv.from.row;
        if mv.to.col == 6 {
            move_rook(board, Square::new(rank, 7), Square::new(rank, 5));
        } else if mv.to.col == 2 {
            move_rook(board, Square::new(rank, 0), Square::new(rank, 3));
        }
    }

    let abilities_gained: Vec<PieceKind> = piece
        .abilities
        .iter()
        .filter(|k| !abilities_before.contains(*k))
        .collect();

    piece.position = mv.to;
    piece.has_moved = true;
    board.set(mv.to, Some(piece));

    MoveEffect {
        piece_kind,
        captured_kind,
        en_passant_captured,
        abilities_gained,
    }
}

fn move_rook(board: &mut Board, from: Square, to: Square) {
    if let Some(mut rook) = board.get(from) {
        rook.position = to;
        rook.has_moved = true;
        board.set(from, None);
        board.set(to, Some(rook));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starting_position_has_twenty_legal_moves() {
        let board = Board::starting_position();
        let moves = generate_legal_moves(&board, Color::White, None);
        assert_eq!(moves.len(), 20);
    }

    #[test]
    fn starting_position_not_in_check() {
        let board = Board::starting_position();
        assert!(!is_in_check(&board, Color::White));
        assert!(!is_in_check(&board, Color::Black));
    }

    #[test]
    fn absorption_adds_captured_kind_to_abilities() {
        let mut board = Board::empty();
        board.set(Square::new(7, 4), Some(Piece::new(PieceKind::King, Color::White, Square::new(7, 4))));
        board.set(Square::new(0, 4), Some(Piece::new(PieceKind::King, Color::Black, Square::new(0, 4))));
        board.set(Square::new(4, 4), Some(Piece::new(PieceKind::Rook, Color::White, Square::new(4, 4))));
        board.set(Square::new(4, 6), Some(Piece::new(PieceKind::Knight, Color::Black, Square::new(4, 6))));

        let mv = Move::simple(Square::new(4, 4), Square::new(4, 6));
        let effect = apply_move(&mut board, mv, Color::White);

        assert_eq!(effect.captured_kind, Some(PieceKind::Knight));
        assert_eq!(effect.abilities_gained, vec![PieceKind::Knight]);
        let moved = board.get(Square::new(4, 6)).unwrap();
        assert!(moved.abilities.contains(PieceKind::Rook));
        assert!(moved.abilities.contains(PieceKind::Knight));
    }

    #[test]
    fn castling_rejected_through_attacked_square() {
        let mut board = Board::empty();
        board.set(Square::new(7, 4), Some(Piece::new(PieceKind::King, Color::White, Square::new(7, 4))));
        board.set(Square::new(7, 7), Some(Piece::new(PieceKind::Rook, Color::White, Square::new(7, 7))));
        board.set(Square::new(0, 4), Some(Piece::new(PieceKind::King, Color::Black, Square::new(0, 4))));
        board.set(Square::new(0, 5), Some(Piece::new(PieceKind::Rook, Color::Black, Square::new(0, 5))));

        let moves = generate_legal_moves(&board, Color::White, None);
        assert!(!moves.iter().any(|m| m.is_castling));

        board.set(Square::new(0, 5), None);
        let moves = generate_legal_moves(&board, Color::White, None);
        let castle = moves.iter().find(|m| m.is_castling).expect("castling should now be legal");
        assert_eq!(castle.to, Square::new(7, 6));
    }

    #[test]
    fn en_passant_capture_is_generated() {
        let mut board = Board::empty();
        board.set(Square::new(7, 4), Some(Piece::new(PieceKind::King, Color::White, Square::new(7, 4))));
        board.set(Square::new(0, 4), Some(Piece::new(PieceKind::King, Color::Black, Square::new(0, 4))));
        board.set(Square::new(3, 4), Some(Piece::new(PieceKind::Pawn, Color::White, Square::new(3, 4))));
        board.set(Square::new(3, 3), Some(Piece::new(PieceKind::Pawn, Color::Black, Square::new(3, 3))));

        let ep = Some(Square::new(2, 3));
        let moves = generate_legal_moves(&board, Color::White, ep);
        let ep_moves: Vec<_> = moves.iter().filter(|m| m.is_en_passant).collect();
        assert_eq!(ep_moves.len(), 1);
        assert_eq!(ep_moves[0].to, Square::new(2, 3));
    }

    #[test]
    fn moving_into_self_check_is_rejected() {
        let mut board = Board::empty();
        board.set(Square::new(7, 4), Some(Piece::new(PieceKind::King, Color::White, Square::new(7, 4))));
        board.set(Square::new(0, 4), Some(Piece::new(PieceKind::King, Color::Black, Square::new(0, 4))));
        board.set(Square::new(6, 4), Some(Piece::new(PieceKind::Rook, Color::White, Square::new(6, 4))));
        board.set(Square::new(2, 4), Some(Piece::new(PieceKind::Rook, Color::Black, Square::new(2, 4))));

        let moves = generate_legal_moves(&board, Color::White, None);
        // The white rook is pinned; moving it off the file would expose the king.
        assert!(!moves.iter().any(|m| m.from == Square::new(6, 4) && m.to.col != 4));
    }
}
