//! Leaderboard ordering, rank lookup and rendering.

mod common;

use wayfarer::bot::Leaderboard;
use wayfarer::storage::PlayerStore;

fn seeded(size: usize) -> (tempfile::TempDir, Leaderboard) {
    let (tmp, store) = common::temp_store();
    // registration order: 1, 2, 3, 4, 5
    for (id, name, score) in [
        (1, "ann", 10),
        (2, "bob", 30),
        (3, "c_d", 10),
        (4, "dan", 0),
        (5, "eve", 25),
    ] {
        store.create(id, name).unwrap();
        store.set_best_score(id, score).unwrap();
    }
    (tmp, Leaderboard::new(store, size))
}

#[test]
fn ties_break_by_registration_order() {
    let (_tmp, board) = seeded(10);
    let order: Vec<u64> = board
        .top_n(10)
        .unwrap()
        .iter()
        .map(|r| r.player.user_id)
        .collect();
    assert_eq!(order, vec![2, 5, 1, 3, 4]);
}

#[test]
fn rank_of_agrees_with_top_n() {
    let (_tmp, board) = seeded(10);
    let top = board.top_n(10).unwrap();
    for row in &top {
        let ranked = board.rank_of(row.player.user_id).unwrap().unwrap();
        assert_eq!(ranked.rank, row.rank);
        assert_eq!(top[ranked.rank - 1].player.user_id, row.player.user_id);
    }
    assert!(board.rank_of(77).unwrap().is_none());
    assert_eq!(board.top_n(2).unwrap().len(), 2);
}

#[test]
fn render_appends_viewer_outside_the_top() {
    let (_tmp, board) = seeded(2);
    let text = board.render(3).unwrap();
    assert!(text.starts_with("*TOP 2 PLAYERS*"));
    assert!(text.contains("🥇"));
    assert!(text.contains("\\.\\.\\."));
    // viewer row: pointer, rank marker, escaped name
    let last = text.lines().last().unwrap();
    assert!(last.starts_with("👉"));
    assert!(last.contains("4️⃣"));
    assert!(last.contains("c\\_d"));
    assert!(last.trim_end().ends_with("10"));
}

#[test]
fn render_marks_viewer_inside_the_top() {
    let (_tmp, board) = seeded(3);
    let text = board.render(5).unwrap();
    assert!(!text.contains("\\.\\.\\."));
    let marked: Vec<&str> = text.lines().filter(|l| l.starts_with("👉")).collect();
    assert_eq!(marked.len(), 1);
    assert!(marked[0].contains("eve"));
    assert!(marked[0].contains("🥈"));
}

#[test]
fn empty_board_renders_placeholder() {
    let (_tmp, store) = common::temp_store();
    let board = Leaderboard::new(store, 10);
    let text = board.render(1).unwrap();
    assert!(text.contains("No games finished yet"));
}
