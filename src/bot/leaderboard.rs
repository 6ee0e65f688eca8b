//! Leaderboard over players' best scores.
//!
//! Ordering is best score descending, then registration order ascending, so ranks are
//! total and stable. `rank_of` and `top_n` read the same ordering.

use std::sync::Arc;

use super::game::escape_markdown;
use crate::errors::BotError;
use crate::storage::{Player, PlayerStore, UserId};

const PLACE_MARKERS: [&str; 10] = [
    "🥇", "🥈", "🥉", "4️⃣", "5️⃣", "6️⃣", "7️⃣", "8️⃣", "9️⃣", "🔟",
];

/// One leaderboard row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedPlayer {
    /// 1-based.
    pub rank: usize,
    pub player: Player,
}

pub struct Leaderboard {
    store: Arc<dyn PlayerStore>,
    size: usize,
}

impl Leaderboard {
    pub fn new(store: Arc<dyn PlayerStore>, size: usize) -> Self {
        Self {
            store,
            size: size.max(1),
        }
    }

    pub fn top_n(&self, n: usize) -> Result<Vec<RankedPlayer>, BotError> {
        Ok(self
            .store
            .top(n)?
            .into_iter()
            .enumerate()
            .map(|(i, player)| RankedPlayer { rank: i + 1, player })
            .collect())
    }

    /// 1-based rank of a registered player.
    pub fn rank_of(&self, user_id: UserId) -> Result<Option<RankedPlayer>, BotError> {
        let Some(player) = self.store.get(user_id)? else {
            return Ok(None);
        };
        let ahead = self
            .store
            .count_above(player.best_score, player.registered)?;
        Ok(Some(RankedPlayer {
            rank: ahead + 1,
            player,
        }))
    }

    /// Markdown leaderboard as seen by `viewer`: the top rows, with the viewer's own row
    /// appended after an ellipsis when it falls outside them.
    pub fn render(&self, viewer: UserId) -> Result<String, BotError> {
        let top = self.top_n(self.size)?;
        let me = self.rank_of(viewer)?;

        let mut rows: Vec<&RankedPlayer> = top.iter().collect();
        let outside = me.as_ref().filter(|m| m.rank > self.size);
        if let Some(m) = outside {
            rows.push(m);
        }
        let name_width = rows
            .iter()
            .map(|r| r.player.nickname.chars().count())
            .max()
            .unwrap_or(0);

        let mut out = format!("*TOP {} PLAYERS*\n\n", self.size);
        if top.is_empty() {
            out.push_str(&escape_markdown("No games finished yet."));
            return Ok(out);
        }
        for row in &top {
            out.push_str(&render_row(row, row.player.user_id == viewer, name_width));
        }
        if let Some(m) = outside {
            out.push_str(&escape_markdown("...\n"));
            out.push_str(&render_row(m, true, name_width));
        }
        Ok(out)
    }
}

fn place_marker(rank: usize) -> String {
    match PLACE_MARKERS.get(rank.wrapping_sub(1)) {
        Some(m) => (*m).to_string(),
        None => format!("{}.", rank),
    }
}

fn render_row(row: &RankedPlayer, is_viewer: bool, name_width: usize) -> String {
    let pointer = if is_viewer { "👉" } else { "  " };
    let name = &row.player.nickname;
    let pad = " ".repeat(name_width.saturating_sub(name.chars().count()) + 1);
    format!(
        "{} {} {}{}{}\n",
        pointer,
        escape_markdown(&place_marker(row.rank)),
        escape_markdown(name),
        pad,
        row.player.best_score
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_fall_back_to_numbers() {
        assert_eq!(place_marker(1), "🥇");
        assert_eq!(place_marker(10), "🔟");
        assert_eq!(place_marker(11), "11.");
    }
}
