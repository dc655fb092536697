// Eligibility resolver: which starting-slot instances a player may fill.

use std::collections::{BTreeSet, HashMap};

use leaguelens_core::config::LeagueConfig;

/// The league's starting-slot instances plus the flex rules used to match
/// players against them.
#[derive(Debug, Clone)]
pub struct SlotLayout {
    slots: Vec<String>,
    /// Uppercased flex label -> uppercased base positions.
    flex: HashMap<String, Vec<String>>,
}

impl SlotLayout {
    pub fn new(slots: Vec<String>, flex: &HashMap<String, Vec<String>>) -> Self {
        let flex = flex
            .iter()
            .map(|(label, bases)| {
                (
                    label.trim().to_uppercase(),
                    bases.iter().map(|b| b.trim().to_uppercase()).collect(),
                )
            })
            .collect();
        Self { slots, flex }
    }

    pub fn from_league(league: &LeagueConfig) -> Self {
        Self::new(league.starting_slots(), &league.flex)
    }

    /// Slot instance labels, in lineup order.
    pub fn slots(&self) -> &[String] {
        &self.slots
    }

    /// A player may fill `slot` when the label is in their eligible set, or
    /// when `slot` is a flex label and one of its base positions is.
    /// Comparison ignores case and surrounding whitespace.
    pub fn can_fill(&self, eligible: &BTreeSet<String>, slot: &str) -> bool {
        let slot = slot.trim().to_uppercase();
        let held: BTreeSet<String> = eligible.iter().map(|p| p.trim().to_uppercase()).collect();
        if held.contains(&slot) {
            return true;
        }
        self.flex
            .get(&slot)
            .is_some_and(|bases| bases.iter().any(|b| held.contains(b)))
    }

    /// `matrix[i][j]` is true when player `i` may fill slot instance `j`.
    pub fn eligibility_matrix(&self, players: &[&BTreeSet<String>]) -> Vec<Vec<bool>> {
        players
            .iter()
            .map(|eligible| self.slots.iter().map(|s| self.can_fill(eligible, s)).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|s| s.to_string()).collect()
    }

    fn layout() -> SlotLayout {
        let mut flex = HashMap::new();
        flex.insert("W/R/T".to_string(), vec!["WR".into(), "RB".into(), "TE".into()]);
        SlotLayout::new(
            vec!["QB".into(), "RB".into(), "W/R/T".into(), "K".into()],
            &flex,
        )
    }

    #[test]
    fn direct_label_match() {
        let l = layout();
        assert!(l.can_fill(&set(&["RB"]), "RB"));
        assert!(!l.can_fill(&set(&["RB"]), "QB"));
        assert!(l.can_fill(&set(&["qb "]), "QB"));
    }

    #[test]
    fn flex_accepts_base_positions() {
        let l = layout();
        assert!(l.can_fill(&set(&["TE"]), "W/R/T"));
        assert!(!l.can_fill(&set(&["QB"]), "W/R/T"));
        // Provider-supplied flex label works without the flex table.
        let bare = SlotLayout::new(vec!["W/R/T".into()], &HashMap::new());
        assert!(bare.can_fill(&set(&["WR", "W/R/T"]), "W/R/T"));
        assert!(!bare.can_fill(&set(&["WR"]), "W/R/T"));
    }

    #[test]
    fn matrix_rows_follow_players() {
        let l = layout();
        let rb = set(&["RB"]);
        let k = set(&["K"]);
        let matrix = l.eligibility_matrix(&[&rb, &k]);
        assert_eq!(matrix[0], vec![false, true, true, false]);
        assert_eq!(matrix[1], vec![false, false, false, true]);
    }
}
