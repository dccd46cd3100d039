//! Deterministic pot layering from per-player contributions.

use serde::{Deserialize, Serialize};

use crate::engine::types::{Chips, PlayerId, Pot, PotKind};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub player_id: PlayerId,
    pub amount: Chips,
    pub all_in: bool,
    pub folded: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PotLayering {
    /// `[main, side1, side2, ...]`, sorted by ascending all-in level.
    pub pots: Vec<Pot>,
    pub total: Chips,
}

/// Layer the pot at each distinct all-in level, with a final layer absorbing
/// contributions above the last all-in. Folded contributors fund pots but
/// are never eligible.
///
/// Deterministic: contributors are ordered by contribution ascending, ties
/// broken by player id ascending. The sum of layer amounts always equals the
/// sum of contributions; a mismatch is a bug and panics.
pub fn calculate(contributions: &[Contribution]) -> PotLayering {
    let mut ordered: Vec<&Contribution> = contributions.iter().collect();
    ordered.sort_by(|a, b| {
        a.amount
            .cmp(&b.amount)
            .then_with(|| a.player_id.cmp(&b.player_id))
    });

    let input_total: Chips = ordered.iter().map(|c| c.amount).sum();

    // Layer boundaries are the distinct all-in contribution levels.
    let mut levels: Vec<Chips> = ordered
        .iter()
        .filter(|c| c.all_in && c.amount > 0)
        .map(|c| c.amount)
        .collect();
    levels.sort_unstable();
    levels.dedup();

    let max_contribution = ordered.iter().map(|c| c.amount).max().unwrap_or(0);
    let absorb_above = levels.last().copied().unwrap_or(0);
    if max_contribution > absorb_above {
        levels.push(max_contribution);
    }

    let mut pots: Vec<Pot> = Vec::with_capacity(levels.len());
    let mut prev: Chips = 0;
    for level in levels {
        let mut amount: Chips = 0;
        for c in &ordered {
            amount += c.amount.min(level).saturating_sub(c.amount.min(prev));
        }
        if amount == 0 {
            prev = level;
            continue;
        }
        let mut eligible: Vec<PlayerId> = ordered
            .iter()
            .filter(|c| !c.folded && c.amount >= level)
            .map(|c| c.player_id.clone())
            .collect();
        eligible.sort();
        let kind = if pots.is_empty() {
            PotKind::Main
        } else {
            PotKind::Side
        };
        pots.push(Pot {
            amount,
            eligible,
            kind,
        });
        prev = level;
    }

    let total: Chips = pots.iter().map(|p| p.amount).sum();
    assert_eq!(
        total, input_total,
        "pot layering lost chips: layered {total}, contributed {input_total}"
    );

    PotLayering { pots, total }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contrib(id: &str, amount: Chips, all_in: bool, folded: bool) -> Contribution {
        Contribution {
            player_id: id.to_string(),
            amount,
            all_in,
            folded,
        }
    }

    #[test]
    fn three_way_all_in_layers_main_and_two_sides() {
        // A(100), B(200), C(300), all all-in preflop.
        let layering = calculate(&[
            contrib("a", 100, true, false),
            contrib("b", 200, true, false),
            contrib("c", 300, true, false),
        ]);
        assert_eq!(layering.total, 600);
        assert_eq!(layering.pots.len(), 3);

        assert_eq!(layering.pots[0].amount, 300);
        assert_eq!(layering.pots[0].kind, PotKind::Main);
        assert_eq!(layering.pots[0].eligible, vec!["a", "b", "c"]);

        assert_eq!(layering.pots[1].amount, 200);
        assert_eq!(layering.pots[1].kind, PotKind::Side);
        assert_eq!(layering.pots[1].eligible, vec!["b", "c"]);

        assert_eq!(layering.pots[2].amount, 100);
        assert_eq!(layering.pots[2].eligible, vec!["c"]);
    }

    #[test]
    fn no_all_in_yields_single_main_pot() {
        let layering = calculate(&[
            contrib("a", 50, false, false),
            contrib("b", 50, false, false),
            contrib("c", 10, false, true),
        ]);
        assert_eq!(layering.pots.len(), 1);
        assert_eq!(layering.pots[0].amount, 110);
        assert_eq!(layering.pots[0].eligible, vec!["a", "b"]);
    }

    #[test]
    fn folded_players_fund_layers_but_are_never_eligible() {
        let layering = calculate(&[
            contrib("a", 40, true, false),
            contrib("b", 100, false, false),
            contrib("c", 25, false, true),
        ]);
        // Layer at 40: a's 40 + b's 40 + c's 25 = 105; absorb: b's 60.
        assert_eq!(layering.total, 165);
        assert_eq!(layering.pots[0].amount, 105);
        assert_eq!(layering.pots[0].eligible, vec!["a", "b"]);
        assert_eq!(layering.pots[1].amount, 60);
        assert_eq!(layering.pots[1].eligible, vec!["b"]);
        for pot in &layering.pots {
            assert!(!pot.eligible.contains(&"c".to_string()));
        }
    }

    #[test]
    fn equal_all_in_levels_collapse_into_one_layer() {
        let layering = calculate(&[
            contrib("a", 80, true, false),
            contrib("b", 80, true, false),
            contrib("c", 80, false, false),
        ]);
        assert_eq!(layering.pots.len(), 1);
        assert_eq!(layering.pots[0].amount, 240);
        assert_eq!(layering.pots[0].eligible, vec!["a", "b", "c"]);
    }

    #[test]
    fn conservation_holds_for_ragged_contributions() {
        let inputs = vec![
            contrib("a", 13, true, false),
            contrib("b", 77, false, true),
            contrib("c", 200, true, false),
            contrib("d", 250, false, false),
        ];
        let layering = calculate(&inputs);
        let contributed: Chips = inputs.iter().map(|c| c.amount).sum();
        assert_eq!(layering.total, contributed);
    }
}
