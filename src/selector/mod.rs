//! Transition selection.
//!
//! Selection is a pure function of the automata, the current state, the
//! pre-evaluated guard results and the execution cycle. Guard evaluation is
//! done by the caller, so the selector never touches a script host and is
//! fully reproducible.
//!
//! Rules, in order:
//!
//! 1. candidates are the outgoing transitions whose guard evaluated true;
//! 2. only the lowest `priority` value among candidates is considered;
//! 3. if every member of that group has weight 1 and none is probabilistic,
//!    the lexicographically smallest transition id wins;
//! 4. otherwise one member is drawn with probability `w_i / Σw`, using a
//!    stream seeded by `(automata id, state id, cycle)`.

mod seed;
mod weights;

pub use seed::SelectionSeed;
pub use weights::{normalize_outgoing, normalize_weights, WeightError};

use crate::model::{Automata, Transition, TransitionId};
use rand::Rng;
use std::collections::BTreeMap;

/// Guard results keyed by transition id. Missing entries count as false.
pub type GuardResults = BTreeMap<TransitionId, bool>;

/// Pick the transition to fire from `current_state`, if any.
///
/// # Example
///
/// ```rust
/// use aetherium::builder::{AutomataBuilder, TransitionBuilder};
/// use aetherium::selector::{select, GuardResults};
///
/// let automata = AutomataBuilder::new("m")
///     .initial("A")
///     .plain_state("A")
///     .plain_state("B")
///     .plain_state("C")
///     .transition(TransitionBuilder::new("urgent").from("A").to("B").priority(0)).unwrap()
///     .transition(TransitionBuilder::new("lazy").from("A").to("C").priority(1)).unwrap()
///     .build()
///     .unwrap();
///
/// let mut guards = GuardResults::new();
/// guards.insert("urgent".into(), true);
/// guards.insert("lazy".into(), true);
///
/// let chosen = select(&automata, "A", &guards, 0).unwrap();
/// assert_eq!(chosen.id, "urgent");
/// ```
pub fn select<'a>(
    automata: &'a Automata,
    current_state: &str,
    guards: &GuardResults,
    cycle: u64,
) -> Option<&'a Transition> {
    let candidates: Vec<&Transition> = automata
        .transitions_from(current_state)
        .filter(|t| guards.get(&t.id).copied().unwrap_or(false))
        .collect();

    let top_priority = candidates.iter().map(|t| t.priority).min()?;
    let mut group: Vec<&Transition> = candidates
        .into_iter()
        .filter(|t| t.priority == top_priority)
        .collect();
    group.sort_by(|a, b| a.id.cmp(&b.id));

    let deterministic = group
        .iter()
        .all(|t| t.weight == 1.0 && !t.is_probabilistic());
    if deterministic {
        return group.first().copied();
    }

    let weights: Vec<f64> = group.iter().map(|t| t.effective_weight()).collect();
    let seed = SelectionSeed::new(automata.id(), current_state, cycle);
    let index = weighted_index(&weights, seed)?;
    group.get(index).copied()
}

/// Draw an index with probability proportional to its weight.
///
/// Returns `None` when the weights cannot be normalized.
pub fn weighted_index(weights: &[f64], seed: SelectionSeed<'_>) -> Option<usize> {
    let normalized = normalize_weights(weights).ok()?;
    let draw: f64 = seed.rng().random();

    let mut cumulative = 0.0;
    for (index, weight) in normalized.iter().enumerate() {
        cumulative += weight;
        if draw < cumulative {
            return Some(index);
        }
    }
    // Rounding can leave the cumulative sum a hair under 1.0.
    normalized.iter().rposition(|w| *w > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::{AutomataBuilder, TransitionBuilder};

    fn fan_out(transitions: Vec<TransitionBuilder>) -> Automata {
        let mut builder = AutomataBuilder::new("fan")
            .initial("S")
            .plain_state("S")
            .plain_state("X")
            .plain_state("Y")
            .plain_state("Z");
        for t in transitions {
            builder = builder.transition(t).unwrap();
        }
        builder.build().unwrap()
    }

    fn all_true(automata: &Automata) -> GuardResults {
        automata.transitions().map(|t| (t.id.clone(), true)).collect()
    }

    #[test]
    fn no_true_guard_selects_nothing() {
        let automata = fan_out(vec![TransitionBuilder::new("t").from("S").to("X")]);
        let mut guards = GuardResults::new();
        guards.insert("t".into(), false);

        assert!(select(&automata, "S", &guards, 0).is_none());
        assert!(select(&automata, "S", &GuardResults::new(), 0).is_none());
    }

    #[test]
    fn lower_priority_value_wins() {
        let automata = fan_out(vec![
            TransitionBuilder::new("a").from("S").to("X").priority(1),
            TransitionBuilder::new("b").from("S").to("Y").priority(0),
        ]);
        let guards = all_true(&automata);

        for cycle in 0..50 {
            assert_eq!(select(&automata, "S", &guards, cycle).unwrap().id, "b");
        }
    }

    #[test]
    fn higher_priority_group_blocks_lower_even_if_weighted() {
        let automata = fan_out(vec![
            TransitionBuilder::new("a").from("S").to("X").priority(0),
            TransitionBuilder::new("b").from("S").to("Y").priority(1).probabilistic(100.0),
        ]);
        let guards = all_true(&automata);

        assert_eq!(select(&automata, "S", &guards, 3).unwrap().id, "a");
    }

    #[test]
    fn equal_priority_ties_break_lexicographically() {
        let automata = fan_out(vec![
            TransitionBuilder::new("zeta").from("S").to("X"),
            TransitionBuilder::new("alpha").from("S").to("Y"),
            TransitionBuilder::new("mid").from("S").to("Z"),
        ]);
        let guards = all_true(&automata);

        assert_eq!(select(&automata, "S", &guards, 0).unwrap().id, "alpha");
    }

    #[test]
    fn false_guard_removes_candidate_from_group() {
        let automata = fan_out(vec![
            TransitionBuilder::new("a").from("S").to("X"),
            TransitionBuilder::new("b").from("S").to("Y"),
        ]);
        let mut guards = all_true(&automata);
        guards.insert("a".into(), false);

        assert_eq!(select(&automata, "S", &guards, 0).unwrap().id, "b");
    }

    #[test]
    fn weighted_selection_is_reproducible() {
        let automata = fan_out(vec![
            TransitionBuilder::new("a").from("S").to("X").probabilistic(1.0),
            TransitionBuilder::new("b").from("S").to("Y").probabilistic(1.0),
            TransitionBuilder::new("c").from("S").to("Z").probabilistic(2.0),
        ]);
        let guards = all_true(&automata);

        for cycle in 0..100 {
            let first = select(&automata, "S", &guards, cycle).map(|t| t.id.clone());
            let second = select(&automata, "S", &guards, cycle).map(|t| t.id.clone());
            assert_eq!(first, second);
        }
    }

    #[test]
    fn non_unit_weight_switches_to_weighted_draw() {
        let automata = fan_out(vec![
            TransitionBuilder::new("a").from("S").to("X").weight(1.0),
            TransitionBuilder::new("b").from("S").to("Y").weight(1000.0),
        ]);
        let guards = all_true(&automata);

        let picked_b = (0..200)
            .filter(|cycle| select(&automata, "S", &guards, *cycle).unwrap().id == "b")
            .count();
        assert!(picked_b > 190);
    }

    #[test]
    fn weighted_index_single_member() {
        let seed = SelectionSeed::new("m", "S", 0);
        assert_eq!(weighted_index(&[0.3], seed), Some(0));
        assert_eq!(weighted_index(&[], seed), None);
    }
}
