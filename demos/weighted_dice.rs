//! Weighted Dice
//!
//! A loaded die built from probabilistic transitions.
//!
//! Key concepts:
//! - Priority groups and weights decide which enabled transition fires
//! - Each draw is seeded from (automata, state, cycle), so reruns repeat exactly
//! - Normalizing outgoing weights leaves the odds unchanged
//!
//! Run with: cargo run --example weighted_dice

use aetherium::builder::{AutomataBuilder, TransitionBuilder};
use aetherium::engine::{Fleet, LiteralHost};
use aetherium::model::Automata;
use aetherium::selector::normalize_outgoing;
use std::collections::BTreeMap;
use std::sync::Arc;

fn loaded_die() -> Automata {
    AutomataBuilder::new("loaded_die")
        .initial("Roll")
        .plain_state("Roll")
        .plain_state("One")
        .plain_state("Two")
        .plain_state("Six")
        .transition(TransitionBuilder::new("roll_one").from("Roll").to("One").probabilistic(1.0))
        .unwrap()
        .transition(TransitionBuilder::new("roll_two").from("Roll").to("Two").probabilistic(1.0))
        .unwrap()
        .transition(TransitionBuilder::new("roll_six").from("Roll").to("Six").probabilistic(2.0))
        .unwrap()
        .transition(TransitionBuilder::new("back_one").from("One").to("Roll"))
        .unwrap()
        .transition(TransitionBuilder::new("back_two").from("Two").to("Roll"))
        .unwrap()
        .transition(TransitionBuilder::new("back_six").from("Six").to("Roll"))
        .unwrap()
        .build()
        .unwrap()
}

/// Tick the die and return the sequence of faces rolled.
fn roll(automata: Arc<Automata>, ticks: usize) -> Vec<String> {
    let mut fleet = Fleet::new();
    fleet.add_device("table");
    let key = fleet.deploy("table", automata).unwrap();
    fleet.start(&key).unwrap();

    (0..ticks)
        .filter_map(|_| fleet.tick(&LiteralHost).fired.remove(&key))
        .filter(|fired| fired.starts_with("roll_"))
        .collect()
}

fn main() {
    println!("=== Weighted Dice ===\n");

    let die = Arc::new(loaded_die());
    let rolls = roll(Arc::clone(&die), 20_000);

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for face in &rolls {
        *counts.entry(face.as_str()).or_default() += 1;
    }
    println!("{} rolls:", rolls.len());
    for (face, count) in &counts {
        println!(
            "  {:<9} {:>6}  ({:.1}%)",
            face,
            count,
            100.0 * *count as f64 / rolls.len() as f64
        );
    }

    println!("\nRolling again with the same automata...");
    let again = roll(Arc::clone(&die), 20_000);
    println!("  identical sequence: {}", again == rolls);

    println!("\nNormalizing the weights out of Roll...");
    let mut normalized = loaded_die();
    normalize_outgoing(&mut normalized, "Roll").unwrap();
    for transition in normalized.transitions_from("Roll") {
        println!("  {:<9} weight {:.2}", transition.id, transition.effective_weight());
    }
}
