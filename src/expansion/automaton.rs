use std::collections::BTreeMap;

use itertools::Itertools;

use crate::butternut_asserts::butternut_assert_simple;
use crate::containers::HashSet;
use crate::expansion::add_imply_in_reachable_values;
use crate::expansion::link_literals_and_values;
use crate::expansion::ExpansionStatus;
use crate::model::AutomatonConstraint;
use crate::model::Constraint;
use crate::model::ConstraintKind;
use crate::model::Domain;
use crate::model::Literal;
use crate::presolve::PresolveContext;

/// Computes the reachable states and labels of every step of the automaton.
///
/// The forward pass walks transitions from the starting state, restricted to labels in the
/// current variable domains and, at the last step, to final head states. The backward pass then
/// drops states and labels that cannot be extended into an accepting run.
///
/// If the same variable controls several steps this may not reach the full fixed point; the
/// expansion compensates when it hits a single-transition step.
pub(crate) fn propagate_automaton(
    automaton: &AutomatonConstraint,
    context: &PresolveContext,
) -> (Vec<HashSet<i64>>, Vec<HashSet<i64>>) {
    let n = automaton.variables.len();
    let final_states: HashSet<i64> = automaton.final_states.iter().copied().collect();

    let mut states: Vec<HashSet<i64>> = vec![HashSet::default(); n + 1];
    let mut labels: Vec<HashSet<i64>> = vec![HashSet::default(); n];
    let _ = states[0].insert(automaton.starting_state);

    // Forward pass.
    for time in 0..n {
        for transition in &automaton.transitions {
            if !states[time].contains(&transition.tail) {
                continue;
            }
            if !context.domain_contains(automaton.variables[time], transition.label) {
                continue;
            }
            if time == n - 1 && !final_states.contains(&transition.head) {
                continue;
            }
            let _ = labels[time].insert(transition.label);
            let _ = states[time + 1].insert(transition.head);
        }
    }

    // Backward pass.
    for time in (0..n).rev() {
        let mut new_states = HashSet::default();
        let mut new_labels = HashSet::default();
        for transition in &automaton.transitions {
            if !states[time].contains(&transition.tail) {
                continue;
            }
            if !labels[time].contains(&transition.label) {
                continue;
            }
            if !states[time + 1].contains(&transition.head) {
                continue;
            }
            let _ = new_labels.insert(transition.label);
            let _ = new_states.insert(transition.tail);
        }
        labels[time] = new_labels;
        states[time] = new_states;
    }

    (states, labels)
}

/// Detects whether all observed values were the same one.
struct UniqueDetector {
    value: Option<i64>,
    is_unique: bool,
}

impl Default for UniqueDetector {
    fn default() -> UniqueDetector {
        UniqueDetector {
            value: None,
            is_unique: true,
        }
    }
}

impl UniqueDetector {
    fn set(&mut self, value: i64) {
        if !self.is_unique {
            return;
        }
        match self.value {
            None => self.value = Some(value),
            Some(existing) if existing != value => self.is_unique = false,
            Some(_) => {}
        }
    }
}

/// Expands an automaton constraint into per-step Boolean encodings.
///
/// The state at each step is modelled with Boolean variables; the automaton starts in the
/// starting state at step zero and must be in a final state after the last step. At every step
/// the usable transitions form a small three-column table over the in-state, the label, and the
/// out-state, which is encoded either "lightly" (one ternary clause per transition) or
/// "heavily" (one selection literal per transition, linked to the three encodings), whichever
/// needs fewer Booleans.
pub(crate) fn expand_automaton(
    constraint: Constraint,
    context: &mut PresolveContext,
) -> ExpansionStatus {
    let Constraint { enforcement, kind } = constraint;
    let ConstraintKind::Automaton(automaton) = kind else {
        unreachable!()
    };
    butternut_assert_simple!(
        enforcement.is_empty(),
        "automaton constraints do not carry enforcement literals"
    );
    let keep = |automaton: AutomatonConstraint| {
        ExpansionStatus::Kept(Constraint::new(ConstraintKind::Automaton(automaton)))
    };

    let n = automaton.variables.len();
    if n == 0 {
        if automaton.final_states.contains(&automaton.starting_state) {
            context.update_rule_stats("automaton: empty and trivially feasible");
            return ExpansionStatus::Expanded;
        }
        context.notify_that_model_is_unsat(
            "empty automaton with an initial state that is not final",
        );
        return keep(automaton);
    }
    if automaton.transitions.is_empty() {
        context.notify_that_model_is_unsat("non-empty automaton without transitions");
        return keep(automaton);
    }

    let (reachable_states, _reachable_labels) = propagate_automaton(&automaton, context);

    // The encoding of the state before the current step, inherited from the previous step.
    let mut in_encoding: BTreeMap<i64, Literal> = BTreeMap::new();
    let mut removed_values = false;

    for time in 0..n {
        let variable = automaton.variables[time];

        // The usable transitions at this step, as a three-column tuple set. On the last step
        // all out-states collapse into a single dummy state.
        let mut in_states = Vec::new();
        let mut labels = Vec::new();
        let mut out_states = Vec::new();
        for transition in &automaton.transitions {
            if !reachable_states[time].contains(&transition.tail) {
                continue;
            }
            if !reachable_states[time + 1].contains(&transition.head) {
                continue;
            }
            if !context.domain_contains(variable, transition.label) {
                continue;
            }
            in_states.push(transition.tail);
            labels.push(transition.label);
            out_states.push(if time + 1 == n { 0 } else { transition.head });
        }

        let num_tuples = in_states.len();
        if num_tuples == 0 {
            context.notify_that_model_is_unsat("automaton with an unusable step");
            return keep(automaton);
        }

        if num_tuples == 1 {
            if !context.intersect_domain_with(variable, &Domain::constant(labels[0])) {
                return keep(automaton);
            }

            // Tricky: when the same variable is used at several steps, the domain reduction
            // above might not reach the fixed point, so inherited in-state literals that
            // contradict the only usable transition are fixed to false explicitly.
            let stale: Vec<Literal> = in_encoding
                .iter()
                .filter(|&(&state, _)| state != in_states[0])
                .map(|(_, &literal)| literal)
                .collect();
            for literal in stale {
                if !context.set_literal_to_false(literal) {
                    return keep(automaton);
                }
            }

            in_encoding.clear();
            continue;
        }

        // Fully encode the variable over the usable labels.
        let mut encoding: BTreeMap<i64, Literal> = BTreeMap::new();
        {
            let usable_labels: Vec<i64> = labels.iter().copied().sorted().dedup().collect();
            let mut changed = false;
            if !context.intersect_domain_with_tracked(
                variable,
                &Domain::from_values(usable_labels),
                &mut changed,
            ) {
                return keep(automaton);
            }
            removed_values |= changed;

            // Fixed variables can keep an empty encoding.
            if !context.domain_of(variable).is_fixed() {
                for value in context.domain_of(variable).clone().values() {
                    let _ = encoding
                        .insert(value, context.get_or_create_var_value_encoding(variable, value));
                }
            }
        }

        // Count how many tuples use each in-state, label, and out-state; the counts drive the
        // literal reuse below.
        let mut in_count: BTreeMap<i64, usize> = BTreeMap::new();
        let mut transition_count: BTreeMap<i64, usize> = BTreeMap::new();
        let mut out_count: BTreeMap<i64, usize> = BTreeMap::new();
        for i in 0..num_tuples {
            *in_count.entry(in_states[i]).or_insert(0) += 1;
            *transition_count.entry(labels[i]).or_insert(0) += 1;
            *out_count.entry(out_states[i]).or_insert(0) += 1;
        }

        // Encode the out-states. With two possible states a single Boolean and its negation
        // suffice; otherwise an in-state or label literal is reused whenever it uniquely
        // determines the out-state with matching multiplicity.
        let mut out_encoding: BTreeMap<i64, Literal> = BTreeMap::new();
        let states: Vec<i64> = out_states.iter().copied().sorted().dedup().collect();
        if states.len() == 2 {
            let literal = context.new_bool_var();
            let _ = out_encoding.insert(states[0], literal);
            let _ = out_encoding.insert(states[1], !literal);
        } else if states.len() > 2 {
            let mut out_to_in: BTreeMap<i64, UniqueDetector> = BTreeMap::new();
            let mut out_to_label: BTreeMap<i64, UniqueDetector> = BTreeMap::new();
            for i in 0..num_tuples {
                out_to_in.entry(out_states[i]).or_default().set(in_states[i]);
                out_to_label.entry(out_states[i]).or_default().set(labels[i]);
            }

            for &state in &states {
                let detector = &out_to_in[&state];
                if !in_encoding.is_empty() && detector.is_unique {
                    let unique_in = detector.value.expect("at least one tuple per out-state");
                    if in_count.get(&unique_in) == out_count.get(&state) {
                        let _ = out_encoding.insert(state, in_encoding[&unique_in]);
                        continue;
                    }
                }

                let detector = &out_to_label[&state];
                if !encoding.is_empty() && detector.is_unique {
                    let unique_label = detector.value.expect("at least one tuple per out-state");
                    if transition_count.get(&unique_label) == out_count.get(&state) {
                        let _ = out_encoding.insert(state, encoding[&unique_label]);
                        continue;
                    }
                }

                let _ = out_encoding.insert(state, context.new_bool_var());
            }
        }

        // The light encoding trades propagation strength for far fewer Booleans: one ternary
        // clause per transition plus reachability restrictions per in-state. It is chosen when
        // the transition table is larger than the three encodings combined.
        let num_involved_variables = in_encoding.len() + encoding.len() + out_encoding.len();
        let use_light_encoding = num_tuples > num_involved_variables;
        if use_light_encoding
            && !in_encoding.is_empty()
            && !encoding.is_empty()
            && !out_encoding.is_empty()
        {
            let mut in_to_labels: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
            let mut in_to_outs: BTreeMap<i64, Vec<i64>> = BTreeMap::new();
            for i in 0..num_tuples {
                in_to_labels.entry(in_states[i]).or_default().push(labels[i]);
                in_to_outs.entry(in_states[i]).or_default().push(out_states[i]);
            }
            for (&in_value, &in_literal) in &in_encoding {
                add_imply_in_reachable_values(
                    context,
                    in_literal,
                    in_to_labels.get(&in_value).cloned().unwrap_or_default(),
                    &encoding,
                );
                // Restricting the out-states as well is not needed for correctness, but helps
                // propagation.
                add_imply_in_reachable_values(
                    context,
                    in_literal,
                    in_to_outs.get(&in_value).cloned().unwrap_or_default(),
                    &out_encoding,
                );
            }

            // All ternary clauses `(in_state /\ label) => out_state`.
            for i in 0..num_tuples {
                let clause = vec![
                    !in_encoding[&in_states[i]],
                    !encoding[&labels[i]],
                    out_encoding[&out_states[i]],
                ];
                let _ = context
                    .model_mut()
                    .add_constraint(Constraint::new(ConstraintKind::BoolOr(clause)));
            }

            in_encoding = out_encoding;
            continue;
        }

        // The heavy encoding: one selection literal per transition, an exactly-one across them,
        // and links from the selection literals to the three encodings.
        let mut tuple_literals = Vec::with_capacity(num_tuples);
        if num_tuples == 2 {
            let literal = context.new_bool_var();
            tuple_literals.push(literal);
            tuple_literals.push(!literal);
        } else {
            for i in 0..num_tuples {
                let tuple_literal = if !in_encoding.is_empty() && in_count[&in_states[i]] == 1 {
                    in_encoding[&in_states[i]]
                } else if !encoding.is_empty() && transition_count[&labels[i]] == 1 {
                    encoding[&labels[i]]
                } else if !out_encoding.is_empty() && out_count[&out_states[i]] == 1 {
                    out_encoding[&out_states[i]]
                } else {
                    context.new_bool_var()
                };
                tuple_literals.push(tuple_literal);
            }
            let _ = context.model_mut().add_constraint(Constraint::new(
                ConstraintKind::ExactlyOne(tuple_literals.clone()),
            ));
        }

        if !in_encoding.is_empty() {
            link_literals_and_values(context, &tuple_literals, &in_states, &in_encoding);
        }
        if !encoding.is_empty() {
            link_literals_and_values(context, &tuple_literals, &labels, &encoding);
        }
        if !out_encoding.is_empty() {
            link_literals_and_values(context, &tuple_literals, &out_states, &out_encoding);
        }

        in_encoding = out_encoding;
    }

    if removed_values {
        context.update_rule_stats("automaton: reduced variable domains");
    }
    context.update_rule_stats("automaton: expanded");
    ExpansionStatus::Expanded
}
