//! Property tests over random forests, weights and costs.

use costalloc_core::{
    allocate, replay, results_from, Account, AccountTree, AllocationRule, CostVector, RuleSet,
};
use proptest::prelude::*;
use rust_decimal::Decimal;

/// Per node: (is_root, parent pick, weight of the edge from its parent, cost in cents).
type NodeShape = (bool, usize, u8, i64);

/// Codes are scrambled so parents do not always sort before children.
fn code(i: usize) -> String {
    format!("{:03}", (i * 7919) % 1000)
}

fn build(shapes: &[NodeShape]) -> (AccountTree, Vec<AllocationRule>, CostVector) {
    let mut accounts = Vec::new();
    let mut rules = Vec::new();
    let mut costs = CostVector::new();
    for (i, &(is_root, pick, weight, cents)) in shapes.iter().enumerate() {
        let me = code(i);
        if i == 0 || is_root {
            accounts.push(Account::root(&me, ""));
        } else {
            let parent = code(pick % i);
            accounts.push(Account::new(&me, "", Some(&parent)));
            rules.push(AllocationRule::new(&parent, &me, Decimal::from(weight % 5)));
        }
        if cents != 0 {
            costs.add(&me, Decimal::new(cents, 2));
        }
    }
    let tree = AccountTree::build(accounts).expect("acyclic by construction");
    (tree, rules, costs)
}

fn shapes() -> impl Strategy<Value = Vec<NodeShape>> {
    prop::collection::vec(
        (
            prop::bool::weighted(0.1),
            any::<usize>(),
            any::<u8>(),
            prop_oneof![Just(0i64), -100_000_000i64..100_000_000i64],
        ),
        1..40,
    )
}

proptest! {
    #[test]
    fn cost_is_conserved(shapes in shapes()) {
        let (tree, rules, costs) = build(&shapes);
        let set = RuleSet::normalize(&tree, &rules).unwrap();
        let settlement = allocate(&tree, &set, costs.clone()).unwrap();

        let settled: Decimal = results_from(&settlement.final_costs)
            .iter()
            .map(|r| r.amount)
            .sum();
        prop_assert_eq!(settled, costs.total());
    }

    #[test]
    fn shares_sum_to_one(shapes in shapes()) {
        let (tree, rules, _) = build(&shapes);
        let set = RuleSet::normalize(&tree, &rules).unwrap();
        for parent in set.parents() {
            prop_assert_eq!(set.share_sum(parent), Decimal::ONE);
        }
    }

    #[test]
    fn terminal_accounts_keep_what_they_receive(shapes in shapes()) {
        let (tree, rules, costs) = build(&shapes);
        let set = RuleSet::normalize(&tree, &rules).unwrap();
        let settlement = allocate(&tree, &set, costs).unwrap();

        for posting in &settlement.postings {
            prop_assert!(!set.is_terminal(&posting.parent_code));
            prop_assert!(tree.is_child(&posting.parent_code, &posting.child_code));
        }
        for (code, amount) in settlement.final_costs.nonzero() {
            prop_assert!(set.is_terminal(code), "{} kept {}", code, amount);
        }
    }

    #[test]
    fn iterations_bounded_by_height(shapes in shapes()) {
        let (tree, rules, costs) = build(&shapes);
        let set = RuleSet::normalize(&tree, &rules).unwrap();
        let settlement = allocate(&tree, &set, costs).unwrap();
        prop_assert!(settlement.iterations <= tree.height());
    }

    #[test]
    fn postings_replay_to_final_vector(shapes in shapes()) {
        let (tree, rules, costs) = build(&shapes);
        let set = RuleSet::normalize(&tree, &rules).unwrap();
        let settlement = allocate(&tree, &set, costs.clone()).unwrap();
        let replayed = replay(&costs, &settlement.postings);
        prop_assert_eq!(results_from(&replayed), results_from(&settlement.final_costs));
    }
}
