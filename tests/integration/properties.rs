use il_patcher::search::find_instruction;
use il_patcher::{Instruction, JsonProvider, MethodDef, Module, Patcher, Target, TypeDef};
use proptest::prelude::*;
use std::collections::BTreeSet;

fn numbered(len: usize) -> Vec<Instruction> {
    (0..len).map(|i| Instruction::ldc_i4(i as i32)).collect()
}

fn session(body: Vec<Instruction>) -> Patcher {
    let module = Module::new("p")
        .with_type(TypeDef::new("N", "C").with_method(MethodDef::new("M").with_body(body)));
    Patcher::from_module(module, JsonProvider, false)
}

fn method() -> Target {
    Target::new("N", "C").method("M")
}

/// A body length plus a set of distinct positions inside it.
fn body_and_indices() -> impl Strategy<Value = (usize, Vec<usize>)> {
    (1usize..40).prop_flat_map(|len| {
        (
            Just(len),
            proptest::collection::btree_set(0..len, 1..=len.min(8))
                .prop_map(|set| set.into_iter().collect::<Vec<_>>())
                .prop_shuffle(),
        )
    })
}

proptest! {
    #[test]
    fn batch_remove_matches_descending_single_removals((len, indices) in body_and_indices()) {
        let mut batch = session(numbered(len));
        batch.remove_instruction(&method().indices(indices.clone())).unwrap();

        let mut single = session(numbered(len));
        let mut ordered = indices.clone();
        ordered.sort_unstable_by(|a, b| b.cmp(a));
        for index in ordered {
            single.remove_instruction(&method().index(index)).unwrap();
        }

        let after = batch.instructions(&method()).unwrap();
        prop_assert_eq!(&after, &single.instructions(&method()).unwrap());

        // exactly the addressed originals are gone, the rest keep their order
        let removed: BTreeSet<usize> = indices.into_iter().collect();
        let expected: Vec<Instruction> = numbered(len)
            .into_iter()
            .enumerate()
            .filter(|(i, _)| !removed.contains(i))
            .map(|(_, ins)| ins)
            .collect();
        prop_assert_eq!(after, expected);
    }

    #[test]
    fn find_instruction_returns_kth_match(
        marks in proptest::collection::vec(any::<bool>(), 0..30),
        occurrence in 1usize..35,
    ) {
        let body: Vec<Instruction> = marks
            .iter()
            .map(|&hit| if hit { Instruction::ldstr("needle") } else { Instruction::nop() })
            .collect();
        let patcher = session(body);
        let positions: Vec<usize> = marks
            .iter()
            .enumerate()
            .filter(|(_, hit)| **hit)
            .map(|(i, _)| i)
            .collect();

        let found = find_instruction(patcher.module(), &method(), &Instruction::ldstr("needle"), occurrence)
            .unwrap();
        prop_assert_eq!(found, positions.get(occurrence - 1).copied());
    }
}
