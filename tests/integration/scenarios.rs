use super::{sample_module, write_line};
use il_patcher::search::find_by_operand_values;
use il_patcher::{
    resolve_method, resolve_type, EditResult, Instruction, JsonProvider, MemberRefKind,
    PatchError, Patcher, Target,
};

fn session() -> Patcher {
    Patcher::from_module(sample_module(), JsonProvider, false)
}

fn inner_m() -> Target {
    Target::new("N", "C").nested("Inner").method("M")
}

#[test]
fn test_nested_method_scenario() {
    let module = sample_module();

    let inner = resolve_type(&module, "N.C", &["Inner"]).unwrap();
    assert_eq!(inner.def.name, "Inner");
    assert_eq!(inner.path, vec![0, 0]);

    let (_, method) = resolve_method(inner.def, "M", None, Some("Void")).unwrap();
    assert_eq!(method.name, "M");

    let patcher = session();
    let bare_call = Instruction::new("call");
    assert_eq!(
        patcher.find_instruction(&inner_m(), &bare_call, 1).unwrap(),
        None
    );

    let full_call = Instruction::call(write_line());
    assert_eq!(
        patcher.find_instruction(&inner_m(), &full_call, 1).unwrap(),
        Some(1)
    );
}

#[test]
fn test_target_path_round_trip_resolves() {
    let patcher = session();
    let target: Target = "N.C/Inner::M".parse().unwrap();
    assert_eq!(patcher.instructions(&target).unwrap().len(), 3);
}

#[test]
fn test_overloads_are_told_apart_by_parameters() {
    let patcher = session();
    let with_arg = Target::new("App", "License")
        .method("Banner")
        .parameters(["String"]);
    let without_arg = Target::new("App", "License")
        .method("Banner")
        .parameters(Vec::<String>::new());

    assert_eq!(patcher.instructions(&with_arg).unwrap().len(), 7);
    assert_eq!(patcher.instructions(&without_arg).unwrap().len(), 1);

    // no filter: first declared overload wins
    let unfiltered = Target::new("App", "License").method("Banner");
    assert_eq!(patcher.instructions(&unfiltered).unwrap().len(), 7);
}

#[test]
fn test_multiset_query_needs_two_occurrences() {
    let module = sample_module();
    let once = find_by_operand_values(&module, &["TRIAL VERSION", "days left:"]);
    assert_eq!(once.len(), 1);
    assert_eq!(once[0].indices, Some(vec![0, 2]));

    let twice = find_by_operand_values(&module, &["TRIAL VERSION", "TRIAL VERSION", "x"]);
    assert!(twice.is_empty());
}

#[test]
fn test_search_result_drives_batch_operand_patch() {
    let mut patcher = session();
    let found = patcher.find_by_operand_values(&["TRIAL VERSION", "TRIAL VERSION"]);
    assert_eq!(found.len(), 1);
    let target = &found[0];
    assert_eq!(target.indices, Some(vec![0, 4]));
    assert_eq!(target.parameters, Some(vec!["String".to_string()]));

    let result = patcher.patch_operand(target, "REGISTERED").unwrap();
    assert_eq!(result, EditResult::Applied { instructions_changed: 2 });
    assert!(patcher
        .find_by_operand_values(&["TRIAL VERSION"])
        .is_empty());
    assert_eq!(
        patcher.patch_operand(target, "REGISTERED").unwrap(),
        EditResult::AlreadyApplied
    );
}

#[test]
fn test_injected_call_is_found_by_text() {
    let mut patcher = session();
    let sink = patcher.build_member_ref("System", "Console", "WriteLine", MemberRefKind::Static);
    let target = Target::new("App", "License")
        .method("IsValid")
        .indices(vec![0, 0])
        .instructions(vec![Instruction::ldstr("checking"), Instruction::call(sink)]);
    patcher.insert_instruction(&target).unwrap();

    let body = patcher
        .instructions(&Target::new("App", "License").method("IsValid"))
        .unwrap();
    assert_eq!(body[0], Instruction::ldstr("checking"));
    assert_eq!(body[1].opcode, "call");
    assert_eq!(body[2].opcode, "ldarg.0");

    let hits = patcher.find_by_operand_values(&[
        "System.Void System.Console::WriteLine(System.String)",
        "checking",
    ]);
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].method.as_deref(), Some("IsValid"));
}

#[test]
fn test_scoped_search_over_type() {
    let patcher = session();
    let found = patcher
        .find_by_opcodes_in(&Target::new("App", "License"), &["ldstr", "call"], true)
        .unwrap();
    let methods: Vec<_> = found.iter().filter_map(|t| t.method.as_deref()).collect();
    assert_eq!(methods, vec!["Banner"]);

    let loose = patcher
        .find_by_opcodes_in(&Target::new("App", "License"), &["ret"], false)
        .unwrap();
    assert_eq!(loose.len(), 3);
}

#[test]
fn test_failure_keeps_earlier_changes() {
    let mut patcher = session();
    let is_valid = Target::new("App", "License").method("IsValid");
    patcher.write_return_body(&is_valid, true).unwrap();

    let err = patcher
        .remove_instruction(&Target::new("App", "License").method("Missing").index(0))
        .unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(
        patcher.instructions(&is_valid).unwrap(),
        vec![Instruction::new("ldc.i4.1"), Instruction::ret()]
    );
}

#[test]
fn test_unknown_nested_type_does_not_fall_back_to_outer() {
    let mut patcher = session();
    let wrong = Target::new("N", "C").nested("Missing").method("Run");
    let err = patcher.write_return_body(&wrong, true).unwrap_err();
    assert!(err.is_not_found());

    assert_eq!(
        patcher
            .instructions(&Target::new("N", "C").method("Run"))
            .unwrap(),
        vec![Instruction::ret()]
    );
}

#[test]
fn test_unknown_names_carry_suggestions() {
    let patcher = session();
    let err = patcher
        .instructions(&Target::new("App", "Licence").method("IsValid"))
        .unwrap_err();
    assert!(err.to_string().contains("did you mean 'App.License'"));

    let err = patcher
        .instructions(&Target::new("App", "License").method("IsVaild"))
        .unwrap_err();
    match err {
        PatchError::MethodNotFound { suggestion, .. } => {
            assert_eq!(suggestion.as_deref(), Some("IsValid"))
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_signature_search_reports_offsets() {
    let patcher = session();
    let hits = patcher.find_methods_by_signature(&["ldstr", "call", "ret"]);
    let found: Vec<_> = hits
        .iter()
        .map(|h| (h.target.to_string(), h.offset))
        .collect();
    assert_eq!(
        found,
        vec![
            ("N.C/Inner::M()".to_string(), 0),
            ("App.License::Banner(String)".to_string(), 4),
        ]
    );
}
