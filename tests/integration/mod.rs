//! Library-level integration tests: resolution, search and editing against
//! realistic module shapes, plus saving through the JSON provider.

mod persistence;
mod properties;
mod scenarios;

use il_patcher::{Instruction, MemberRef, MemberRefKind, MethodDef, Module, Operand, TypeDef};

pub fn write_line() -> MemberRef {
    MemberRef::string_sink(
        "mscorlib",
        "System",
        "Console",
        "WriteLine",
        MemberRefKind::Static,
    )
}

fn nested_type() -> TypeDef {
    TypeDef::new("N", "C")
        .with_method(MethodDef::new("Run").with_body(vec![Instruction::ret()]))
        .with_nested(
            TypeDef::new("", "Inner").with_method(MethodDef::new("M").with_body(vec![
                Instruction::ldstr("x"),
                Instruction::call(write_line()),
                Instruction::ret(),
            ])),
        )
}

fn license_type() -> TypeDef {
    TypeDef::new("App", "License")
        .with_method(
            MethodDef::new("IsValid")
                .returning("Boolean")
                .with_body(vec![
                    Instruction::new("ldarg.0"),
                    Instruction::with_operand(
                        "ldfld",
                        Operand::Symbol("System.DateTime App.License::expires".into()),
                    ),
                    Instruction::with_operand(
                        "call",
                        Operand::Symbol("System.Boolean System.DateTime::op_GreaterThan".into()),
                    ),
                    Instruction::ret(),
                ]),
        )
        .with_method(
            MethodDef::new("Banner")
                .with_parameters(["String"])
                .with_body(vec![
                    Instruction::ldstr("TRIAL VERSION"),
                    Instruction::call(write_line()),
                    Instruction::ldstr("days left:"),
                    Instruction::call(write_line()),
                    Instruction::ldstr("TRIAL VERSION"),
                    Instruction::call(write_line()),
                    Instruction::ret(),
                ]),
        )
        .with_method(MethodDef::new("Banner").with_body(vec![Instruction::ret()]))
}

/// `N.C` with nested `Inner.M()` printing "x", plus a license check and two
/// `Banner` overloads in `App.License`.
pub fn sample_module() -> Module {
    let mut module = Module::new("Sample")
        .with_type(nested_type())
        .with_type(license_type());
    module.version = Some("4.2.0.0".to_string());
    module
}
