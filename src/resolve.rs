//! Symbol resolution: from a target descriptor to a concrete method.

use crate::error::PatchError;
use crate::model::{MethodDef, MethodId, Module, TypeDef};
use crate::target::Target;
use tracing::{debug, warn};

const SUGGESTION_THRESHOLD: f64 = 0.8;

/// A resolved type together with its position path in the module.
#[derive(Debug, Clone)]
pub struct ResolvedType<'m> {
    pub path: Vec<usize>,
    pub def: &'m TypeDef,
}

/// Find a type by full name, then walk the nested chain.
///
/// Each chain step takes the *last* nested type with a matching name. A step
/// that matches nothing is skipped and the last level that did resolve is
/// kept; each skipped step is logged. A non-empty chain in which no step
/// matches at all is a `TypeNotFound`.
pub fn resolve_type<'m>(
    module: &'m Module,
    full_name: &str,
    nested: &[&str],
) -> Result<ResolvedType<'m>, PatchError> {
    let full_name = full_name.strip_prefix('.').unwrap_or(full_name);

    let Some((top_idx, top)) = module
        .types
        .iter()
        .enumerate()
        .find(|(_, ty)| ty.full_name() == full_name)
    else {
        return Err(PatchError::TypeNotFound {
            name: full_name.to_string(),
            suggestion: suggest(full_name, module.types.iter().map(TypeDef::full_name)),
        });
    };

    let mut path = vec![top_idx];
    let mut current = top;
    for step in nested {
        match current
            .nested_types
            .iter()
            .enumerate()
            .rev()
            .find(|(_, ty)| ty.name == *step)
        {
            Some((idx, ty)) => {
                path.push(idx);
                current = ty;
            }
            None => {
                warn!(
                    type_name = %current.full_name(),
                    nested = %step,
                    "nested type not found; keeping last resolved level"
                );
            }
        }
    }

    if !nested.is_empty() && path.len() == 1 {
        let first = nested.first().copied().unwrap_or_default();
        return Err(PatchError::TypeNotFound {
            name: format!("{}/{}", full_name, nested.join("/")),
            suggestion: suggest(first, top.nested_types.iter().map(|ty| ty.name.clone()))
                .map(|name| format!("{full_name}/{name}")),
        });
    }

    debug!(type_name = %full_name, ?path, "resolved type");
    Ok(ResolvedType {
        path,
        def: current,
    })
}

/// Find a method by name, with optional parameter and return-type filters.
///
/// Parameters compare positionally by type name. An empty `return_type` is
/// treated as absent. The first method passing every active filter wins.
pub fn resolve_method<'t>(
    ty: &'t TypeDef,
    name: &str,
    parameters: Option<&[String]>,
    return_type: Option<&str>,
) -> Result<(usize, &'t MethodDef), PatchError> {
    let return_type = return_type.filter(|r| !r.is_empty());

    let found = ty.methods.iter().enumerate().find(|(_, m)| {
        if m.name != name {
            return false;
        }
        if let Some(params) = parameters {
            if params.len() != m.parameters.len() {
                return false;
            }
            if m.parameters.iter().zip(params).any(|(have, want)| have != want) {
                return false;
            }
        }
        if let Some(ret) = return_type {
            if m.return_type != ret {
                return false;
            }
        }
        true
    });

    found.ok_or_else(|| PatchError::MethodNotFound {
        type_name: ty.full_name(),
        method: name.to_string(),
        suggestion: if ty.methods.iter().any(|m| m.name == name) {
            None
        } else {
            suggest(name, ty.methods.iter().map(|m| m.name.clone()))
        },
    })
}

/// Resolve a target all the way to a method identity.
pub fn resolve_target(module: &Module, target: &Target) -> Result<MethodId, PatchError> {
    let ty = resolve_type(module, &target.type_name(), &target.nested_chain())?;
    let method_name = target.method.as_deref().ok_or(PatchError::MissingField {
        field: "method",
    })?;
    let (method, def) = resolve_method(
        ty.def,
        method_name,
        target.parameters.as_deref(),
        target.return_type.as_deref(),
    )?;
    debug!(method = %def.signature(), "resolved method");
    Ok(MethodId {
        type_path: ty.path,
        method,
    })
}

fn suggest(name: &str, candidates: impl Iterator<Item = String>) -> Option<String> {
    candidates
        .map(|candidate| (strsim::jaro_winkler(name, &candidate), candidate))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Instruction, MethodDef};

    fn module() -> Module {
        Module::new("m")
            .with_type(
                TypeDef::new("N", "C")
                    .with_method(MethodDef::new("Run").with_body(vec![Instruction::ret()]))
                    .with_method(
                        MethodDef::new("Add")
                            .with_parameters(["Int32", "Int32"])
                            .returning("Int32")
                            .with_body(vec![Instruction::ret()]),
                    )
                    .with_method(
                        MethodDef::new("Add")
                            .with_parameters(["String", "String"])
                            .returning("String")
                            .with_body(vec![Instruction::ret()]),
                    )
                    .with_nested(
                        TypeDef::new("", "Inner")
                            .with_method(MethodDef::new("M").with_body(vec![Instruction::ret()]))
                            .with_nested(
                                TypeDef::new("", "Deep")
                                    .with_method(MethodDef::new("D")),
                            ),
                    ),
            )
            .with_type(TypeDef::new("", "Program").with_method(MethodDef::new("Main")))
    }

    #[test]
    fn test_resolve_top_level_type() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &[]).unwrap();
        assert_eq!(ty.path, vec![0]);
        assert_eq!(ty.def.name, "C");
    }

    #[test]
    fn test_resolve_strips_leading_dot() {
        let module = module();
        let ty = resolve_type(&module, ".Program", &[]).unwrap();
        assert_eq!(ty.def.name, "Program");
    }

    #[test]
    fn test_resolve_nested_chain() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &["Inner", "Deep"]).unwrap();
        assert_eq!(ty.path, vec![0, 0, 0]);
        assert_eq!(ty.def.name, "Deep");
    }

    #[test]
    fn test_unmatched_nested_step_keeps_last_level() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &["Inner", "Missing"]).unwrap();
        assert_eq!(ty.def.name, "Inner");
        let ty = resolve_type(&module, "N.C", &["Missing", "Inner"]).unwrap();
        assert_eq!(ty.def.name, "Inner");
    }

    #[test]
    fn test_chain_with_no_matching_step_is_not_found() {
        let module = module();
        let err = resolve_type(&module, "N.C", &["Missing"]).unwrap_err();
        match err {
            PatchError::TypeNotFound { name, .. } => assert_eq!(name, "N.C/Missing"),
            other => panic!("unexpected error: {other}"),
        }

        let err = resolve_type(&module, "N.C", &["Iner", "Gone"]).unwrap_err();
        match err {
            PatchError::TypeNotFound { name, suggestion } => {
                assert_eq!(name, "N.C/Iner/Gone");
                assert_eq!(suggestion.as_deref(), Some("N.C/Inner"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_duplicate_nested_names_take_the_last() {
        let module = Module::new("m").with_type(
            TypeDef::new("N", "C")
                .with_nested(TypeDef::new("", "Inner").with_method(MethodDef::new("First")))
                .with_nested(TypeDef::new("", "Inner").with_method(MethodDef::new("Second"))),
        );
        let ty = resolve_type(&module, "N.C", &["Inner"]).unwrap();
        assert_eq!(ty.path, vec![0, 1]);
        assert_eq!(ty.def.methods[0].name, "Second");
    }

    #[test]
    fn test_type_not_found_suggests() {
        let module = module();
        let err = resolve_type(&module, "N.D", &[]).unwrap_err();
        match err {
            PatchError::TypeNotFound { name, suggestion } => {
                assert_eq!(name, "N.D");
                assert_eq!(suggestion.as_deref(), Some("N.C"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_overload_by_parameters() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &[]).unwrap();
        let params = vec!["String".to_string(), "String".to_string()];
        let (idx, method) = resolve_method(ty.def, "Add", Some(params.as_slice()), None).unwrap();
        assert_eq!(idx, 2);
        assert_eq!(method.return_type, "String");
    }

    #[test]
    fn test_overload_by_return_type() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &[]).unwrap();
        let (idx, _) = resolve_method(ty.def, "Add", None, Some("Int32")).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_first_match_wins_without_filters() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &[]).unwrap();
        let (idx, _) = resolve_method(ty.def, "Add", None, Some("")).unwrap();
        assert_eq!(idx, 1);
    }

    #[test]
    fn test_parameter_count_mismatch_is_not_found() {
        let module = module();
        let ty = resolve_type(&module, "N.C", &[]).unwrap();
        let params = vec!["Int32".to_string()];
        let err = resolve_method(ty.def, "Add", Some(params.as_slice()), None).unwrap_err();
        assert!(matches!(
            err,
            PatchError::MethodNotFound {
                suggestion: None,
                ..
            }
        ));
    }

    #[test]
    fn test_resolve_target_is_deterministic() {
        let module = module();
        let target = Target::new("N", "C").nested("Inner").method("M");
        let first = resolve_target(&module, &target).unwrap();
        let second = resolve_target(&module, &target).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.type_path, vec![0, 0]);
    }

    #[test]
    fn test_resolve_target_requires_method() {
        let module = module();
        let err = resolve_target(&module, &Target::new("N", "C")).unwrap_err();
        assert!(matches!(err, PatchError::MissingField { field: "method" }));
    }
}
