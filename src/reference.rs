//! Cross-module member references used as call operands.
//!
//! Only one signature shape is supported: a member taking a single `String`
//! and returning `Void`, called either statically or on an instance. That is
//! enough to inject logging-style calls such as `Console.WriteLine(string)`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberRefKind {
    Static,
    Instance,
}

/// A reference to a member defined outside the module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRef {
    /// Resolution scope (assembly reference) the declaring type lives in.
    pub scope: String,
    pub namespace: String,
    pub class: String,
    pub name: String,
    pub kind: MemberRefKind,
    pub return_type: String,
    pub parameters: Vec<String>,
}

impl MemberRef {
    /// `void name(string)` on `namespace.class`, resolved through `scope`.
    pub fn string_sink(
        scope: impl Into<String>,
        namespace: impl Into<String>,
        class: impl Into<String>,
        name: impl Into<String>,
        kind: MemberRefKind,
    ) -> Self {
        Self {
            scope: scope.into(),
            namespace: namespace.into(),
            class: class.into(),
            name: name.into(),
            kind,
            return_type: "System.Void".to_string(),
            parameters: vec!["System.String".to_string()],
        }
    }

    pub fn declaring_type(&self) -> String {
        if self.namespace.is_empty() {
            self.class.clone()
        } else {
            format!("{}.{}", self.namespace, self.class)
        }
    }

    pub fn is_static(&self) -> bool {
        self.kind == MemberRefKind::Static
    }
}

/// `System.Void System.Console::WriteLine(System.String)`
impl fmt::Display for MemberRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}::{}({})",
            self.return_type,
            self.declaring_type(),
            self.name,
            self.parameters.join(",")
        )
    }
}
