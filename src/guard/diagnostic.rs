use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// What shape of call a diagnostic was raised for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// A free function of the raw module: `js::value_of(...)`.
    PackageCall,
    /// An associated function named through a raw type: `js::Value::get(...)`.
    AssociatedCall,
    /// A method on a receiver whose static type is a raw type.
    MethodCall,
}

/// One unsafe, unwrapped call site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub file: PathBuf,
    /// 1-based line of the start of the call.
    pub line: usize,
    /// 1-based column of the start of the call.
    pub column: usize,
    pub message: String,
    pub category: Category,
}

impl Category {
    /// The diagnostic message for an unsafe call of this shape.
    pub fn message(self, type_name: &str, callee: &str) -> String {
        match self {
            Category::PackageCall | Category::AssociatedCall => {
                format!("unsafe call to {type_name} found: {callee}(...)")
            }
            Category::MethodCall => {
                format!("unsafe method call on {type_name} found: {callee}(...)")
            }
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}: {}",
            self.file.display(),
            self.line,
            self.column,
            self.message
        )
    }
}
