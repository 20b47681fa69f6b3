mod dump_name;
mod export_name;
mod macros;

pub use dump_name::DumpName;
pub use export_name::ExportName;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid identifier `{value}`: only ASCII letters, digits, `_` and `-` are allowed")]
pub struct InvalidIdentifierError {
    pub value: String,
}
