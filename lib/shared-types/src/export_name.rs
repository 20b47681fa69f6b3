use serde::{Deserialize, Serialize};

use crate::macros::impls_for_identifier_newtype;

/// Name of a raw-SQL export; the archive member is `<name>.csv`.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct ExportName(String);

impls_for_identifier_newtype!(ExportName);

impl ExportName {
    pub fn csv_member(&self) -> String {
        format!("{}.csv", self.0)
    }
}
