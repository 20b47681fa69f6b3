use serde::{Deserialize, Serialize};

use crate::macros::impls_for_identifier_newtype;

/// Name under which a dump is declared, stored and retrieved.
///
/// Also used as the directory/prefix segment by storage adapters and as the
/// stem of generated archive filenames.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
#[repr(transparent)]
pub struct DumpName(String);

impls_for_identifier_newtype!(DumpName);
