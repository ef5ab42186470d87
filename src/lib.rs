//! Definition-language driven field extraction.
//!
//! A definition text declares named regex `pattern`s, composable `template`s
//! and `extract` rules. [`DefinitionReader`] compiles the whole set into an
//! [`Extractor`]: one shared multi-pattern DFA that pre-filters every input
//! line in a single pass, plus one capture regex per rule to pull out the
//! named fields. Rules match whole lines, in declaration order.
//!
//! ```
//! use gleaner::DefinitionReader;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let extractor = DefinitionReader::from_str(
//!     "pattern %word [a-zA-Z]+\n\
//!      template @entry value=$v(%word)\n\
//!      extract Sample {\n\
//!        template @entry\n\
//!      }\n",
//! )
//! .read()?;
//!
//! let result = extractor.extract("value=abc")?.unwrap();
//! assert_eq!(result.id(), "Sample");
//! assert_eq!(result.as_map(None)["v"], "abc");
//! # Ok(())
//! # }
//! ```

#[macro_use]
mod macros;
mod autom;
mod compile;
mod error;
mod extract;
mod input;
mod model;

pub use compile::DefinitionReader;
pub use error::{DefinitionError, ExtractionError};
pub use extract::{ExtractionResult, Extractor};

/// Diagnostic traces on stderr are gated behind this variable.
pub(crate) fn debug_enabled() -> bool {
    std::env::var_os("GLEANER_DEBUG").is_some()
}
