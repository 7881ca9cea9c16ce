//! JSON DOM, parser, and writer used by JSON-mode peer framing, the REST
//! registry, and config serialization.

pub mod value;
pub mod parser;
pub mod writer;

pub use value::Json;
pub use parser::{parse, try_parse};
pub use writer::{write_oneline, write_pretty};
