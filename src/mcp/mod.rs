//! MCP Surface (spec §4.11, C11): URI scheme, resource providers, tools and
//! prompts, served over the Streamable-HTTP transport in [`transport`].

pub mod prompts;
pub mod resources;
pub mod tools;
pub mod transport;
pub mod types;
pub mod uri;
