//! Context query: request policy and the assembler that applies it.
//! Single owner of read-side windowing; the conversation facade delegates here.

pub mod assemble;
pub mod request;

pub use assemble::{assemble, Assembled, FormattedMessage, ModelMessage};
pub use request::{AssemblySettings, ContextRequest, ContextRequestBuilder, TargetFormat};
