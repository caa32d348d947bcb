//! Mock embedding providers

mod scripted;

pub use scripted::ScriptedEmbedding;
