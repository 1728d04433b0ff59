pub mod citations;
pub mod conversation;
pub mod embeddings;
pub mod gate;
pub mod index;
pub mod llm;
pub mod ollama;
pub mod orchestrator;
pub mod reasoner;
pub mod retrieve;
