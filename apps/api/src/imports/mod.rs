pub mod handlers;
pub mod mapping;
pub mod parser;
pub mod pipeline;
