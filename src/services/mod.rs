mod k6_runner;
mod openai_client;

pub use k6_runner::{parse_summary, K6Runner};
pub use openai_client::OpenAiChatClient;
