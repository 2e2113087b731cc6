pub mod api;
pub mod chat;
pub mod config;
pub mod context;
pub mod db;
pub mod llm;
pub mod models;
