//! Core logic for the Azure DevOps Boards MCP server: the `az` invoker, query building,
//! scope resolution and the ownership guard used before any mutation.

pub mod boards;
pub mod config;
pub mod context;
pub mod decode;
pub mod error;
pub mod guard;
pub mod identity;
pub mod iteration;
pub mod runner;
pub mod wiql;
pub mod work_item;
