pub mod auth;
pub mod cli;
pub mod guard;
pub mod snapshot;
pub mod view;

#[cfg(test)]
mod mock_http;
