pub mod access;
pub mod activity;
pub mod documents;
pub mod events;
pub mod secret;
pub mod share;
pub mod store;
pub mod workspace;
