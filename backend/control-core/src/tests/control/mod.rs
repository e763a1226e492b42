mod auth;
mod channel;
