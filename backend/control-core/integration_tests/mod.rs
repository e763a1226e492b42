mod daemon;
mod error;
mod helpers;
mod manager;
