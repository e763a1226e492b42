mod config;
mod control;
mod daemon;
mod notify;
