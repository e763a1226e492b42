mod cli;
mod logger;
mod session;
