mod connection;
mod discovery;
#[cfg(unix)]
mod lifecycle;
